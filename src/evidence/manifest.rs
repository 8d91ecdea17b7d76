use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::location::LocationState;
use crate::error::{ProofError, ProofResult};
use crate::imaging::Quality;
use crate::storage::write_atomic;

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Metadata record describing one proof, stored next to its JPEG
///
/// Field order here is the serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofManifest {
    pub schema_version: u32,
    pub proof_id: String,
    pub captured_at_utc: DateTime<Utc>,
    pub captured_at_local: DateTime<FixedOffset>,
    pub location: ManifestLocation,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sha256: Option<String>,
    pub quality: Quality,
    pub max_megapixels: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestLocation {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub accuracy_meters: Option<f64>,
    pub state: LocationState,
}

impl ProofManifest {
    /// Pretty-printed JSON; same record, same bytes
    pub fn to_json_bytes(&self) -> ProofResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Structural checks a reader can rely on
    pub fn validate(&self) -> ProofResult<()> {
        if self.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(ProofError::BuilderError(format!(
                "Unsupported manifest schema version {}",
                self.schema_version
            )));
        }
        if self.proof_id.is_empty() {
            return Err(ProofError::BuilderError("proofId is empty".to_string()));
        }
        if let Some(sha256) = &self.sha256 {
            if sha256.len() != 64 || !sha256.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ProofError::BuilderError(format!(
                    "sha256 is not a 64-character hex digest: {}",
                    sha256
                )));
            }
        }
        Ok(())
    }

    /// Save manifest to JSON file, replacing any previous one atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ProofResult<()> {
        let bytes = self.to_json_bytes()?;
        write_atomic(path.as_ref(), &bytes)?;
        Ok(())
    }

    /// Load manifest from JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> ProofResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&json)?;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn create_test_manifest() -> ProofManifest {
        let captured = FixedOffset::east_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 17, 30, 0)
            .unwrap();
        ProofManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            proof_id: "1709296200000".to_string(),
            captured_at_utc: captured.with_timezone(&Utc),
            captured_at_local: captured,
            location: ManifestLocation {
                lat: Some(24.8607),
                lon: Some(67.0011),
                accuracy_meters: Some(12.5),
                state: LocationState::Fresh,
            },
            output_bytes: Some(204_800),
            sha256: Some("ab".repeat(32)),
            quality: Quality::Med,
            max_megapixels: 12,
        }
    }

    #[test]
    fn test_key_order_is_stable() {
        let json = String::from_utf8(create_test_manifest().to_json_bytes().unwrap()).unwrap();
        let keys = [
            "\"schemaVersion\"",
            "\"proofId\"",
            "\"capturedAtUtc\"",
            "\"capturedAtLocal\"",
            "\"location\"",
            "\"outputBytes\"",
            "\"sha256\"",
            "\"quality\"",
            "\"maxMegapixels\"",
        ];
        let positions: Vec<usize> = keys.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", json);
        assert!(json.contains("\"capturedAtUtc\": \"2024-03-01T12:30:00Z\""));
        assert!(json.contains("\"capturedAtLocal\": \"2024-03-01T17:30:00+05:00\""));
    }

    #[test]
    fn test_missing_optionals_are_omitted() {
        let mut manifest = create_test_manifest();
        manifest.sha256 = None;
        manifest.output_bytes = None;
        manifest.location = ManifestLocation {
            lat: None,
            lon: None,
            accuracy_meters: None,
            state: LocationState::None,
        };

        let value = serde_json::to_value(&manifest).unwrap();
        assert!(value.get("sha256").is_none());
        assert!(value.get("outputBytes").is_none());
        assert_eq!(value["location"], serde_json::json!({ "state": "None" }));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("proof_1709296200000.json");
        let manifest = create_test_manifest();

        manifest.save(&path).unwrap();
        let loaded = ProofManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let manifest = create_test_manifest();
        assert_eq!(
            manifest.to_json_bytes().unwrap(),
            manifest.clone().to_json_bytes().unwrap()
        );
    }

    #[test]
    fn test_validate_rejects_bad_digest() {
        let mut manifest = create_test_manifest();
        manifest.sha256 = Some("not-a-digest".to_string());
        assert!(manifest.validate().is_err());

        let mut manifest = create_test_manifest();
        manifest.schema_version = 2;
        assert!(manifest.validate().is_err());
    }
}
