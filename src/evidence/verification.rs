use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::manifest::ProofManifest;
use super::HashInfo;
use crate::error::ProofResult;
use crate::storage::image_path_for_manifest;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub timestamp: DateTime<Utc>,
    pub status: VerificationStatus,
    pub checks: VerificationChecks,
    pub proof_id: String,
    pub image_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_sha256: Option<String>,
}

impl VerificationReport {
    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Verified,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationChecks {
    pub manifest_structure: CheckResult,
    pub hash_match: CheckResult,
    pub size_match: CheckResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckResult {
    Pass,
    Fail,
    Skip,
}

impl CheckResult {
    fn from_bool(passed: bool) -> Self {
        if passed {
            CheckResult::Pass
        } else {
            CheckResult::Fail
        }
    }
}

pub struct Verifier;

impl Verifier {
    /// Re-hash the image that shares the manifest's stem and compare
    ///
    /// A missing image or a manifest without a digest is reported as `Failed`, not as
    /// an error; only an unreadable or malformed manifest is an error.
    pub fn verify<P: AsRef<Path>>(manifest_path: P) -> ProofResult<VerificationReport> {
        let manifest_path = manifest_path.as_ref();
        let manifest = ProofManifest::load(manifest_path)?;
        let image_path = image_path_for_manifest(manifest_path);

        // Check 1: Manifest structure
        let structure_ok = manifest.validate().is_ok() && manifest.sha256.is_some();
        let manifest_check = CheckResult::from_bool(structure_ok);

        // Check 2: Hash of the bytes on disk
        let actual = if image_path.is_file() {
            Some(HashInfo::from_file(&image_path)?.value)
        } else {
            None
        };
        let hash_check = match (&manifest.sha256, &actual) {
            (Some(expected), Some(actual)) => CheckResult::from_bool(expected == actual),
            _ => CheckResult::Fail,
        };

        // Check 3: Size, when the manifest recorded one
        let size_check = match (manifest.output_bytes, actual.is_some()) {
            (Some(expected), true) => {
                CheckResult::from_bool(std::fs::metadata(&image_path)?.len() == expected)
            }
            (Some(_), false) => CheckResult::Fail,
            (None, _) => CheckResult::Skip,
        };

        let passed = [manifest_check, hash_check, size_check]
            .iter()
            .all(|check| *check != CheckResult::Fail);
        let status = if passed {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Failed
        };

        tracing::info!(
            target: "evidence::verification",
            proof_id = %manifest.proof_id,
            status = ?status,
            "Verified proof against {}",
            manifest_path.display()
        );

        Ok(VerificationReport {
            timestamp: Utc::now(),
            status,
            checks: VerificationChecks {
                manifest_structure: manifest_check,
                hash_match: hash_check,
                size_match: size_check,
            },
            proof_id: manifest.proof_id,
            image_path,
            expected_sha256: manifest.sha256,
            actual_sha256: actual,
        })
    }
}
