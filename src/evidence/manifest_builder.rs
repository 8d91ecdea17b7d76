use super::location::{LocationFix, LocationState};
use super::manifest::{ManifestLocation, ProofManifest, MANIFEST_SCHEMA_VERSION};
use crate::error::{ProofError, ProofResult};
use crate::imaging::Quality;
use crate::state_machine::ProofJob;
use chrono::{DateTime, FixedOffset, Utc};

/// Builder for constructing ProofManifest instances with a fluent API
///
/// # Example
/// ```ignore
/// let manifest = ProofManifestBuilder::new()
///     .proof_id("1709296200000")
///     .captured_at(captured_at)
///     .location(Some(fix), LocationState::Fresh)
///     .sha256(digest)
///     .output_bytes(204_800)
///     .quality(Quality::Med)
///     .max_megapixels(12)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProofManifestBuilder {
    proof_id: Option<String>,
    captured_at: Option<DateTime<FixedOffset>>,
    location_fix: Option<LocationFix>,
    location_state: Option<LocationState>,
    output_bytes: Option<u64>,
    sha256: Option<String>,
    quality: Option<Quality>,
    max_megapixels: Option<i64>,
}

impl ProofManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-fill every field the job already carries
    pub fn from_job(job: &ProofJob) -> Self {
        let mut builder = Self::new()
            .proof_id(job.id.clone())
            .captured_at(job.captured_at)
            .location(job.location_fix, job.location_state)
            .quality(job.parameters.quality)
            .max_megapixels(job.parameters.max_megapixels);
        if let Some(sha256) = &job.sha256 {
            builder = builder.sha256(sha256.clone());
        }
        if let Some(bytes) = job.output_bytes {
            builder = builder.output_bytes(bytes);
        }
        builder
    }

    pub fn proof_id(mut self, id: impl Into<String>) -> Self {
        self.proof_id = Some(id.into());
        self
    }

    pub fn captured_at(mut self, captured_at: DateTime<FixedOffset>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    pub fn location(mut self, fix: Option<LocationFix>, state: LocationState) -> Self {
        self.location_fix = fix;
        self.location_state = Some(state);
        self
    }

    pub fn output_bytes(mut self, bytes: u64) -> Self {
        self.output_bytes = Some(bytes);
        self
    }

    pub fn sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    pub fn quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn max_megapixels(mut self, max_megapixels: i64) -> Self {
        self.max_megapixels = Some(max_megapixels);
        self
    }

    /// Build the ProofManifest instance
    ///
    /// # Errors
    /// Returns `ProofError::BuilderError` if required fields are missing or invalid
    pub fn build(self) -> ProofResult<ProofManifest> {
        let proof_id = self
            .proof_id
            .ok_or_else(|| ProofError::BuilderError("proof_id is required".to_string()))?;
        let captured_at = self
            .captured_at
            .ok_or_else(|| ProofError::BuilderError("captured_at is required".to_string()))?;
        let quality = self
            .quality
            .ok_or_else(|| ProofError::BuilderError("quality is required".to_string()))?;
        let max_megapixels = self
            .max_megapixels
            .ok_or_else(|| ProofError::BuilderError("max_megapixels is required".to_string()))?;

        // Without a fix there is nothing to report but the state
        let state = match (&self.location_fix, self.location_state) {
            (None, _) => LocationState::None,
            (Some(_), Some(state)) => state,
            (Some(_), None) => {
                return Err(ProofError::BuilderError(
                    "location state is required when a fix is present".to_string(),
                ))
            }
        };
        let location = ManifestLocation {
            lat: self.location_fix.map(|fix| fix.lat),
            lon: self.location_fix.map(|fix| fix.lon),
            accuracy_meters: self.location_fix.and_then(|fix| fix.accuracy_meters),
            state,
        };

        let manifest = ProofManifest {
            schema_version: MANIFEST_SCHEMA_VERSION,
            proof_id,
            captured_at_utc: captured_at.with_timezone(&Utc),
            captured_at_local: captured_at,
            location,
            output_bytes: self.output_bytes,
            sha256: self.sha256,
            quality,
            max_megapixels,
        };
        manifest.validate()?;
        Ok(manifest)
    }
}
