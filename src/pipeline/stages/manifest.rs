use crate::error::{ProofError, ProofResult};
use crate::evidence::{HashInfo, ProofManifestBuilder};
use crate::pipeline::{PipelineStage, StageContext, StageOutput};
use crate::state_machine::ProofJob;
use crate::storage::manifest_path_for_image;
use tracing::{error, info};

/// Stage that writes `proof_<id>.json` next to the image
///
/// The image is re-hashed first; if its bytes no longer match the recorded digest the
/// stage fails with `IntegrityMismatch` instead of publishing a wrong manifest.
pub struct ManifestStage;

impl PipelineStage for ManifestStage {
    fn execute(&self, job: &ProofJob, _context: &StageContext) -> ProofResult<StageOutput> {
        let image_path = &job.current_artifact_path;
        let expected = job.sha256.as_deref().ok_or_else(|| {
            ProofError::MissingInput(format!("No hash recorded for proof {}", job.id))
        })?;

        let actual = HashInfo::from_file(image_path)?;
        if actual.value != expected {
            error!(
                target: "pipeline::manifest",
                proof_id = %job.id,
                expected,
                actual = %actual.value,
                "Proof image changed after hashing"
            );
            return Err(ProofError::IntegrityMismatch {
                path: image_path.display().to_string(),
                expected: expected.to_string(),
                actual: actual.value,
            });
        }

        let manifest = ProofManifestBuilder::from_job(job).build()?;
        let manifest_path = manifest_path_for_image(image_path);
        manifest.save(&manifest_path)?;

        info!(
            target: "pipeline::manifest",
            proof_id = %job.id,
            "Manifest written to {}",
            manifest_path.display()
        );

        Ok(StageOutput::artifact(image_path.clone()).with_manifest(manifest_path))
    }

    fn name(&self) -> &str {
        "Write Manifest"
    }
}
