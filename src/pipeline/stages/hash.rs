use crate::error::ProofResult;
use crate::evidence::HashInfo;
use crate::pipeline::{PipelineStage, StageContext, StageOutput};
use crate::state_machine::ProofJob;
use tracing::info;

/// Stage that calculates SHA-256 of the saved proof image
///
/// Hashes the exact file at the final path; nothing after this stage writes to it.
pub struct HashStage;

impl PipelineStage for HashStage {
    fn execute(&self, job: &ProofJob, _context: &StageContext) -> ProofResult<StageOutput> {
        let path = &job.current_artifact_path;
        let hash = HashInfo::from_file(path)?;
        let bytes = std::fs::metadata(path)?.len();

        info!(
            target: "pipeline::hash",
            proof_id = %job.id,
            bytes,
            "Proof hash calculated: {}",
            hash.value
        );

        Ok(StageOutput::artifact(path.clone()).with_hash(hash.value, bytes))
    }

    fn name(&self) -> &str {
        "Calculate Hash"
    }
}
