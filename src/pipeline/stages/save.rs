use crate::error::ProofResult;
use crate::pipeline::{PipelineStage, StageContext, StageOutput};
use crate::state_machine::ProofJob;
use crate::storage::copy_atomic;
use tracing::info;

/// Stage that publishes the JPEG at `proofs/proof_<id>.jpg`
///
/// The copy lands via rename, so the final path only ever holds a complete file.
pub struct SaveStage;

impl PipelineStage for SaveStage {
    fn execute(&self, job: &ProofJob, context: &StageContext) -> ProofResult<StageOutput> {
        let destination = context.layout.final_image(&job.id);
        let bytes = copy_atomic(&job.current_artifact_path, &destination)?;

        info!(
            target: "pipeline::save",
            proof_id = %job.id,
            bytes,
            "Saved proof image to {}",
            destination.display()
        );

        Ok(StageOutput::artifact(destination))
    }

    fn name(&self) -> &str {
        "Save"
    }
}
