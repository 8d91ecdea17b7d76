use crate::error::ProofResult;
use crate::pipeline::{PipelineStage, StageContext, StageOutput};
use crate::state_machine::ProofJob;
use std::io;
use tracing::{info, warn};

/// Stage that removes the run's scratch files
///
/// Deletes `work/<id>/g<gen>/` and, when configured, the source image. Both steps
/// tolerate already-missing files so the stage can be re-run after a crash.
pub struct FinalizeStage;

impl PipelineStage for FinalizeStage {
    fn execute(&self, job: &ProofJob, context: &StageContext) -> ProofResult<StageOutput> {
        context
            .layout
            .remove_generation_dir(&job.id, job.generation)?;

        if context.delete_source_on_success && job.input_path != job.current_artifact_path {
            match std::fs::remove_file(&job.input_path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!(
                        target: "pipeline::finalize",
                        proof_id = %job.id,
                        "Source already removed: {}",
                        job.input_path.display()
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            target: "pipeline::finalize",
            proof_id = %job.id,
            generation = job.generation,
            "Proof finalized"
        );

        Ok(StageOutput::artifact(job.current_artifact_path.clone()))
    }

    fn name(&self) -> &str {
        "Finalize"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::test_support::{context, job_at};
    use crate::state_machine::Stage;
    use crate::storage::write_atomic;
    use tempfile::TempDir;

    #[test]
    fn test_finalize_cleans_work_dir() {
        let temp_dir = TempDir::new().unwrap();
        let context = context(temp_dir.path());
        let final_image = context.layout.final_image("1700000000123");
        write_atomic(&final_image, b"jpeg").unwrap();
        let scratch = context
            .layout
            .stage_output("1700000000123", 1, Stage::Watermark, "png");
        write_atomic(&scratch, b"png").unwrap();

        let source = temp_dir.path().join("capture.jpg");
        std::fs::write(&source, b"raw").unwrap();
        let mut job = job_at(Stage::Finalize, &final_image);
        job.input_path = source.clone();

        FinalizeStage.execute(&job, &context).unwrap();
        assert!(!scratch.exists());
        assert!(final_image.exists());
        // Source is kept unless configured otherwise
        assert!(source.exists());

        // Second run is a no-op
        FinalizeStage.execute(&job, &context).unwrap();
    }

    #[test]
    fn test_finalize_can_delete_source() {
        let temp_dir = TempDir::new().unwrap();
        let mut context = context(temp_dir.path());
        context.delete_source_on_success = true;
        let final_image = context.layout.final_image("1700000000123");
        write_atomic(&final_image, b"jpeg").unwrap();

        let source = temp_dir.path().join("capture.jpg");
        std::fs::write(&source, b"raw").unwrap();
        let mut job = job_at(Stage::Finalize, &final_image);
        job.input_path = source.clone();

        FinalizeStage.execute(&job, &context).unwrap();
        assert!(!source.exists());
        FinalizeStage.execute(&job, &context).unwrap();
    }
}
