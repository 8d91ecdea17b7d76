use crate::error::ProofResult;
use crate::imaging::normalize_orientation;
use crate::pipeline::{PipelineStage, StageContext, StageOutput};
use crate::state_machine::{ProofJob, Stage};
use tracing::debug;

/// Stage that makes the stored pixels upright and unmirrored
///
/// Output: `work/<id>/g<gen>/01_normalize.png`, or the source itself when it needs no
/// change (no file is written in that case).
pub struct NormalizeStage;

impl PipelineStage for NormalizeStage {
    fn execute(&self, job: &ProofJob, context: &StageContext) -> ProofResult<StageOutput> {
        let output = context
            .layout
            .stage_output(&job.id, job.generation, Stage::Normalize, "png");

        let artifact = normalize_orientation(
            &job.current_artifact_path,
            &output,
            job.parameters.mirror_if_front_camera,
        )?;

        debug!(
            target: "pipeline::normalize",
            proof_id = %job.id,
            rewritten = artifact == output,
            "Orientation normalized"
        );

        Ok(StageOutput::artifact(artifact))
    }

    fn name(&self) -> &str {
        "Normalize Orientation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::decode;
    use crate::pipeline::stages::test_support::{context, job_at, write_png};
    use tempfile::TempDir;

    #[test]
    fn test_upright_source_passes_through() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_png(&temp_dir.path().join("capture.png"), 16, 9);
        let context = context(temp_dir.path());
        let job = job_at(Stage::Normalize, &source);

        let output = NormalizeStage.execute(&job, &context).unwrap();
        assert_eq!(output.artifact_path, source);
        assert!(!context.layout.generation_dir(&job.id, 1).exists());
    }

    #[test]
    fn test_front_camera_is_unmirrored() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_png(&temp_dir.path().join("capture.png"), 16, 9);
        let context = context(temp_dir.path());
        let mut job = job_at(Stage::Normalize, &source);
        job.parameters.mirror_if_front_camera = true;

        let output = NormalizeStage.execute(&job, &context).unwrap();
        assert!(output.artifact_path.ends_with("g1/01_normalize.png"));

        let original = decode(&source).unwrap().to_rgb8();
        let flipped = decode(&output.artifact_path).unwrap().to_rgb8();
        assert_eq!(flipped.get_pixel(15, 4), original.get_pixel(0, 4));

        // Re-running overwrites the same file
        let again = NormalizeStage.execute(&job, &context).unwrap();
        assert_eq!(again.artifact_path, output.artifact_path);
    }
}
