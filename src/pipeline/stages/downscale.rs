use crate::error::ProofResult;
use crate::imaging::{cap_megapixels, capped_dimensions, decode, save_png};
use crate::pipeline::{PipelineStage, StageContext, StageOutput};
use crate::state_machine::{ProofJob, Stage};
use tracing::{debug, info};

/// Stage that enforces the job's megapixel cap
///
/// Output: `work/<id>/g<gen>/03_downscale.png`, or the input unchanged when it already
/// fits (only the header is read in that case).
pub struct DownscaleStage;

impl PipelineStage for DownscaleStage {
    fn execute(&self, job: &ProofJob, context: &StageContext) -> ProofResult<StageOutput> {
        let cap = job.parameters.megapixel_cap();
        let (width, height) = image::image_dimensions(&job.current_artifact_path)?;

        let Some((new_width, new_height)) = capped_dimensions(width, height, cap) else {
            debug!(
                target: "pipeline::downscale",
                proof_id = %job.id,
                width,
                height,
                cap,
                "Within megapixel cap"
            );
            return Ok(StageOutput::artifact(job.current_artifact_path.clone()));
        };

        info!(
            target: "pipeline::downscale",
            proof_id = %job.id,
            "Downscaling {}x{} -> {}x{} (cap {} MP)",
            width,
            height,
            new_width,
            new_height,
            cap
        );

        let image = decode(&job.current_artifact_path)?;
        let scaled = cap_megapixels(image, cap);
        let output = context
            .layout
            .stage_output(&job.id, job.generation, Stage::Downscale, "png");
        save_png(&scaled, &output)?;

        Ok(StageOutput::artifact(output))
    }

    fn name(&self) -> &str {
        "Downscale"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::test_support::{context, job_at, write_png};
    use tempfile::TempDir;

    #[test]
    fn test_within_cap_returns_input() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_png(&temp_dir.path().join("in.png"), 320, 240);
        let context = context(temp_dir.path());
        let job = job_at(Stage::Downscale, &source);

        let output = DownscaleStage.execute(&job, &context).unwrap();
        assert_eq!(output.artifact_path, source);
    }

    #[test]
    fn test_over_cap_is_resized() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_png(&temp_dir.path().join("in.png"), 1600, 1200);
        let context = context(temp_dir.path());
        let mut job = job_at(Stage::Downscale, &source);
        job.parameters.max_megapixels = 1;

        let output = DownscaleStage.execute(&job, &context).unwrap();
        assert!(output.artifact_path.ends_with("g1/03_downscale.png"));
        let (width, height) = image::image_dimensions(&output.artifact_path).unwrap();
        assert_eq!((width, height), (1154, 866));
        assert!(width as u64 * height as u64 <= 1_000_000);
    }
}
