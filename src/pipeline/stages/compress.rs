use crate::error::ProofResult;
use crate::imaging::{decode, encode_jpeg};
use crate::pipeline::{PipelineStage, StageContext, StageOutput};
use crate::state_machine::{ProofJob, Stage};
use crate::storage::write_atomic;
use tracing::debug;

/// Stage that produces the lossy JPEG at the job's quality tier
///
/// Output: `work/<id>/g<gen>/04_compress.jpg`
pub struct CompressStage;

impl PipelineStage for CompressStage {
    fn execute(&self, job: &ProofJob, context: &StageContext) -> ProofResult<StageOutput> {
        let quality = context.quality.value(job.parameters.quality);
        let image = decode(&job.current_artifact_path)?;
        let bytes = encode_jpeg(&image, quality)?;

        let output = context
            .layout
            .stage_output(&job.id, job.generation, Stage::Compress, "jpg");
        write_atomic(&output, &bytes)?;

        debug!(
            target: "pipeline::compress",
            proof_id = %job.id,
            tier = %job.parameters.quality,
            quality,
            bytes = bytes.len(),
            "Encoded JPEG"
        );

        Ok(StageOutput::artifact(output))
    }

    fn name(&self) -> &str {
        "Compress"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Quality;
    use crate::pipeline::stages::test_support::{context, job_at, write_png};
    use tempfile::TempDir;

    #[test]
    fn test_compress_writes_jpeg() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_png(&temp_dir.path().join("in.png"), 64, 64);
        let context = context(temp_dir.path());
        let job = job_at(Stage::Compress, &source);

        let output = CompressStage.execute(&job, &context).unwrap();
        assert!(output.artifact_path.ends_with("g1/04_compress.jpg"));
        let bytes = std::fs::read(&output.artifact_path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_quality_tier_changes_size() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_png(&temp_dir.path().join("in.png"), 256, 256);
        let context = context(temp_dir.path());

        let mut low = job_at(Stage::Compress, &source);
        low.parameters.quality = Quality::Low;
        low.id = "low".to_string();
        let mut high = job_at(Stage::Compress, &source);
        high.parameters.quality = Quality::High;
        high.id = "high".to_string();

        let low_len = std::fs::metadata(CompressStage.execute(&low, &context).unwrap().artifact_path)
            .unwrap()
            .len();
        let high_len = std::fs::metadata(CompressStage.execute(&high, &context).unwrap().artifact_path)
            .unwrap()
            .len();
        assert!(low_len < high_len);
    }
}
