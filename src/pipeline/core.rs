use crate::config::RetryPolicy;
use crate::error::{ProofError, ProofResult};
use crate::state_machine::{FailureDecision, ProofJob, Stage};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

use super::context::StageContext;

/// A single stage in the proof pipeline
///
/// Each stage reads the job's current artifact and writes its output to a fixed,
/// overwrite-safe path, so running it twice on the same input is harmless.
pub trait PipelineStage: Send + Sync {
    /// Execute this stage
    ///
    /// Returns the new current artifact (and any fields the stage fills in). Errors are
    /// classified by the executor into retryable and fatal.
    fn execute(&self, job: &ProofJob, context: &StageContext) -> ProofResult<StageOutput>;

    /// Get stage name for logging
    fn name(&self) -> &str;

    /// Called before execute() - the input artifact must exist and be complete
    fn pre_execute(&self, job: &ProofJob, _context: &StageContext) -> ProofResult<()> {
        if !job.current_artifact_path.is_file() {
            return Err(ProofError::MissingInput(format!(
                "{} (proof {})",
                job.current_artifact_path.display(),
                job.id
            )));
        }
        Ok(())
    }
}

/// What a successful stage hands back to the job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    pub artifact_path: PathBuf,
    pub sha256: Option<String>,
    pub output_bytes: Option<u64>,
    pub manifest_path: Option<PathBuf>,
}

impl StageOutput {
    pub fn artifact(path: impl Into<PathBuf>) -> Self {
        Self {
            artifact_path: path.into(),
            sha256: None,
            output_bytes: None,
            manifest_path: None,
        }
    }

    pub fn with_hash(mut self, sha256: impl Into<String>, output_bytes: u64) -> Self {
        self.sha256 = Some(sha256.into());
        self.output_bytes = Some(output_bytes);
        self
    }

    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }
}

/// Classified result of one stage execution
#[derive(Debug)]
pub enum StageOutcome {
    Completed(StageOutput),
    /// Worth running again (I/O trouble, contention)
    Retryable(ProofError),
    /// The chain halts
    Fatal(ProofError),
}

/// What the scheduler does after folding a result into the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Run the job's next stage
    Continue,
    /// Run the same stage again after the delay
    RetryAfter(Duration),
    /// The job reached `Succeeded` or `Failed`
    Finished,
}

/// Result of a pipeline stage execution
#[derive(Debug)]
pub struct StageResult {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl StageResult {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, StageOutcome::Completed(_))
    }

    /// Apply this result to the job's state
    pub fn apply(self, job: &mut ProofJob, policy: &RetryPolicy) -> NextStep {
        match self.outcome {
            StageOutcome::Completed(output) => {
                match job.advance(self.stage, output, self.started_at, self.duration) {
                    Ok(()) if job.is_terminal() => NextStep::Finished,
                    Ok(()) => NextStep::Continue,
                    Err(e) => {
                        job.fail(&e, self.started_at, self.duration);
                        NextStep::Finished
                    }
                }
            }
            StageOutcome::Retryable(err) => {
                match job.record_failure(&err, policy, self.started_at, self.duration) {
                    FailureDecision::Retry(delay) => NextStep::RetryAfter(delay),
                    FailureDecision::Fail => NextStep::Finished,
                }
            }
            StageOutcome::Fatal(err) => {
                job.fail(&err, self.started_at, self.duration);
                NextStep::Finished
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::evidence::LocationState;
    use crate::imaging::Quality;
    use crate::state_machine::{JobStatus, ProofParameters};

    fn running_job() -> ProofJob {
        let mut job = ProofJob::new(
            "p1",
            "/tmp/in.jpg",
            ProofParameters {
                max_megapixels: 12,
                quality: Quality::Med,
                mirror_if_front_camera: false,
            },
            None,
            LocationState::None,
            Utc::now().fixed_offset(),
        );
        job.start().unwrap();
        job
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }

    fn result(outcome: StageOutcome) -> StageResult {
        StageResult {
            stage: Stage::Normalize,
            outcome,
            started_at: Utc::now(),
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_stage_output_builders() {
        let output = StageOutput::artifact("/tmp/a.jpg")
            .with_hash("cd".repeat(32), 99)
            .with_manifest("/tmp/a.json");
        assert_eq!(output.output_bytes, Some(99));
        assert_eq!(output.manifest_path, Some(PathBuf::from("/tmp/a.json")));
    }

    #[test]
    fn test_apply_completed_continues() {
        let mut job = running_job();
        let step = result(StageOutcome::Completed(StageOutput::artifact("/tmp/01.png")))
            .apply(&mut job, &policy());
        assert_eq!(step, NextStep::Continue);
        assert_eq!(job.stage, Stage::Watermark);
        assert_eq!(job.current_artifact_path, PathBuf::from("/tmp/01.png"));
    }

    #[test]
    fn test_apply_retryable_then_exhausted() {
        let mut job = running_job();
        let io = || StageOutcome::Retryable(ProofError::Io(std::io::Error::other("EBUSY")));

        assert_eq!(
            result(io()).apply(&mut job, &policy()),
            NextStep::RetryAfter(Duration::from_millis(50))
        );
        job.start().unwrap();
        assert_eq!(result(io()).apply(&mut job, &policy()), NextStep::Finished);
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_apply_fatal_fails_job() {
        let mut job = running_job();
        let step = result(StageOutcome::Fatal(ProofError::MissingInput("gone".into())))
            .apply(&mut job, &policy());
        assert_eq!(step, NextStep::Finished);
        assert_eq!(job.failure.unwrap().kind, FailureKind::MissingInput);
    }
}
