use super::context::StageContext;
use super::core::{NextStep, StageOutcome, StageResult};
use super::stages;
use crate::config::{PipelineConfig, RetryPolicy};
use crate::error::{ProofError, ProofResult};
use crate::state_machine::{ProofJob, Stage};
use chrono::Utc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Runs one stage of a job with uniform validation, classification and logging
///
/// The executor never mutates the job; callers fold the returned `StageResult` into it
/// (see `StageResult::apply`) and persist the outcome before running the next stage.
///
/// # Example
/// ```ignore
/// let executor = StageExecutor::from_config(&config);
/// let result = executor.execute(&job);
/// match result.apply(&mut job, &config.retry_policy()) {
///     NextStep::Continue => { /* persist, run job.stage next */ }
///     NextStep::RetryAfter(delay) => { /* persist Retrying, sleep */ }
///     NextStep::Finished => { /* persist terminal state */ }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct StageExecutor {
    context: StageContext,
}

impl StageExecutor {
    pub fn new(context: StageContext) -> Self {
        Self { context }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(StageContext::from_config(config))
    }

    pub fn context(&self) -> &StageContext {
        &self.context
    }

    /// Execute the job's current stage
    ///
    /// Blocking; run it off the async runtime.
    pub fn execute(&self, job: &ProofJob) -> StageResult {
        let stage = job.stage;
        let handler = stages::handler(stage);
        let started_at = Utc::now();
        let timer = Instant::now();

        info!(
            target: "pipeline",
            proof_id = %job.id,
            generation = job.generation,
            stage = %stage,
            attempt = job.attempt + 1,
            "Executing stage {}/{}: {}",
            stage.index() + 1,
            Stage::ALL.len(),
            handler.name()
        );

        let result = self
            .check_boundary(job)
            .and_then(|_| handler.pre_execute(job, &self.context))
            .and_then(|_| handler.execute(job, &self.context));
        let duration = timer.elapsed();
        let elapsed_ms = duration.as_millis() as u64;

        let outcome = match result {
            Ok(output) => {
                info!(
                    target: "pipeline",
                    proof_id = %job.id,
                    stage = %stage,
                    elapsed_ms,
                    artifact = %output.artifact_path.display(),
                    "Stage '{}' completed",
                    handler.name()
                );
                StageOutcome::Completed(output)
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    target: "pipeline",
                    proof_id = %job.id,
                    stage = %stage,
                    elapsed_ms,
                    "Stage '{}' failed, retryable: {}",
                    handler.name(),
                    e
                );
                StageOutcome::Retryable(e)
            }
            Err(e) => {
                error!(
                    target: "pipeline",
                    proof_id = %job.id,
                    stage = %stage,
                    elapsed_ms,
                    kind = ?e.kind(),
                    "Stage '{}' failed: {}",
                    handler.name(),
                    e
                );
                StageOutcome::Fatal(e)
            }
        };

        StageResult {
            stage,
            outcome,
            started_at,
            duration,
        }
    }

    /// Execute the current stage and fold the result into `job`
    pub fn step(&self, job: &mut ProofJob, policy: &RetryPolicy) -> NextStep {
        let result = self.execute(job);
        result.apply(job, policy)
    }

    /// The typed job state is re-validated at every stage boundary
    fn check_boundary(&self, job: &ProofJob) -> ProofResult<()> {
        if job.is_terminal() {
            return Err(ProofError::InvalidStateTransition(format!(
                "Job {} is already {}",
                job.id, job.status
            )));
        }
        job.parameters.validate(self.context.max_megapixels_limit)?;
        if job.stage > Stage::Hash && job.sha256.is_none() {
            return Err(ProofError::MissingInput(format!(
                "Job {} reached {} without a recorded hash",
                job.id, job.stage
            )));
        }
        Ok(())
    }
}
