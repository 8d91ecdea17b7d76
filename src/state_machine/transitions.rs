/// State transition implementations
///
/// Every mutation of a `ProofJob` goes through one of these methods, which enforce the
/// forward-only stage order and the write-once hash.
use super::states::*;
use super::ProofJob;
use crate::config::RetryPolicy;
use crate::error::{ProofError, ProofResult};
use crate::evidence::location::{LocationFix, LocationState};
use crate::pipeline::core::StageOutput;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// What the scheduler should do after a failed stage execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Run the same stage again after the delay
    Retry(Duration),
    /// The job is now terminally `Failed`
    Fail,
}

// ============================================================================
// Creation
// ============================================================================

impl ProofJob {
    /// A queued job positioned before its first stage
    ///
    /// `generation` starts at 0; the job store assigns the real value on submission.
    pub fn new(
        id: impl Into<String>,
        input_path: impl Into<PathBuf>,
        parameters: ProofParameters,
        location_fix: Option<LocationFix>,
        location_state: LocationState,
        captured_at: DateTime<FixedOffset>,
    ) -> Self {
        let input_path = input_path.into();
        let now = Utc::now();
        Self {
            id: id.into(),
            generation: 0,
            current_artifact_path: input_path.clone(),
            input_path,
            parameters,
            location_fix,
            location_state,
            captured_at,
            stage: Stage::first(),
            last_completed_stage: None,
            sha256: None,
            output_bytes: None,
            manifest_path: None,
            status: JobStatus::Queued,
            attempt: 0,
            failure: None,
            created_at: now,
            updated_at: now,
            telemetry: BTreeMap::new(),
            total_elapsed_ms: None,
            history: Vec::new(),
        }
    }

    /// Mark a job failed before any stage has run
    pub fn reject(mut self, err: &ProofError) -> Self {
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.failure = Some(FailureInfo {
            kind: err.kind(),
            message: err.to_string(),
            stage: None,
            last_completed_stage: None,
            failed_at: now,
        });
        self.updated_at = now;
        self
    }
}

// ============================================================================
// Running Transitions
// ============================================================================

impl ProofJob {
    /// Enter `Running` for the current stage
    ///
    /// Allowed from `Queued`, `Retrying`, and `Running` (a run interrupted by a crash is
    /// resumed as-is).
    pub fn start(&mut self) -> ProofResult<()> {
        if self.status.is_terminal() {
            return Err(ProofError::InvalidStateTransition(format!(
                "Cannot start job {} in status {}",
                self.id, self.status
            )));
        }
        self.status = JobStatus::Running;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a completed stage and move to the next one
    pub fn advance(
        &mut self,
        stage: Stage,
        output: StageOutput,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> ProofResult<()> {
        if self.status != JobStatus::Running {
            return Err(ProofError::InvalidStateTransition(format!(
                "Cannot complete {} for job {} in status {}",
                stage, self.id, self.status
            )));
        }
        if stage != self.stage {
            return Err(ProofError::InvalidStateTransition(format!(
                "Job {} is at {}, cannot complete {}",
                self.id, self.stage, stage
            )));
        }

        if let Some(sha256) = output.sha256 {
            match &self.sha256 {
                Some(existing) if *existing != sha256 => {
                    return Err(ProofError::InvalidStateTransition(format!(
                        "Job {} already has hash {}, refusing {}",
                        self.id, existing, sha256
                    )));
                }
                _ => self.sha256 = Some(sha256),
            }
        }
        if output.output_bytes.is_some() {
            self.output_bytes = output.output_bytes;
        }
        if output.manifest_path.is_some() {
            self.manifest_path = output.manifest_path;
        }
        self.current_artifact_path = output.artifact_path;

        let elapsed_ms = elapsed.as_millis() as u64;
        self.push_history(stage, started_at, elapsed_ms, StageRunOutcome::Completed, None);
        self.telemetry.insert(stage.as_str().to_string(), elapsed_ms);
        self.last_completed_stage = Some(stage);
        self.attempt = 0;
        self.failure = None;

        match stage.next() {
            Some(next) => self.stage = next,
            None => {
                self.status = JobStatus::Succeeded;
                self.total_elapsed_ms = Some(self.telemetry.values().sum());
            }
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a failed execution of the current stage and decide whether to retry
    ///
    /// Transient scheduling errors always retry without using up an attempt; other
    /// retryable errors retry until `max_attempts` executions have failed.
    pub fn record_failure(
        &mut self,
        err: &ProofError,
        policy: &RetryPolicy,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> FailureDecision {
        let elapsed_ms = elapsed.as_millis() as u64;

        if err.is_transient() {
            self.push_history(self.stage, started_at, elapsed_ms, StageRunOutcome::Retrying, Some(err));
            self.status = JobStatus::Retrying;
            self.updated_at = Utc::now();
            return FailureDecision::Retry(policy.backoff(self.attempt + 1));
        }

        if err.is_retryable() && self.attempt + 1 < policy.max_attempts {
            self.push_history(self.stage, started_at, elapsed_ms, StageRunOutcome::Retrying, Some(err));
            self.attempt += 1;
            self.status = JobStatus::Retrying;
            self.updated_at = Utc::now();
            return FailureDecision::Retry(policy.backoff(self.attempt));
        }

        self.fail(err, started_at, elapsed);
        FailureDecision::Fail
    }

    /// Terminally fail the current stage
    pub fn fail(&mut self, err: &ProofError, started_at: DateTime<Utc>, elapsed: Duration) {
        self.push_history(
            self.stage,
            started_at,
            elapsed.as_millis() as u64,
            StageRunOutcome::Failed,
            Some(err),
        );
        let now = Utc::now();
        self.attempt += 1;
        self.status = JobStatus::Failed;
        self.failure = Some(FailureInfo {
            kind: err.kind(),
            message: err.to_string(),
            stage: Some(self.stage),
            last_completed_stage: self.last_completed_stage,
            failed_at: now,
        });
        self.updated_at = now;
    }

    fn push_history(
        &mut self,
        stage: Stage,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
        outcome: StageRunOutcome,
        err: Option<&ProofError>,
    ) {
        self.history.push(StageRecord {
            stage,
            generation: self.generation,
            attempt: self.attempt + 1,
            started_at,
            elapsed_ms,
            outcome,
            error: err.map(|e| e.to_string()),
        });
    }
}
