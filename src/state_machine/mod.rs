/// Proof job state machine
///
/// A `ProofJob` is the single, strongly typed record of one proof's processing run.
/// It moves through the ordered stages one at a time:
///
/// ```text
/// Queued -> Running(k) -> Running(k+1) | Retrying(k) | Failed
/// Retrying(k) -> Running(k)            (after backoff)
/// Running(Finalize) -> Succeeded
/// ```
///
/// Transitions live in `transitions.rs`; the record itself is persisted as JSON by the
/// job store after every transition.
pub mod states;
pub mod transitions;

pub use states::*;
pub use transitions::FailureDecision;

use crate::evidence::location::{LocationFix, LocationState};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofJob {
    /// Stable per capture; the unique-work key
    pub id: String,

    /// Bumped by the store on every (re)submission of `id`
    pub generation: u64,

    pub input_path: PathBuf,
    pub parameters: ProofParameters,
    pub location_fix: Option<LocationFix>,
    pub location_state: LocationState,

    /// Capture instant with the capturing device's UTC offset
    pub captured_at: DateTime<FixedOffset>,

    /// Next stage to run (or the stage that failed)
    pub stage: Stage,
    pub last_completed_stage: Option<Stage>,

    /// Output of the last completed stage, input to `stage`
    pub current_artifact_path: PathBuf,

    /// Set by the Hash stage, never changed afterward
    pub sha256: Option<String>,
    pub output_bytes: Option<u64>,
    pub manifest_path: Option<PathBuf>,

    pub status: JobStatus,

    /// Failed executions of `stage` in this generation
    pub attempt: u32,
    pub failure: Option<FailureInfo>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Elapsed milliseconds per completed stage, keyed by stage name
    pub telemetry: BTreeMap<String, u64>,
    /// Sum of stage times once the chain has finished
    pub total_elapsed_ms: Option<u64>,
    pub history: Vec<StageRecord>,
}

impl ProofJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Final JPEG, available once the job has succeeded
    pub fn final_artifact_path(&self) -> Option<&PathBuf> {
        (self.status == JobStatus::Succeeded).then_some(&self.current_artifact_path)
    }

    pub fn stage_elapsed_ms(&self, stage: Stage) -> Option<u64> {
        self.telemetry.get(stage.as_str()).copied()
    }

    /// How many times `stage` completed across the recorded history
    pub fn completions_of(&self, stage: Stage) -> usize {
        self.history
            .iter()
            .filter(|record| record.stage == stage && record.outcome == StageRunOutcome::Completed)
            .count()
    }
}
