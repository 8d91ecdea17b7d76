/// State type definitions for the proof job state machine
///
/// The stage sequence is a closed enum whose declaration order is the execution order,
/// so `Ord` on `Stage` is the pipeline order.
use crate::error::{FailureKind, ProofError, ProofResult};
use crate::imaging::Quality;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One discrete, ordered transformation in the processing chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Normalize,
    Watermark,
    Downscale,
    Compress,
    Save,
    Hash,
    Manifest,
    Finalize,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 8] = [
        Stage::Normalize,
        Stage::Watermark,
        Stage::Downscale,
        Stage::Compress,
        Stage::Save,
        Stage::Hash,
        Stage::Manifest,
        Stage::Finalize,
    ];

    pub fn first() -> Stage {
        Stage::Normalize
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// The following stage, `None` after Finalize
    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::Watermark => "watermark",
            Stage::Downscale => "downscale",
            Stage::Compress => "compress",
            Stage::Save => "save",
            Stage::Hash => "hash",
            Stage::Manifest => "manifest",
            Stage::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProofError::Storage(format!("Unknown stage '{}'", s)))
    }
}

/// Externally visible job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Retrying,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Succeeded => "Succeeded",
            JobStatus::Failed => "Failed",
            JobStatus::Retrying => "Retrying",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(JobStatus::Queued),
            "Running" => Ok(JobStatus::Running),
            "Succeeded" => Ok(JobStatus::Succeeded),
            "Failed" => Ok(JobStatus::Failed),
            "Retrying" => Ok(JobStatus::Retrying),
            other => Err(ProofError::Storage(format!("Unknown job status '{}'", other))),
        }
    }
}

/// Processing parameters, fixed when the job is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofParameters {
    /// Signed so out-of-range requests survive to validation instead of failing to parse
    pub max_megapixels: i64,
    pub quality: Quality,
    pub mirror_if_front_camera: bool,
}

impl ProofParameters {
    /// Check the cap against `limit` (`PipelineConfig::max_megapixels_limit`)
    pub fn validate(&self, limit: u32) -> ProofResult<()> {
        if self.max_megapixels <= 0 {
            return Err(ProofError::InvalidParameters(format!(
                "maxMegapixels must be > 0, got {}",
                self.max_megapixels
            )));
        }
        if self.max_megapixels > i64::from(limit) {
            return Err(ProofError::InvalidParameters(format!(
                "maxMegapixels must be <= {}, got {}",
                limit, self.max_megapixels
            )));
        }
        Ok(())
    }

    /// Cap as an unsigned value; only meaningful after `validate()`
    pub fn megapixel_cap(&self) -> u32 {
        self.max_megapixels.clamp(1, i64::from(u32::MAX)) as u32
    }
}

/// Why and where a job stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    pub kind: FailureKind,
    pub message: String,
    /// Stage that failed; `None` when the job was rejected before any stage ran
    pub stage: Option<Stage>,
    pub last_completed_stage: Option<Stage>,
    pub failed_at: DateTime<Utc>,
}

/// Outcome of one stage execution, as recorded in the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageRunOutcome {
    Completed,
    Retrying,
    Failed,
}

/// One entry in a job's processing history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage: Stage,
    pub generation: u64,
    /// 1-based execution number of this stage within the generation
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: StageRunOutcome,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}
