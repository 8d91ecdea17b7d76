//! Pipeline configuration
//!
//! Every tunable the pipeline reads lives here: JPEG quality per tier, the default
//! megapixel cap, retry/backoff policy, location freshness thresholds, concurrency and
//! the data directory. Values come from `PROOFMARK_*` environment variables (optionally
//! via a `.env` file) and fall back to the defaults below.

use crate::error::{ProofError, ProofResult};
use crate::evidence::location::{LocationPolicy, LocationState};
use crate::imaging::codec::QualityPolicy;
use crate::storage::ArtifactLayout;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "PROOFMARK_";

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Root for `work/`, `proofs/` and the job database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Identifier burned into the watermark (last 6 characters are shown)
    #[serde(default)]
    pub device_id: Option<String>,

    /// Cap used when a submission does not carry one
    #[serde(default = "default_max_megapixels")]
    pub default_max_megapixels: u32,

    /// Largest cap a submission may ask for
    #[serde(default = "default_max_megapixels_limit")]
    pub max_megapixels_limit: u32,

    #[serde(default = "default_quality_low")]
    pub quality_low: u8,

    #[serde(default = "default_quality_med")]
    pub quality_med: u8,

    #[serde(default = "default_quality_high")]
    pub quality_high: u8,

    /// Executions allowed per stage before the job fails
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    #[serde(default = "default_fresh_max_age")]
    pub location_fresh_max_age_secs: u64,

    #[serde(default = "default_stale_after")]
    pub location_stale_after_secs: u64,

    /// State assigned to fixes aged between the fresh and stale thresholds
    #[serde(default = "default_gap_state")]
    pub location_gap_state: LocationState,

    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    #[serde(default)]
    pub delete_source_on_success: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("proofmark-data")
}

fn default_max_megapixels() -> u32 {
    12
}

fn default_max_megapixels_limit() -> u32 {
    1_000
}

fn default_quality_low() -> u8 {
    70
}

fn default_quality_med() -> u8 {
    85
}

fn default_quality_high() -> u8 {
    92
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_fresh_max_age() -> u64 {
    10
}

fn default_stale_after() -> u64 {
    120
}

fn default_gap_state() -> LocationState {
    LocationState::Fresh
}

fn default_max_concurrent_jobs() -> usize {
    2
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            device_id: None,
            default_max_megapixels: default_max_megapixels(),
            max_megapixels_limit: default_max_megapixels_limit(),
            quality_low: default_quality_low(),
            quality_med: default_quality_med(),
            quality_high: default_quality_high(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            location_fresh_max_age_secs: default_fresh_max_age(),
            location_stale_after_secs: default_stale_after(),
            location_gap_state: default_gap_state(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            delete_source_on_success: false,
        }
    }
}

/// Bounded retry with capped exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before the given retry (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let shift = retry.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }
}

impl PipelineConfig {
    /// Load configuration from `PROOFMARK_*` environment variables
    pub fn from_env() -> ProofResult<Self> {
        dotenvy::dotenv().ok();
        let config: Self = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ProofResult<()> {
        for (name, value) in [
            ("quality_low", self.quality_low),
            ("quality_med", self.quality_med),
            ("quality_high", self.quality_high),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ProofError::ConfigError(format!(
                    "{} must be within 1..=100, got {}",
                    name, value
                )));
            }
        }
        if self.default_max_megapixels == 0 {
            return Err(ProofError::ConfigError(
                "default_max_megapixels must be > 0".to_string(),
            ));
        }
        if self.default_max_megapixels > self.max_megapixels_limit {
            return Err(ProofError::ConfigError(format!(
                "default_max_megapixels ({}) exceeds max_megapixels_limit ({})",
                self.default_max_megapixels, self.max_megapixels_limit
            )));
        }
        if self.max_attempts == 0 {
            return Err(ProofError::ConfigError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ProofError::ConfigError(
                "max_concurrent_jobs must be at least 1".to_string(),
            ));
        }
        if self.location_stale_after_secs < self.location_fresh_max_age_secs {
            return Err(ProofError::ConfigError(format!(
                "location_stale_after_secs ({}) is below location_fresh_max_age_secs ({})",
                self.location_stale_after_secs, self.location_fresh_max_age_secs
            )));
        }
        Ok(())
    }

    pub fn quality_policy(&self) -> QualityPolicy {
        QualityPolicy {
            low: self.quality_low,
            med: self.quality_med,
            high: self.quality_high,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms)),
        }
    }

    pub fn location_policy(&self) -> LocationPolicy {
        LocationPolicy {
            fresh_max_age_secs: self.location_fresh_max_age_secs,
            stale_after_secs: self.location_stale_after_secs,
            gap_state: self.location_gap_state,
        }
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.data_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("proofmark.db")
    }

    /// Configured device id, falling back to the host name
    pub fn resolved_device_id(&self) -> String {
        self.device_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| {
                hostname::get()
                    .ok()
                    .map(|name| name.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| "device".to_string())
    }
}
