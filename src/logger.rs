//! Tracing setup for binaries
//!
//! The library only emits `tracing` events; installing a subscriber is left to the
//! process that embeds it. `RUST_LOG` overrides the default `info` filter.

use crate::error::{ProofError, ProofResult};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers
    Json,
}

impl LogFormat {
    /// `PROOFMARK_LOG_FORMAT=json` selects JSON; anything else is human-readable
    pub fn from_env() -> Self {
        match std::env::var("PROOFMARK_LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber
///
/// Fails if one is already installed.
pub fn init_tracing(format: LogFormat) -> ProofResult<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true);

    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| ProofError::ConfigError(format!("Failed to install logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_is_pretty() {
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_from_env() {
        std::env::set_var("PROOFMARK_LOG_FORMAT", "JSON");
        assert_eq!(LogFormat::from_env(), LogFormat::Json);
        std::env::set_var("PROOFMARK_LOG_FORMAT", "plain");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);
        std::env::remove_var("PROOFMARK_LOG_FORMAT");
        assert_eq!(LogFormat::from_env(), LogFormat::Pretty);
    }

    #[test]
    fn test_default_filter_is_info() {
        let filter = EnvFilter::new(DEFAULT_FILTER);
        assert_eq!(
            filter.max_level_hint(),
            Some(tracing::level_filters::LevelFilter::INFO)
        );
    }
}
