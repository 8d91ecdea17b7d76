use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Central error type for the proof pipeline
#[derive(Error, Debug)]
pub enum ProofError {
    // ============================================================================
    // Stage Errors
    // ============================================================================
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Transient scheduling error: {0}")]
    TransientScheduling(String),

    #[error("Required input missing: {0}")]
    MissingInput(String),

    #[error("Hash mismatch for {path}: expected {expected}, found {actual}")]
    IntegrityMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    // ============================================================================
    // Job Errors
    // ============================================================================
    #[error("Proof job not found: {0}")]
    JobNotFound(String),

    #[error("Proof job {id} (generation {generation}) was superseded by a newer submission")]
    Superseded { id: String, generation: u64 },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    // ============================================================================
    // Storage Errors
    // ============================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Manifest builder error: {0}")]
    BuilderError(String),

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Mutex lock error")]
    LockError,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Persisted classification of a failure, visible to callers querying a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    DecodeError,
    IoError,
    InvalidParameters,
    TransientSchedulingError,
    MissingInput,
    IntegrityMismatch,
    Internal,
}

impl ProofError {
    /// Classification recorded on a failed job
    pub fn kind(&self) -> FailureKind {
        match self {
            ProofError::Decode(_) => FailureKind::DecodeError,
            ProofError::Io(_) => FailureKind::IoError,
            ProofError::InvalidParameters(_) => FailureKind::InvalidParameters,
            ProofError::TransientScheduling(_) => FailureKind::TransientSchedulingError,
            ProofError::MissingInput(_) => FailureKind::MissingInput,
            ProofError::IntegrityMismatch { .. } => FailureKind::IntegrityMismatch,
            _ => FailureKind::Internal,
        }
    }

    /// Whether the scheduler may run the stage again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProofError::Io(_) | ProofError::TransientScheduling(_)
        )
    }

    /// Transient errors are retried without consuming the per-stage attempt budget
    pub fn is_transient(&self) -> bool {
        matches!(self, ProofError::TransientScheduling(_))
    }
}

// Implement conversion from PoisonError for Mutex locks
impl<T> From<std::sync::PoisonError<T>> for ProofError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ProofError::LockError
    }
}

impl From<image::ImageError> for ProofError {
    fn from(err: image::ImageError) -> Self {
        use image::ImageError;
        match err {
            ImageError::IoError(e) => ProofError::Io(e),
            ImageError::Encoding(e) => ProofError::Io(std::io::Error::other(e.to_string())),
            ImageError::Parameter(e) => ProofError::Internal(e.to_string()),
            other => ProofError::Decode(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ProofError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                ProofError::TransientScheduling(format!("Job store busy: {}", err))
            }
            _ => ProofError::Storage(err.to_string()),
        }
    }
}

// A panicking stage would panic again on the same input, so it is never retried
impl From<tokio::task::JoinError> for ProofError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            ProofError::Internal(format!("Stage task panicked: {}", err))
        } else {
            ProofError::Internal(format!("Stage task was cancelled: {}", err))
        }
    }
}

impl From<envy::Error> for ProofError {
    fn from(err: envy::Error) -> Self {
        ProofError::ConfigError(err.to_string())
    }
}

// Helper type alias for Results
pub type ProofResult<T> = Result<T, ProofError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProofError::InvalidParameters("maxMegapixels must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid parameters: maxMegapixels must be > 0"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let proof_err: ProofError = io_err.into();
        assert!(matches!(proof_err, ProofError::Io(_)));
        assert_eq!(proof_err.kind(), FailureKind::IoError);
    }

    #[test]
    fn test_retry_classification() {
        assert!(ProofError::Io(std::io::Error::other("disk full")).is_retryable());
        assert!(ProofError::TransientScheduling("busy".into()).is_retryable());
        assert!(ProofError::TransientScheduling("busy".into()).is_transient());
        assert!(!ProofError::Decode("corrupt".into()).is_retryable());
        assert!(!ProofError::InvalidParameters("bad".into()).is_retryable());
        assert!(!ProofError::MissingInput("gone".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_panicked_task_is_fatal() {
        let join_err = tokio::task::spawn_blocking(|| panic!("corrupt scanline"))
            .await
            .unwrap_err();
        let err = ProofError::from(join_err);

        assert!(matches!(err, ProofError::Internal(_)));
        assert_eq!(err.kind(), FailureKind::Internal);
        assert!(!err.is_retryable());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_integrity_mismatch_display() {
        let err = ProofError::IntegrityMismatch {
            path: "/tmp/proof.jpg".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(err.to_string().contains("expected aa"));
        assert_eq!(err.kind(), FailureKind::IntegrityMismatch);
    }
}
