//! Tamper-evident photo proofs
//!
//! A capture goes through a fixed chain of stages:
//!
//! ```text
//! Normalize -> Watermark -> Downscale -> Compress -> Save -> Hash -> Manifest -> Finalize
//! ```
//!
//! and ends as `proofs/proof_<id>.jpg` plus a JSON manifest recording its SHA-256.
//! Jobs are persisted after every stage, so a killed process resumes where it left off.
//!
//! ```ignore
//! let config = PipelineConfig::from_env()?;
//! let store = Arc::new(SqliteJobStore::open(&config.database_path())?);
//! let queue = ProofQueue::new(store, &config);
//! queue.submit(SubmitRequest::new("capture.jpg", 12, Quality::High)).await?;
//! ```

pub mod config;
pub mod error;
pub mod evidence;
pub mod imaging;
pub mod logger;
pub mod pipeline;
pub mod queue;
pub mod repository;
pub mod state_machine;
pub mod storage;

pub use config::{PipelineConfig, RetryPolicy};
pub use error::{FailureKind, ProofError, ProofResult};
pub use queue::{JobStatusReport, ProofQueue, SubmitRequest};
pub use repository::{JobStore, SqliteJobStore};
pub use state_machine::{JobStatus, ProofJob, Stage};
