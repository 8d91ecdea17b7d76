//! Stage execution for the proof pipeline
//!
//! Each `Stage` variant maps to exactly one `PipelineStage` implementation through
//! `stages::handler`. The executor runs the job's current stage, classifies the outcome,
//! and leaves sequencing, persistence and retry timing to the caller (the queue).
//!
//! # Example
//! ```ignore
//! use proofmark_lib::pipeline::{NextStep, StageExecutor};
//!
//! let executor = StageExecutor::from_config(&config);
//! let policy = config.retry_policy();
//! job.start()?;
//! while executor.step(&mut job, &policy) == NextStep::Continue {
//!     store.commit(&job)?;
//! }
//! ```

pub mod context;
pub mod core;
pub mod executor;
pub mod stages;

// Re-export main types
pub use context::StageContext;
pub use core::{NextStep, PipelineStage, StageOutcome, StageOutput, StageResult};
pub use executor::StageExecutor;
