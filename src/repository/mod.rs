//! Repository Pattern Implementation
//!
//! Abstract job storage so the queue can run against any durable backend.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            JobStore trait               │
//! │  (replace / load / commit / list ...)   │
//! └──────────────┬──────────────────────────┘
//!                │
//!         ┌──────▼────────┐
//!         │SqliteJobStore │
//!         │- WAL journal  │
//!         │- CAS commits  │
//!         └───────────────┘
//! ```

pub mod sqlite;
pub mod traits;

// Re-export main types
pub use sqlite::SqliteJobStore;
pub use traits::JobStore;
