//! Repository trait definitions
//!
//! The job store is the only shared mutable state in the pipeline. It is constructed
//! once and handed to the queue as `Arc<dyn JobStore>`; nothing reaches it through a
//! global.

use crate::error::ProofResult;
use crate::state_machine::ProofJob;
use chrono::{DateTime, Utc};

/// Durable storage for proof jobs, one record per proof id
///
/// Every method is atomic with respect to the record it touches. Implementations must be
/// crash-consistent: a committed write survives a process kill.
pub trait JobStore: Send + Sync {
    /// Insert `job`, replacing any existing record for the same id
    ///
    /// The stored generation becomes one more than the previous record's (or 1), which
    /// invalidates every in-flight run of the old record. Returns the job as stored.
    fn replace(&self, job: ProofJob) -> ProofResult<ProofJob>;

    /// Load a job by id
    fn load(&self, id: &str) -> ProofResult<Option<ProofJob>>;

    /// Most recently created jobs, newest first
    fn list_recent(&self, limit: usize) -> ProofResult<Vec<ProofJob>>;

    /// Jobs in `Queued`, `Running` or `Retrying`, oldest first
    fn list_unfinished(&self) -> ProofResult<Vec<ProofJob>>;

    /// Persist `job` if its generation is still the stored one
    ///
    /// Fails with `Superseded` when the record was replaced (or removed) since the run
    /// started.
    fn commit(&self, job: &ProofJob) -> ProofResult<()>;

    /// Delete a job record
    fn delete(&self, id: &str) -> ProofResult<()>;

    /// Delete `Succeeded`/`Failed` records last updated before `older_than`
    fn prune_terminal(&self, older_than: DateTime<Utc>) -> ProofResult<usize>;

    /// Check if a record exists for `id`
    fn exists(&self, id: &str) -> ProofResult<bool> {
        Ok(self.load(id)?.is_some())
    }
}
