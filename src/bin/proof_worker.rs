//! Proof worker
//!
//! Resumes every unfinished proof job left in the job database (for example after the
//! process was killed mid-chain), prunes old terminal records and exits once the queue
//! has no live runs. Configuration comes from `PROOFMARK_*` environment variables.

use chrono::Utc;
use proofmark_lib::config::PipelineConfig;
use proofmark_lib::error::ProofResult;
use proofmark_lib::logger::{init_tracing, LogFormat};
use proofmark_lib::queue::ProofQueue;
use proofmark_lib::repository::{JobStore, SqliteJobStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const PRUNE_AFTER_DAYS: i64 = 30;

#[tokio::main]
async fn main() -> ProofResult<()> {
    init_tracing(LogFormat::from_env())?;
    tracing::info!("Starting proof worker");

    let config = PipelineConfig::from_env()?;
    tracing::info!(data_dir = %config.data_dir.display(), "Configuration loaded");

    let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::open(&config.database_path())?);
    let queue = ProofQueue::new(Arc::clone(&store), &config);

    let pruned = queue.prune(Utc::now() - chrono::Duration::days(PRUNE_AFTER_DAYS))?;
    if pruned > 0 {
        tracing::info!(pruned, "Removed old terminal jobs");
    }

    let resumed = queue.recover().await?;
    tracing::info!(resumed, "Worker ready");

    // Every run either reaches a terminal state or stops; none outlives its driver
    while queue.active_runs() > 0 {
        tracing::debug!(active = queue.active_runs(), "Waiting for jobs to finish");
        sleep(POLL_INTERVAL).await;
    }

    let stranded = store.list_unfinished()?.len();
    if stranded > 0 {
        tracing::warn!(stranded, "Unfinished jobs left for the next run");
    }

    for report in queue.list_recent(10)? {
        tracing::info!(
            proof_id = %report.proof_id,
            status = %report.status,
            sha256 = report.sha256.as_deref().unwrap_or("-"),
            "Recent proof"
        );
    }

    tracing::info!("Queue drained, exiting");
    Ok(())
}
