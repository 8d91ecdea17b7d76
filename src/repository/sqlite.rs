//! SQLite-backed job store
//!
//! One row per proof id. The full `ProofJob` is stored as JSON; `generation`, `status`,
//! `stage` and the timestamps are mirrored into columns for queries and the
//! compare-and-set in `commit`.

use super::traits::JobStore;
use crate::error::{ProofError, ProofResult};
use crate::state_machine::{JobStatus, ProofJob};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) the job database at `path`
    pub fn open(path: &Path) -> ProofResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn)?;
        info!(target: "repository", "Job store opened at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database, for tests and dry runs
    pub fn open_in_memory() -> ProofResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> ProofResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // Every commit must survive a kill between stages
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;",
        )?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> ProofResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS proof_jobs (
                id          TEXT PRIMARY KEY NOT NULL,
                generation  INTEGER NOT NULL,
                status      TEXT NOT NULL,
                stage       TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                job_json    TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_proof_jobs_created_at
             ON proof_jobs(created_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_proof_jobs_status
             ON proof_jobs(status)",
            [],
        )?;

        Ok(())
    }

    fn query_jobs(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> ProofResult<Vec<ProofJob>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;

        let mut jobs = Vec::new();
        for json in rows {
            jobs.push(serde_json::from_str(&json?)?);
        }
        Ok(jobs)
    }
}

/// Fixed-width RFC 3339 so text order matches time order
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl JobStore for SqliteJobStore {
    fn replace(&self, mut job: ProofJob) -> ProofResult<ProofJob> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        let previous: Option<i64> = tx
            .query_row(
                "SELECT generation FROM proof_jobs WHERE id = ?1",
                params![job.id],
                |row| row.get(0),
            )
            .optional()?;

        job.generation = previous.map_or(1, |generation| generation as u64 + 1);
        job.updated_at = Utc::now();

        tx.execute(
            "INSERT OR REPLACE INTO proof_jobs
                (id, generation, status, stage, created_at, updated_at, job_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.id,
                job.generation as i64,
                job.status.as_str(),
                job.stage.as_str(),
                timestamp(job.created_at),
                timestamp(job.updated_at),
                serde_json::to_string(&job)?,
            ],
        )?;
        tx.commit()?;

        debug!(
            target: "repository",
            proof_id = %job.id,
            generation = job.generation,
            replaced = previous.is_some(),
            "Job stored"
        );
        Ok(job)
    }

    fn load(&self, id: &str) -> ProofResult<Option<ProofJob>> {
        let conn = self.conn.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT job_json FROM proof_jobs WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn list_recent(&self, limit: usize) -> ProofResult<Vec<ProofJob>> {
        let conn = self.conn.lock()?;
        Self::query_jobs(
            &conn,
            "SELECT job_json FROM proof_jobs
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
            params![limit.min(i64::MAX as usize) as i64],
        )
    }

    fn list_unfinished(&self) -> ProofResult<Vec<ProofJob>> {
        let conn = self.conn.lock()?;
        Self::query_jobs(
            &conn,
            "SELECT job_json FROM proof_jobs
             WHERE status IN (?1, ?2, ?3)
             ORDER BY created_at ASC, id ASC",
            params![
                JobStatus::Queued.as_str(),
                JobStatus::Running.as_str(),
                JobStatus::Retrying.as_str(),
            ],
        )
    }

    fn commit(&self, job: &ProofJob) -> ProofResult<()> {
        let conn = self.conn.lock()?;
        let updated = conn.execute(
            "UPDATE proof_jobs
             SET status = ?1, stage = ?2, updated_at = ?3, job_json = ?4
             WHERE id = ?5 AND generation = ?6",
            params![
                job.status.as_str(),
                job.stage.as_str(),
                timestamp(job.updated_at),
                serde_json::to_string(job)?,
                job.id,
                job.generation as i64,
            ],
        )?;

        if updated == 0 {
            return Err(ProofError::Superseded {
                id: job.id.clone(),
                generation: job.generation,
            });
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> ProofResult<()> {
        let conn = self.conn.lock()?;
        conn.execute("DELETE FROM proof_jobs WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn prune_terminal(&self, older_than: DateTime<Utc>) -> ProofResult<usize> {
        let conn = self.conn.lock()?;
        let removed = conn.execute(
            "DELETE FROM proof_jobs
             WHERE status IN (?1, ?2) AND updated_at < ?3",
            params![
                JobStatus::Succeeded.as_str(),
                JobStatus::Failed.as_str(),
                timestamp(older_than),
            ],
        )?;
        if removed > 0 {
            info!(target: "repository", removed, "Pruned terminal jobs");
        }
        Ok(removed)
    }
}
