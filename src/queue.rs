//! Durable proof queue
//!
//! `ProofQueue` accepts submissions, persists them through the injected `JobStore` and
//! drives each job's stage chain on the tokio runtime:
//!
//! - every stage and every job store call runs in `spawn_blocking`
//! - a per-id lock keeps stages of the same proof id from overlapping
//! - the job is reloaded before each stage; a newer generation stops the old run
//! - each stage result is committed with a generation compare-and-set
//! - a semaphore bounds how many jobs run at once
//!
//! A process kill leaves every job at its last committed stage; `recover()` picks them up.

use crate::config::{PipelineConfig, RetryPolicy};
use crate::error::{ProofError, ProofResult};
use crate::evidence::{LocationFix, LocationPolicy, VerificationReport, Verifier};
use crate::imaging::Quality;
use crate::pipeline::{NextStep, StageExecutor};
use crate::repository::JobStore;
use crate::state_machine::{FailureInfo, JobStatus, ProofJob, ProofParameters, Stage};
use crate::storage::ArtifactLayout;
use chrono::{DateTime, FixedOffset, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

const MAX_PROOF_ID_LEN: usize = 64;
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Consecutive busy-store errors a run tolerates before the job is failed
const MAX_SCHEDULING_RETRIES: u32 = 10;

/// A capture handed to the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Defaults to the capture time in milliseconds since the epoch
    #[serde(default)]
    pub proof_id: Option<String>,
    pub source_image_path: PathBuf,
    /// Defaults to `PipelineConfig::default_max_megapixels`
    #[serde(default)]
    pub max_megapixels: Option<i64>,
    pub quality: Quality,
    #[serde(default)]
    pub location_fix: Option<LocationFix>,
    #[serde(default)]
    pub mirror_if_front_camera: bool,
    /// Defaults to now, in the local offset
    #[serde(default)]
    pub captured_at: Option<DateTime<FixedOffset>>,
}

impl SubmitRequest {
    pub fn new(source_image_path: impl Into<PathBuf>, max_megapixels: i64, quality: Quality) -> Self {
        Self {
            max_megapixels: Some(max_megapixels),
            ..Self::with_default_cap(source_image_path, quality)
        }
    }

    /// A request that takes its megapixel cap from the queue's configuration
    pub fn with_default_cap(source_image_path: impl Into<PathBuf>, quality: Quality) -> Self {
        Self {
            proof_id: None,
            source_image_path: source_image_path.into(),
            max_megapixels: None,
            quality,
            location_fix: None,
            mirror_if_front_camera: false,
            captured_at: None,
        }
    }

    pub fn with_proof_id(mut self, proof_id: impl Into<String>) -> Self {
        self.proof_id = Some(proof_id.into());
        self
    }

    pub fn with_location(mut self, fix: LocationFix) -> Self {
        self.location_fix = Some(fix);
        self
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<FixedOffset>) -> Self {
        self.captured_at = Some(captured_at);
        self
    }
}

/// What callers see when they query a proof
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub proof_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_artifact_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_completed_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
}

impl From<&ProofJob> for JobStatusReport {
    fn from(job: &ProofJob) -> Self {
        Self {
            proof_id: job.id.clone(),
            status: job.status,
            final_artifact_path: job.final_artifact_path().cloned(),
            sha256: job.sha256.clone(),
            manifest_path: job.manifest_path.clone(),
            last_completed_stage: job.last_completed_stage,
            failure: job.failure.clone(),
        }
    }
}

/// Handle to the proof queue; cheap to clone
#[derive(Clone)]
pub struct ProofQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    store: Arc<dyn JobStore>,
    executor: Arc<StageExecutor>,
    layout: ArtifactLayout,
    retry_policy: RetryPolicy,
    location_policy: LocationPolicy,
    default_max_megapixels: u32,
    max_megapixels_limit: u32,
    permits: Arc<Semaphore>,
    /// Per proof id; held for the duration of one stage
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// (id, generation) pairs with a live driver task
    active: Mutex<HashSet<(String, u64)>>,
}

/// Result of one locked stage step
enum RunStep {
    Continue,
    RetryAfter(Duration),
    Done,
}

impl ProofQueue {
    pub fn new(store: Arc<dyn JobStore>, config: &PipelineConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                store,
                executor: Arc::new(StageExecutor::from_config(config)),
                layout: config.layout(),
                retry_policy: config.retry_policy(),
                location_policy: config.location_policy(),
                default_max_megapixels: config.default_max_megapixels,
                max_megapixels_limit: config.max_megapixels_limit,
                permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
                locks: Mutex::new(HashMap::new()),
                active: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    /// Accept a capture and start its chain
    ///
    /// A submission for an id that already exists replaces it: the stored generation is
    /// bumped, the files earlier runs left under that id are removed, and any run still
    /// working on the old generation stops at its next stage boundary.
    /// Invalid parameters are recorded as a `Failed` job without running any stage.
    pub async fn submit(&self, request: SubmitRequest) -> ProofResult<ProofJob> {
        let captured_at = request
            .captured_at
            .unwrap_or_else(|| Local::now().fixed_offset());
        let proof_id = request
            .proof_id
            .clone()
            .unwrap_or_else(|| captured_at.timestamp_millis().to_string());
        validate_proof_id(&proof_id)?;

        let parameters = ProofParameters {
            max_megapixels: request
                .max_megapixels
                .unwrap_or_else(|| i64::from(self.inner.default_max_megapixels)),
            quality: request.quality,
            mirror_if_front_camera: request.mirror_if_front_camera,
        };
        let location_state = self
            .inner
            .location_policy
            .classify(request.location_fix.as_ref());

        let job = ProofJob::new(
            proof_id,
            request.source_image_path,
            parameters,
            request.location_fix,
            location_state,
            captured_at,
        );

        if let Err(e) = parameters.validate(self.inner.max_megapixels_limit) {
            let stored = self.inner.replace_job(job.reject(&e)).await?;
            warn!(
                target: "queue",
                proof_id = %stored.id,
                generation = stored.generation,
                "Submission rejected: {}",
                e
            );
            return Ok(stored);
        }

        let stored = self.inner.replace_job(job).await?;
        info!(
            target: "queue",
            proof_id = %stored.id,
            generation = stored.generation,
            location = stored.location_state.as_str(),
            quality = %stored.parameters.quality,
            max_megapixels = stored.parameters.max_megapixels,
            "Proof job queued"
        );

        self.spawn_run(stored.id.clone(), stored.generation);
        Ok(stored)
    }

    /// Current status of a proof
    pub fn status(&self, proof_id: &str) -> ProofResult<JobStatusReport> {
        self.inner
            .store
            .load(proof_id)?
            .map(|job| JobStatusReport::from(&job))
            .ok_or_else(|| ProofError::JobNotFound(proof_id.to_string()))
    }

    /// Full job record, including telemetry and history
    pub fn job(&self, proof_id: &str) -> ProofResult<ProofJob> {
        self.inner
            .store
            .load(proof_id)?
            .ok_or_else(|| ProofError::JobNotFound(proof_id.to_string()))
    }

    /// Newest jobs first, for library views
    pub fn list_recent(&self, limit: usize) -> ProofResult<Vec<JobStatusReport>> {
        Ok(self
            .inner
            .store
            .list_recent(limit)?
            .iter()
            .map(JobStatusReport::from)
            .collect())
    }

    /// Resume every unfinished job from its last committed stage
    ///
    /// Returns the number of jobs resumed.
    pub async fn recover(&self) -> ProofResult<usize> {
        let unfinished = self.inner.with_store(|store| store.list_unfinished()).await?;
        let mut resumed = 0;
        for job in unfinished {
            info!(
                target: "queue",
                proof_id = %job.id,
                generation = job.generation,
                stage = %job.stage,
                status = %job.status,
                "Resuming proof job"
            );
            if self.spawn_run(job.id, job.generation) {
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    /// Number of runs with a live driver in this process
    pub fn active_runs(&self) -> usize {
        self.inner.active.lock().map_or(0, |active| active.len())
    }

    /// Wait until the job is `Succeeded` or `Failed`
    pub async fn wait_for(&self, proof_id: &str, timeout: Duration) -> ProofResult<ProofJob> {
        let poll = async {
            loop {
                let id = proof_id.to_string();
                match self.inner.with_store(move |store| store.load(&id)).await? {
                    Some(job) if job.is_terminal() => return Ok(job),
                    Some(_) => {}
                    None => return Err(ProofError::JobNotFound(proof_id.to_string())),
                }
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            ProofError::TransientScheduling(format!(
                "Timed out after {:?} waiting for proof {}",
                timeout, proof_id
            ))
        })?
    }

    /// Re-hash a finished proof against its manifest
    pub fn verify(&self, proof_id: &str) -> ProofResult<VerificationReport> {
        let job = self.job(proof_id)?;
        if job.status != JobStatus::Succeeded {
            return Err(ProofError::InvalidStateTransition(format!(
                "Proof {} is {}, only succeeded proofs can be verified",
                proof_id, job.status
            )));
        }
        let manifest_path = job
            .manifest_path
            .ok_or_else(|| ProofError::MissingInput(format!("No manifest for proof {}", proof_id)))?;
        Verifier::verify(manifest_path)
    }

    /// Delete terminal job records last updated before `older_than`
    pub fn prune(&self, older_than: DateTime<Utc>) -> ProofResult<usize> {
        self.inner.store.prune_terminal(older_than)
    }

    /// Start a driver for (id, generation) unless one is already running
    fn spawn_run(&self, proof_id: String, generation: u64) -> bool {
        let key = (proof_id.clone(), generation);
        match self.inner.active.lock() {
            Ok(mut active) => {
                if !active.insert(key.clone()) {
                    debug!(target: "queue", proof_id = %proof_id, generation, "Run already active");
                    return false;
                }
            }
            Err(_) => {
                error!(target: "queue", proof_id = %proof_id, "Active run registry poisoned");
                return false;
            }
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.drive(&proof_id, generation).await;
            if let Ok(mut active) = inner.active.lock() {
                active.remove(&key);
            }
            inner.release_lock(&proof_id);
        });
        true
    }
}

impl QueueInner {
    /// Run a job store call on the blocking pool
    async fn with_store<T, F>(&self, call: F) -> ProofResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn JobStore) -> ProofResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || call(store.as_ref())).await?
    }

    /// Commit `job` and hand it back
    async fn commit(&self, job: ProofJob) -> ProofResult<ProofJob> {
        self.with_store(move |store| {
            store.commit(&job)?;
            Ok(job)
        })
        .await
    }

    /// Store a new generation of a job and clear the files older ones left behind
    ///
    /// Holds the id's lock: an older run is either finished or waiting for its next
    /// stage, where it reloads the job and finds itself superseded, so nothing it
    /// wrote can reappear after the purge.
    async fn replace_job(&self, job: ProofJob) -> ProofResult<ProofJob> {
        let proof_id = job.id.clone();
        let lock = self.lock_for(&proof_id)?;
        let stored = {
            let _guard = lock.lock().await;
            let (stored, previous) = self
                .with_store(move |store| {
                    let previous = store.load(&job.id)?.map(|old| old.generation);
                    Ok((store.replace(job)?, previous))
                })
                .await?;

            self.layout.purge_proof(&proof_id)?;
            if let Some(previous) = previous {
                info!(
                    target: "queue",
                    proof_id = %proof_id,
                    previous,
                    generation = stored.generation,
                    "Replaced earlier submission"
                );
            }
            stored
        };
        drop(lock);
        self.release_lock(&proof_id);
        Ok(stored)
    }

    async fn drive(&self, proof_id: &str, generation: u64) {
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let mut hiccups = 0;
        loop {
            match self.run_stage(proof_id, generation).await {
                Ok(RunStep::Continue) => hiccups = 0,
                Ok(RunStep::RetryAfter(delay)) => {
                    hiccups = 0;
                    debug!(
                        target: "queue",
                        proof_id = %proof_id,
                        generation,
                        delay_ms = delay.as_millis() as u64,
                        "Backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(RunStep::Done) => break,
                Err(ProofError::Superseded { .. }) => {
                    info!(
                        target: "queue",
                        proof_id = %proof_id,
                        generation,
                        "Run superseded by a newer submission"
                    );
                    break;
                }
                Err(e) if e.is_transient() && hiccups < MAX_SCHEDULING_RETRIES => {
                    hiccups += 1;
                    let delay = self.retry_policy.backoff(hiccups);
                    warn!(
                        target: "queue",
                        proof_id = %proof_id,
                        generation,
                        "Scheduling hiccup, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        target: "queue",
                        proof_id = %proof_id,
                        generation,
                        "Run stopped: {}",
                        e
                    );
                    self.fail_run(proof_id, generation, &e).await;
                    break;
                }
            }
        }
    }

    /// Run the job's current stage under its per-id lock and commit the outcome
    async fn run_stage(&self, proof_id: &str, generation: u64) -> ProofResult<RunStep> {
        let lock = self.lock_for(proof_id)?;
        let _guard = lock.lock().await;

        let id = proof_id.to_string();
        let mut job = self
            .with_store(move |store| store.load(&id))
            .await?
            .ok_or_else(|| ProofError::Superseded {
                id: proof_id.to_string(),
                generation,
            })?;
        if job.generation != generation {
            return Err(ProofError::Superseded {
                id: proof_id.to_string(),
                generation,
            });
        }
        if job.is_terminal() {
            return Ok(RunStep::Done);
        }

        job.start()?;
        let mut job = self.commit(job).await?;

        let executor = Arc::clone(&self.executor);
        let policy = self.retry_policy;
        let snapshot = job.clone();
        let started_at = Utc::now();
        let clock = Instant::now();
        let stepped = tokio::task::spawn_blocking(move || {
            let next = executor.step(&mut job, &policy);
            (job, next)
        })
        .await;

        let (job, next) = match stepped {
            Ok(stepped) => stepped,
            Err(join_err) => {
                let err = ProofError::from(join_err);
                let mut job = snapshot;
                job.fail(&err, started_at, clock.elapsed());
                (job, NextStep::Finished)
            }
        };

        let job = self.commit(job).await?;

        Ok(match next {
            NextStep::Continue => RunStep::Continue,
            NextStep::RetryAfter(delay) => RunStep::RetryAfter(delay),
            NextStep::Finished => {
                match job.status {
                    JobStatus::Succeeded => info!(
                        target: "queue",
                        proof_id = %job.id,
                        generation,
                        elapsed_ms = job.total_elapsed_ms.unwrap_or_default(),
                        sha256 = job.sha256.as_deref().unwrap_or_default(),
                        "Proof succeeded"
                    ),
                    _ => {
                        warn!(
                            target: "queue",
                            proof_id = %job.id,
                            generation,
                            stage = %job.stage,
                            "Proof failed: {}",
                            job.failure.as_ref().map(|f| f.message.as_str()).unwrap_or("unknown")
                        );
                        self.discard_scratch(proof_id, generation);
                    }
                }
                RunStep::Done
            }
        })
    }

    /// Record an error raised outside the stage itself as a terminal failure
    ///
    /// Best effort: if the store is still unusable the job stays at its last committed
    /// stage and `recover()` resumes it in the next process.
    async fn fail_run(&self, proof_id: &str, generation: u64, err: &ProofError) {
        let lock = match self.lock_for(proof_id) {
            Ok(lock) => lock,
            Err(_) => return,
        };
        let _guard = lock.lock().await;

        let id = proof_id.to_string();
        let mut job = match self.with_store(move |store| store.load(&id)).await {
            Ok(Some(job)) if job.generation == generation && !job.is_terminal() => job,
            Ok(_) => return,
            Err(e) => {
                warn!(target: "queue", proof_id = %proof_id, generation, "Could not load job to fail it: {}", e);
                return;
            }
        };

        job.fail(err, Utc::now(), Duration::ZERO);
        match self.commit(job).await {
            Ok(_) => {
                warn!(target: "queue", proof_id = %proof_id, generation, "Proof marked failed");
                self.discard_scratch(proof_id, generation);
            }
            Err(e) => {
                warn!(target: "queue", proof_id = %proof_id, generation, "Could not record failure: {}", e);
            }
        }
    }

    /// Intermediates of a failed run are never read again
    fn discard_scratch(&self, proof_id: &str, generation: u64) {
        if let Err(e) = self.layout.remove_generation_dir(proof_id, generation) {
            warn!(target: "queue", proof_id = %proof_id, generation, "Failed to remove work dir: {}", e);
        }
    }

    fn lock_for(&self, proof_id: &str) -> ProofResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.locks.lock()?;
        Ok(Arc::clone(locks.entry(proof_id.to_string()).or_default()))
    }

    /// Drop the id's lock once no driver holds it
    fn release_lock(&self, proof_id: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            if locks
                .get(proof_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(proof_id);
            }
        }
    }
}

/// Proof ids become file names: `[A-Za-z0-9_-]{1,64}`
pub fn validate_proof_id(proof_id: &str) -> ProofResult<()> {
    let valid = !proof_id.is_empty()
        && proof_id.len() <= MAX_PROOF_ID_LEN
        && proof_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ProofError::InvalidParameters(format!(
            "Invalid proof id '{}'",
            proof_id
        )))
    }
}
