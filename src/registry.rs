//! JobRegistry — serializes and bounds concurrent transcodes (§4.4).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::model::Variant;
use crate::transcoder::{self, TranscoderOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Spawning,
    Running,
    Completed,
    Cancelled,
    Failed,
    TimedOut,
    /// The transcoder binary itself could not be started (missing executable,
    /// permission denied). Distinct from `Failed` so the caller can surface
    /// `TranscoderUnavailable` instead of a generic readiness failure (§7).
    SpawnFailed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Spawning | JobStatus::Running)
    }
}

#[derive(Clone)]
pub struct JobHandle {
    pub item_id: String,
    pub variant: Variant,
    pub work_dir: PathBuf,
    pub started_at: Instant,
    cancel: CancellationToken,
    status: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    pub fn is_running(&self) -> bool {
        !self.status().is_terminal()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the job reaches a terminal status.
    pub async fn wait_terminal(&self) -> JobStatus {
        let mut rx = self.status.clone();
        loop {
            let current = *rx.borrow();
            if current.is_terminal() {
                return current;
            }
            if rx.changed().await.is_err() {
                return *rx.borrow();
            }
        }
    }
}

pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, JobHandle>>>,
    max_concurrent: usize,
    transcoder_binary: String,
    job_timeout: Duration,
}

impl JobRegistry {
    pub fn new(max_concurrent: usize, transcoder_binary: String, job_timeout: Duration) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            max_concurrent: max_concurrent.max(1),
            transcoder_binary,
            job_timeout,
        }
    }

    pub async fn running_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    /// Ensures a job is running for `item_id` with exactly `variant`.
    ///
    /// `on_complete` fires exactly once, only for a job this call actually
    /// spawns (never on reuse), and only when the job exits cleanly — this is
    /// the hook Streamer uses to mark the cache entry complete (§4.5 step 7).
    pub async fn ensure_running<F, C>(
        &self,
        item_id: &str,
        variant: Variant,
        work_dir: PathBuf,
        argv_factory: F,
        on_complete: C,
    ) -> JobHandle
    where
        F: FnOnce() -> Vec<String>,
        C: FnOnce() + Send + 'static,
    {
        let mut jobs = self.jobs.lock().await;

        if let Some(existing) = jobs.get(item_id) {
            if existing.variant == variant && existing.is_running() {
                return existing.clone();
            }
            info!(item_id, "variant changed, preempting running job");
            existing.cancel();
            jobs.remove(item_id);
        }

        if jobs.len() >= self.max_concurrent {
            if let Some((oldest_key, _)) = jobs
                .iter()
                .min_by_key(|(_, handle)| handle.started_at)
                .map(|(k, h)| (k.clone(), h.started_at))
            {
                info!(item_id = oldest_key, "concurrency cap reached, cancelling oldest job");
                if let Some(victim) = jobs.remove(&oldest_key) {
                    victim.cancel();
                }
            }
        }

        let argv = argv_factory();
        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(JobStatus::Spawning);

        let handle = JobHandle {
            item_id: item_id.to_string(),
            variant,
            work_dir: work_dir.clone(),
            started_at: Instant::now(),
            cancel: cancel.clone(),
            status: status_rx,
        };

        let binary = self.transcoder_binary.clone();
        let timeout = self.job_timeout;
        let jobs_arc = Arc::clone(&self.jobs);
        let item_id_owned = item_id.to_string();
        let started_at = handle.started_at;

        let _ = status_tx.send(JobStatus::Running);
        crate::metrics::ACTIVE_JOBS.inc();

        tokio::spawn(async move {
            let outcome = transcoder::run(&binary, &argv, &work_dir, cancel, timeout).await;
            crate::metrics::ACTIVE_JOBS.dec();

            let terminal = match &outcome {
                TranscoderOutcome::Exited { success: true, .. } => JobStatus::Completed,
                TranscoderOutcome::Exited { success: false, stderr_tail } => {
                    tracing::warn!(item_id = item_id_owned, stderr = %stderr_tail, "transcoder exited with error");
                    JobStatus::Failed
                }
                TranscoderOutcome::Cancelled => JobStatus::Cancelled,
                TranscoderOutcome::TimedOut => {
                    tracing::warn!(item_id = item_id_owned, "transcoder job timed out");
                    JobStatus::TimedOut
                }
                TranscoderOutcome::SpawnFailed(e) => {
                    tracing::error!(item_id = item_id_owned, error = %e, "failed to spawn transcoder");
                    JobStatus::SpawnFailed
                }
            };
            let _ = status_tx.send(terminal);

            {
                let mut jobs = jobs_arc.lock().await;
                // Only remove our own entry: a later `ensure_running` call may
                // have already preempted this one and inserted a fresh handle
                // under the same key.
                if let Some(current) = jobs.get(&item_id_owned) {
                    if current.started_at == started_at {
                        jobs.remove(&item_id_owned);
                    }
                }
            }

            if matches!(terminal, JobStatus::Completed) {
                on_complete();
            }
        });

        jobs.insert(item_id.to_string(), handle.clone());
        handle
    }
}
