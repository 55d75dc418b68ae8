//! The polling worker loop.
//!
//! Cheap polling over a low/medium-volume queue, on purpose: claim a job if
//! one is there, otherwise sleep a fixed interval and try again. The sleep is
//! interruptible by a shutdown signal, and an in-flight job is always run to
//! completion before the loop exits — a handler is never abandoned midway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use leadops_core::CoreResult;

use super::store::JobStore;
use super::types::{Job, JobId, JobKind};

/// A job handler: turns a payload into a result, or an error that becomes the
/// job's terminal failure detail.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job) -> anyhow::Result<serde_json::Value>;
}

/// Worker loop configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name for logging.
    pub name: String,
    /// Idle sleep between polls of an empty queue.
    pub poll_interval: Duration,
    /// Restrict this worker to one job kind, if set.
    pub kind: Option<JobKind>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "job-worker".to_string(),
            poll_interval: Duration::from_millis(1500),
            kind: None,
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Outcome of one worker iteration that found a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(JobId),
    Failed(JobId),
}

/// Counters accumulated by a worker loop, returned at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Handle to a spawned worker loop.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<WorkerStats>,
}

impl WorkerHandle {
    /// Signal shutdown and wait for the loop to finish its in-flight job.
    pub async fn shutdown(self) -> WorkerStats {
        let _ = self.shutdown.send(true);
        self.join.await.unwrap_or_default()
    }
}

/// Claims jobs from a store and dispatches them to registered handlers.
pub struct JobWorker<S: JobStore> {
    store: Arc<S>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl<S: JobStore + 'static> JobWorker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for a job kind.
    pub fn register_handler(&mut self, kind: JobKind, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind.as_str().to_string(), handler);
    }

    /// One worker iteration: claim at most one job and run it to a terminal
    /// state. `Ok(None)` means the queue was empty.
    ///
    /// The claim itself is the `queued → running` transition; by the time a
    /// job is visible here, no other worker can hold it.
    pub async fn run_once(&self, kind: Option<&JobKind>) -> CoreResult<Option<JobOutcome>> {
        let Some(job) = self.store.claim_next(kind).await? else {
            return Ok(None);
        };

        debug!(job_id = %job.id, kind = %job.kind, attempt = job.attempts, "claimed job");
        Ok(Some(self.execute(&job).await?))
    }

    async fn execute(&self, job: &Job) -> CoreResult<JobOutcome> {
        let Some(handler) = self.handlers.get(job.kind.as_str()) else {
            let detail = format!("no handler registered for job kind '{}'", job.kind);
            warn!(job_id = %job.id, kind = %job.kind, "no handler for job");
            self.store.fail(job.id, detail).await?;
            return Ok(JobOutcome::Failed(job.id));
        };

        match handler.run(job).await {
            Ok(result) => {
                self.store.complete(job.id, result).await?;
                debug!(job_id = %job.id, "job completed");
                Ok(JobOutcome::Completed(job.id))
            }
            Err(err) => {
                // Terminal for this attempt. A retry is a new enqueue decided
                // elsewhere, never something the worker does on its own.
                let detail = format!("{err:#}");
                self.store.fail(job.id, detail.clone()).await?;
                debug!(job_id = %job.id, error = %detail, "job failed");
                Ok(JobOutcome::Failed(job.id))
            }
        }
    }

    /// Spawn the polling loop on the current tokio runtime.
    pub fn spawn(self, config: WorkerConfig) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(worker_loop(self, config, shutdown_rx));
        WorkerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

async fn worker_loop<S: JobStore + 'static>(
    worker: JobWorker<S>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> WorkerStats {
    info!(worker = %config.name, "job worker started");
    let mut stats = WorkerStats::default();

    loop {
        if *shutdown.borrow() {
            break;
        }

        match worker.run_once(config.kind.as_ref()).await {
            Ok(Some(outcome)) => {
                stats.processed += 1;
                match outcome {
                    JobOutcome::Completed(_) => stats.succeeded += 1,
                    JobOutcome::Failed(_) => stats.failed += 1,
                }
                // A job was there — check for the next one immediately.
            }
            Ok(None) => {
                idle_sleep(&config, &mut shutdown).await;
            }
            Err(err) => {
                // Transient store trouble: back off one interval and retry.
                error!(worker = %config.name, error = %err, "worker iteration failed");
                idle_sleep(&config, &mut shutdown).await;
            }
        }
    }

    info!(
        worker = %config.name,
        processed = stats.processed,
        succeeded = stats.succeeded,
        failed = stats.failed,
        "job worker stopped"
    );
    stats
}

async fn idle_sleep(config: &WorkerConfig, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(config.poll_interval) => {}
        _ = shutdown.changed() => {}
    }
}
