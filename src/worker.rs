//! Sync worker.
//!
//! Background worker that drains the durable queue. Handles per-kind
//! timeouts, retries with backoff, dead-lettering, stale lease release,
//! and graceful shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::queue::{QueuedTask, SyncQueue};

/// Executes one dequeued task. Implementations dispatch on the task
/// kind and parse the payload themselves.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &QueuedTask) -> SyncResult<()>;
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent tasks to process.
    pub concurrency: usize,

    /// How often to poll the queue (in milliseconds).
    pub poll_interval_ms: u64,

    /// How often to release stale tasks (in seconds).
    pub stale_release_interval_secs: u64,

    /// Maximum tasks per poll.
    pub batch_size: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 1000,
            stale_release_interval_secs: 300,
            batch_size: 10,
        }
    }
}

/// Worker that processes the sync queue.
pub struct SyncWorker<H: TaskHandler> {
    queue: Arc<SyncQueue>,
    handler: Arc<H>,
    config: WorkerConfig,
    sync_config: SyncConfig,
    shutdown: Arc<AtomicBool>,
}

impl<H: TaskHandler + 'static> SyncWorker<H> {
    /// Create a new worker.
    pub fn new(
        queue: Arc<SyncQueue>,
        handler: Arc<H>,
        config: WorkerConfig,
        sync_config: SyncConfig,
    ) -> Self {
        Self {
            queue,
            handler,
            config,
            sync_config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the worker.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            "Starting sync worker"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut poll_interval = interval(Duration::from_millis(self.config.poll_interval_ms));
        let mut stale_interval =
            interval(Duration::from_secs(self.config.stale_release_interval_secs));

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        info!("Worker shutdown requested, stopping poll loop");
                        break;
                    }
                    self.poll_and_process(&semaphore).await;
                }
                _ = stale_interval.tick() => {
                    self.release_stale_tasks().await;
                }
            }
        }

        // Wait for in-flight tasks to complete
        info!("Waiting for in-flight tasks to complete...");
        let _ = semaphore.acquire_many(self.config.concurrency as u32).await;
        info!("Worker stopped");
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown was requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Poll the queue and process tasks.
    async fn poll_and_process(&self, semaphore: &Arc<Semaphore>) {
        let lease = self.sync_config.sync_lease;
        let tasks = match self.queue.dequeue(self.config.batch_size, lease).await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "Failed to dequeue tasks");
                return;
            }
        };

        if tasks.is_empty() {
            return;
        }

        debug!(count = tasks.len(), "Dequeued tasks for processing");

        for task in tasks {
            // Try to acquire a permit
            let permit = if let Ok(p) = semaphore.clone().try_acquire_owned() {
                p
            } else {
                debug!("All worker slots busy, skipping remaining tasks");
                return;
            };

            let queue = self.queue.clone();
            let handler = self.handler.clone();
            let sync_config = self.sync_config.clone();

            // Process in background task
            tokio::spawn(async move {
                let _permit = permit; // Hold permit until task completes
                process_task(queue, handler, sync_config, task).await;
            });
        }
    }

    /// Release tasks whose lease expired.
    async fn release_stale_tasks(&self) {
        match self.queue.release_stale().await {
            Ok(count) if count > 0 => {
                warn!(count = count, "Released stale tasks");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Failed to release stale tasks");
            }
        }
    }
}

/// Process a single task.
#[instrument(skip(queue, handler, sync_config, task), fields(task_id = %task.id, kind = %task.kind))]
async fn process_task<H: TaskHandler>(
    queue: Arc<SyncQueue>,
    handler: Arc<H>,
    sync_config: SyncConfig,
    task: QueuedTask,
) {
    info!(shop_id = %task.shop_id, "Processing task");

    let start = std::time::Instant::now();
    let timeout = sync_config.task_timeout(task.kind);
    let (result, timed_out) = match tokio::time::timeout(timeout, handler.handle(&task)).await {
        Ok(result) => (result, false),
        Err(_) => (
            Err(SyncError::internal(format!(
                "Task exceeded its {}s timeout",
                timeout.as_secs()
            ))),
            true,
        ),
    };
    let duration_ms = start.elapsed().as_millis() as i64;

    match result {
        Ok(()) => {
            info!(duration_ms = duration_ms, "Task completed successfully");
            if let Err(e) = queue.complete(task.id).await {
                error!(error = %e, "Failed to mark task as complete");
            }
        }
        Err(e) => {
            let error_msg = e.to_string();
            warn!(
                duration_ms = duration_ms,
                error = %error_msg,
                retry_count = task.retry_count,
                "Task failed"
            );

            let can_retry =
                task.retry_count < task.max_retries && (e.is_retryable() || timed_out);

            let retry_in = if can_retry {
                Some(sync_config.backoff_for_attempt(task.retry_count + 1))
            } else {
                None
            };

            if let Err(re) = queue.fail(task.id, &error_msg, retry_in).await {
                error!(error = %re, "Failed to record task failure");
            }
        }
    }
}
