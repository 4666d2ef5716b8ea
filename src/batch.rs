//! Batch orchestration.
//!
//! Runs a set of independent sync tasks with bounded concurrency and
//! failure isolation: one task failing never stops its siblings.
//! Higher-priority lanes start first, progress is observable while the
//! batch runs, and lifecycle hooks fire on first failure, on an
//! all-green batch, and unconditionally at the end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::error::SyncResult;
use crate::types::TaskPriority;

/// One unit of work in a batch.
pub struct BatchItem {
    /// Item id, reported in the outcome.
    pub id: Uuid,
    /// Start lane. Higher-priority items start first.
    pub priority: TaskPriority,
    /// The work itself.
    pub task: BoxFuture<'static, SyncResult<()>>,
}

impl BatchItem {
    #[must_use]
    pub fn new(id: Uuid, priority: TaskPriority, task: BoxFuture<'static, SyncResult<()>>) -> Self {
        Self { id, priority, task }
    }
}

/// Point-in-time snapshot of a running batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchProgress {
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.processed >= self.total
    }
}

/// Shared counters observable while a batch runs.
#[derive(Debug)]
pub struct BatchTracker {
    total: usize,
    processed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl BatchTracker {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            processed: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn snapshot(&self) -> BatchProgress {
        BatchProgress {
            total: self.total,
            processed: self.processed.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Final batch result.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<(Uuid, String)>,
}

impl BatchOutcome {
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Lifecycle hooks observed during a batch run. All default to no-ops.
#[async_trait]
pub trait BatchHooks: Send + Sync {
    /// Fired once, for the first item that fails.
    async fn on_first_failure(&self, _item_id: Uuid, _error: &str) {}

    /// Fired after the run when every item succeeded.
    async fn on_all_succeeded(&self, _outcome: &BatchOutcome) {}

    /// Fired after the run unconditionally.
    async fn on_finally(&self, _outcome: &BatchOutcome) {}
}

/// Hooks implementation that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

#[async_trait]
impl BatchHooks for NoHooks {}

/// Runs batches of independent sync tasks.
pub struct BatchOrchestrator {
    concurrency: usize,
}

impl BatchOrchestrator {
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// Run all items to completion. The caller may poll `tracker` from
    /// another task while the batch runs.
    #[instrument(skip(self, items, hooks, tracker), fields(total = items.len()))]
    pub async fn run_with_tracker(
        &self,
        mut items: Vec<BatchItem>,
        hooks: &dyn BatchHooks,
        tracker: Arc<BatchTracker>,
    ) -> BatchOutcome {
        items.sort_by_key(|item| item.priority.rank());

        let first_failure_seen = AtomicUsize::new(0);
        let results: Vec<(Uuid, Result<(), String>)> = stream::iter(items)
            .map(|item| {
                let tracker = Arc::clone(&tracker);
                let first_failure_seen = &first_failure_seen;
                async move {
                    let id = item.id;
                    match item.task.await {
                        Ok(()) => {
                            tracker.record_success();
                            (id, Ok(()))
                        }
                        Err(err) => {
                            tracker.record_failure();
                            let message = err.to_string();
                            error!(item_id = %id, error = %message, "Batch item failed");
                            if first_failure_seen.fetch_add(1, Ordering::SeqCst) == 0 {
                                hooks.on_first_failure(id, &message).await;
                            }
                            (id, Err(message))
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for (id, result) in results {
            match result {
                Ok(()) => outcome.succeeded.push(id),
                Err(message) => outcome.failed.push((id, message)),
            }
        }

        if outcome.all_succeeded() {
            hooks.on_all_succeeded(&outcome).await;
        }
        hooks.on_finally(&outcome).await;

        info!(
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Batch finished"
        );
        outcome
    }

    /// Run all items with an internal tracker.
    pub async fn run(&self, items: Vec<BatchItem>, hooks: &dyn BatchHooks) -> BatchOutcome {
        let tracker = Arc::new(BatchTracker::new(items.len()));
        self.run_with_tracker(items, hooks, tracker).await
    }
}
