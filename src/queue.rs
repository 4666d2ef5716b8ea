//! Durable task queue.
//!
//! Tasks survive process restarts and are executed by independent worker
//! processes. Dequeue uses `FOR UPDATE SKIP LOCKED` so workers never
//! contend on the same row, and every claimed task carries a time-bounded
//! lease: a crashed worker's tasks become claimable again once the lease
//! expires instead of wedging the pipeline.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::fmt;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::types::TaskPriority;

/// Kind of work a queued task performs. Each kind declares its own
/// wall-clock timeout through `SyncConfig::task_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Resolve missing categories for a product set and store a preview.
    ResolveCategories,
    /// Materialize approved categories parent-first.
    CreateCategories,
    /// Push one entity to one shop.
    PushEntity,
    /// Pull one entity from one shop.
    PullEntity,
    /// Synchronize a variant's combinations.
    SyncVariants,
    /// Deferred expiration of a pending category preview.
    ExpirePreview,
}

impl TaskKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::ResolveCategories => "resolve_categories",
            TaskKind::CreateCategories => "create_categories",
            TaskKind::PushEntity => "push_entity",
            TaskKind::PullEntity => "pull_entity",
            TaskKind::SyncVariants => "sync_variants",
            TaskKind::ExpirePreview => "expire_preview",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "resolve_categories" => Ok(TaskKind::ResolveCategories),
            "create_categories" => Ok(TaskKind::CreateCategories),
            "push_entity" => Ok(TaskKind::PushEntity),
            "pull_entity" => Ok(TaskKind::PullEntity),
            "sync_variants" => Ok(TaskKind::SyncVariants),
            "expire_preview" => Ok(TaskKind::ExpirePreview),
            _ => Err(format!("Unknown task kind: {s}")),
        }
    }
}

/// A task persisted in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    /// Task id.
    pub id: Uuid,
    /// Target shop.
    pub shop_id: Uuid,
    /// Subject entity, when the task is entity-scoped.
    pub entity_id: Option<Uuid>,
    /// What to do.
    pub kind: TaskKind,
    /// Dispatch lane.
    pub priority: TaskPriority,
    /// At-most-one-in-flight key, e.g. `push:{shop}:{entity}`. While a
    /// task with this key is pending or claimed, enqueueing another with
    /// the same key is a no-op.
    pub unique_key: Option<String>,
    /// Kind-specific payload.
    pub payload: Value,
    /// Attempts so far.
    pub retry_count: i32,
    /// Retry budget.
    pub max_retries: i32,
    /// Not dispatched before this instant (backoff scheduling).
    pub scheduled_at: DateTime<Utc>,
    /// Lease expiry while claimed by a worker.
    pub locked_until: Option<DateTime<Utc>>,
    /// Last failure message.
    pub last_error: Option<String>,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
}

impl QueuedTask {
    /// Create a task ready for immediate dispatch.
    #[must_use]
    pub fn new(shop_id: Uuid, entity_id: Option<Uuid>, kind: TaskKind, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            shop_id,
            entity_id,
            kind,
            priority: TaskPriority::Normal,
            unique_key: None,
            payload,
            retry_count: 0,
            max_retries: 3,
            scheduled_at: Utc::now(),
            locked_until: None,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Set the dispatch lane.
    #[must_use]
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the uniqueness key.
    #[must_use]
    pub fn with_unique_key(mut self, key: impl Into<String>) -> Self {
        self.unique_key = Some(key.into());
        self
    }

    /// Delay first dispatch (deferred tasks such as preview expiration).
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.scheduled_at = Utc::now()
            + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(0));
        self
    }

    /// The uniqueness key enforcing one in-flight push per (entity, shop).
    #[must_use]
    pub fn push_key(shop_id: Uuid, entity_id: Uuid) -> String {
        format!("push:{shop_id}:{entity_id}")
    }
}

/// Dispatch seam used by the pipelines to hand work to the queue
/// without depending on a live database.
#[async_trait::async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Enqueue a task. Returns `false` when a uniqueness key suppressed
    /// the insert.
    async fn schedule(&self, task: QueuedTask) -> SyncResult<bool>;
}

/// Postgres-backed durable queue.
pub struct SyncQueue {
    pool: PgPool,
}

#[async_trait::async_trait]
impl TaskScheduler for SyncQueue {
    async fn schedule(&self, task: QueuedTask) -> SyncResult<bool> {
        self.enqueue(&task).await
    }
}

impl SyncQueue {
    /// Create a queue over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a task. When the task carries a uniqueness key and a live
    /// task with that key already exists, nothing is inserted and `false`
    /// is returned.
    #[instrument(skip(self, task), fields(kind = %task.kind, shop_id = %task.shop_id))]
    pub async fn enqueue(&self, task: &QueuedTask) -> SyncResult<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO sync_queue (
                id, shop_id, entity_id, kind, priority, unique_key, payload,
                retry_count, max_retries, scheduled_at, locked_until,
                last_error, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL, NULL, 'pending', $11)
            ON CONFLICT (unique_key) WHERE status IN ('pending', 'in_progress')
            DO NOTHING
            ",
        )
        .bind(task.id)
        .bind(task.shop_id)
        .bind(task.entity_id)
        .bind(task.kind.as_str())
        .bind(task.priority.rank())
        .bind(&task.unique_key)
        .bind(&task.payload)
        .bind(task.retry_count)
        .bind(task.max_retries)
        .bind(task.scheduled_at)
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Claim up to `limit` dispatchable tasks, leasing each until
    /// `now + lease`. High-priority lanes drain first.
    #[instrument(skip(self))]
    pub async fn dequeue(&self, limit: i64, lease: Duration) -> SyncResult<Vec<QueuedTask>> {
        let locked_until = Utc::now()
            + ChronoDuration::from_std(lease).unwrap_or_else(|_| ChronoDuration::minutes(15));

        let rows = sqlx::query_as::<_, TaskRow>(
            r"
            UPDATE sync_queue
            SET status = 'in_progress', locked_until = $2
            WHERE id IN (
                SELECT id FROM sync_queue
                WHERE status = 'pending' AND scheduled_at <= NOW()
                ORDER BY priority, scheduled_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, shop_id, entity_id, kind, priority, unique_key,
                      payload, retry_count, max_retries, scheduled_at,
                      locked_until, last_error, created_at
            ",
        )
        .bind(limit)
        .bind(locked_until)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(TaskRow::to_task).collect())
    }

    /// Mark a task done and release its uniqueness key.
    #[instrument(skip(self))]
    pub async fn complete(&self, task_id: Uuid) -> SyncResult<()> {
        sqlx::query(
            r"
            UPDATE sync_queue
            SET status = 'completed', locked_until = NULL
            WHERE id = $1
            ",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a failed attempt. A retryable failure within budget goes
    /// back to pending with the given backoff; otherwise the task lands
    /// in the dead-letter state with its error retained.
    #[instrument(skip(self, error))]
    pub async fn fail(
        &self,
        task_id: Uuid,
        error: &str,
        retry_in: Option<Duration>,
    ) -> SyncResult<()> {
        match retry_in {
            Some(delay) => {
                let next = Utc::now()
                    + ChronoDuration::from_std(delay)
                        .unwrap_or_else(|_| ChronoDuration::seconds(30));
                sqlx::query(
                    r"
                    UPDATE sync_queue
                    SET status = 'pending',
                        retry_count = retry_count + 1,
                        scheduled_at = $2,
                        locked_until = NULL,
                        last_error = $3
                    WHERE id = $1
                    ",
                )
                .bind(task_id)
                .bind(next)
                .bind(error)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    r"
                    UPDATE sync_queue
                    SET status = 'dead',
                        retry_count = retry_count + 1,
                        locked_until = NULL,
                        last_error = $2
                    WHERE id = $1
                    ",
                )
                .bind(task_id)
                .bind(error)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }

    /// Release tasks whose lease expired (crashed or killed worker).
    /// Returns the number released.
    #[instrument(skip(self))]
    pub async fn release_stale(&self) -> SyncResult<u64> {
        let result = sqlx::query(
            r"
            UPDATE sync_queue
            SET status = 'pending', locked_until = NULL
            WHERE status = 'in_progress' AND locked_until < NOW()
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    shop_id: Uuid,
    entity_id: Option<Uuid>,
    kind: String,
    priority: i16,
    unique_key: Option<String>,
    payload: Value,
    retry_count: i32,
    max_retries: i32,
    scheduled_at: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TaskRow {
    fn to_task(&self) -> QueuedTask {
        QueuedTask {
            id: self.id,
            shop_id: self.shop_id,
            entity_id: self.entity_id,
            kind: self.kind.parse().unwrap_or(TaskKind::PushEntity),
            priority: match self.priority {
                0 => TaskPriority::High,
                2 => TaskPriority::Low,
                _ => TaskPriority::Normal,
            },
            unique_key: self.unique_key.clone(),
            payload: self.payload.clone(),
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            scheduled_at: self.scheduled_at,
            locked_until: self.locked_until,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
        }
    }
}
