//! Per-entity-per-shop synchronization state.
//!
//! Worker processes share no memory, so retry counters and statuses live
//! in a durable record keyed by (entity, shop), created lazily on the
//! first sync attempt and updated on every transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::types::{ChangeKind, EntityType, SyncStatus};

/// Durable sync state for one entity on one shop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTaskRecord {
    /// Local entity id.
    pub entity_id: Uuid,
    /// Target shop.
    pub shop_id: Uuid,
    /// Entity type discriminator.
    pub entity_type: EntityType,
    /// Current status.
    pub status: SyncStatus,
    /// Remote id recorded on success.
    pub remote_id: Option<i64>,
    /// Payload checksum of the last successful push; an unchanged
    /// checksum makes the next push a no-op.
    pub checksum: Option<String>,
    /// Last error, retained after retry exhaustion for manual review.
    pub error_message: Option<String>,
    /// Attempts within the current operation lifecycle. Monotonic; reset
    /// only by an explicit operation-kind change.
    pub retry_count: i32,
    /// Operation kind of the current lifecycle.
    pub operation: ChangeKind,
    /// Last push or pull attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Last completed pull, stamped under every conflict policy.
    pub last_pulled_at: Option<DateTime<Utc>>,
    /// Record creation.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl SyncTaskRecord {
    /// Create a fresh pending record.
    #[must_use]
    pub fn new(entity_id: Uuid, shop_id: Uuid, entity_type: EntityType) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            shop_id,
            entity_type,
            status: SyncStatus::Pending,
            remote_id: None,
            checksum: None,
            error_message: None,
            retry_count: 0,
            operation: ChangeKind::Create,
            last_attempt_at: None,
            last_pulled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the start of an attempt.
    pub fn begin_attempt(&mut self) {
        self.status = SyncStatus::InProgress;
        self.last_attempt_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Record a successful push.
    pub fn mark_synced(&mut self, remote_id: i64, checksum: Option<String>) {
        self.status = SyncStatus::Synced;
        self.remote_id = Some(remote_id);
        self.checksum = checksum;
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    /// Record a failed attempt. The counter only ever grows within one
    /// operation lifecycle.
    pub fn record_failure(&mut self, error: &str) {
        self.retry_count += 1;
        self.error_message = Some(error.to_string());
        self.updated_at = Utc::now();
    }

    /// Mark the record failed after retry exhaustion. Only an explicit
    /// re-trigger moves it out of this state.
    pub fn mark_failed(&mut self) {
        self.status = SyncStatus::Failed;
        self.updated_at = Utc::now();
    }

    /// Record a variant that follows its parent product. Nothing was
    /// pushed, so no remote id is recorded.
    pub fn mark_inherited(&mut self) {
        self.status = SyncStatus::Synced;
        self.remote_id = None;
        self.error_message = None;
        self.updated_at = Utc::now();
    }

    /// Remote counterpart gone; unlinked gracefully.
    pub fn mark_not_synced(&mut self) {
        self.status = SyncStatus::NotSynced;
        self.remote_id = None;
        self.updated_at = Utc::now();
    }

    /// Divergence held for manual resolution.
    pub fn mark_conflict(&mut self) {
        self.status = SyncStatus::Conflict;
        self.updated_at = Utc::now();
    }

    /// Stamp a completed pull.
    pub fn record_pull(&mut self) {
        self.last_pulled_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Switch operation kind (create → update after first materialization).
    /// This is the single path that resets the retry counter.
    pub fn switch_operation(&mut self, operation: ChangeKind) {
        if self.operation != operation {
            self.operation = operation;
            self.retry_count = 0;
        }
        self.updated_at = Utc::now();
    }

    /// Explicit manual re-trigger after failure.
    pub fn reset_for_retry(&mut self) {
        self.status = SyncStatus::Pending;
        self.error_message = None;
        self.updated_at = Utc::now();
    }
}

/// Store for sync task records.
#[async_trait]
pub trait SyncTaskRepository: Send + Sync {
    /// Fetch the record for (entity, shop), if any.
    async fn get(&self, entity_id: Uuid, shop_id: Uuid) -> SyncResult<Option<SyncTaskRecord>>;

    /// Create or update the record.
    async fn upsert(&self, record: &SyncTaskRecord) -> SyncResult<()>;
}

/// Postgres-backed sync task record store.
pub struct PgSyncTaskRepository {
    pool: PgPool,
}

impl PgSyncTaskRepository {
    /// Create a new repository.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &SyncTaskRow) -> SyncTaskRecord {
        SyncTaskRecord {
            entity_id: row.entity_id,
            shop_id: row.shop_id,
            entity_type: row.entity_type.parse().unwrap_or(EntityType::Product),
            status: row.status.parse().unwrap_or(SyncStatus::Pending),
            remote_id: row.remote_id,
            checksum: row.checksum.clone(),
            error_message: row.error_message.clone(),
            retry_count: row.retry_count,
            operation: row.operation.parse().unwrap_or(ChangeKind::Create),
            last_attempt_at: row.last_attempt_at,
            last_pulled_at: row.last_pulled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SyncTaskRow {
    entity_id: Uuid,
    shop_id: Uuid,
    entity_type: String,
    status: String,
    remote_id: Option<i64>,
    checksum: Option<String>,
    error_message: Option<String>,
    retry_count: i32,
    operation: String,
    last_attempt_at: Option<DateTime<Utc>>,
    last_pulled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl SyncTaskRepository for PgSyncTaskRepository {
    #[instrument(skip(self))]
    async fn get(&self, entity_id: Uuid, shop_id: Uuid) -> SyncResult<Option<SyncTaskRecord>> {
        let row = sqlx::query_as::<_, SyncTaskRow>(
            r"
            SELECT entity_id, shop_id, entity_type, status, remote_id,
                   checksum, error_message, retry_count, operation,
                   last_attempt_at, last_pulled_at, created_at, updated_at
            FROM sync_task_records
            WHERE entity_id = $1 AND shop_id = $2
            ",
        )
        .bind(entity_id)
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_record(&r)))
    }

    #[instrument(skip(self, record))]
    async fn upsert(&self, record: &SyncTaskRecord) -> SyncResult<()> {
        sqlx::query(
            r"
            INSERT INTO sync_task_records (
                entity_id, shop_id, entity_type, status, remote_id,
                checksum, error_message, retry_count, operation,
                last_attempt_at, last_pulled_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (entity_id, shop_id) DO UPDATE SET
                status = EXCLUDED.status,
                remote_id = EXCLUDED.remote_id,
                checksum = EXCLUDED.checksum,
                error_message = EXCLUDED.error_message,
                retry_count = EXCLUDED.retry_count,
                operation = EXCLUDED.operation,
                last_attempt_at = EXCLUDED.last_attempt_at,
                last_pulled_at = EXCLUDED.last_pulled_at,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(record.entity_id)
        .bind(record.shop_id)
        .bind(record.entity_type.as_str())
        .bind(record.status.as_str())
        .bind(record.remote_id)
        .bind(&record.checksum)
        .bind(&record.error_message)
        .bind(record.retry_count)
        .bind(record.operation.as_str())
        .bind(record.last_attempt_at)
        .bind(record.last_pulled_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
