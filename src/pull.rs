//! Remote-to-local pull and conflict resolution.
//!
//! Pulls a mapped product back from a shop and reconciles it with the
//! local copy under a per-call conflict policy. A remote counterpart
//! that disappeared unlinks gracefully instead of erroring, and price
//! and stock sub-pulls are tolerant of their own failures so a missing
//! price feed never blocks a field pull.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::mapping::MappingStore;
use crate::push::payload_checksum;
use crate::remote::{RemoteCatalogClient, RemoteError};
use crate::repository::EntityRepository;
use crate::status::{SyncTaskRecord, SyncTaskRepository};
use crate::types::{ConflictPolicy, EntityType};

/// One field whose local and remote values diverge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    pub local: Value,
    pub remote: Value,
}

/// Compare two field objects per field. Fields present on only one side
/// count as divergent, with the missing side recorded as null.
#[must_use]
pub fn diff_fields(local: &Value, remote: &Value) -> Vec<FieldDiff> {
    let empty = serde_json::Map::new();
    let local_map = local.as_object().unwrap_or(&empty);
    let remote_map = remote.as_object().unwrap_or(&empty);

    let mut fields: Vec<&String> = local_map.keys().chain(remote_map.keys()).collect();
    fields.sort();
    fields.dedup();

    fields
        .into_iter()
        .filter_map(|field| {
            let local_value = local_map.get(field).cloned().unwrap_or(Value::Null);
            let remote_value = remote_map.get(field).cloned().unwrap_or(Value::Null);
            if local_value == remote_value {
                None
            } else {
                Some(FieldDiff {
                    field: field.clone(),
                    local: local_value,
                    remote: remote_value,
                })
            }
        })
        .collect()
}

/// A divergence held for manual resolution, one row per field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictLog {
    pub id: Uuid,
    pub shop_id: Uuid,
    pub entity_id: Uuid,
    pub entity_type: EntityType,
    pub field: String,
    pub local_value: Value,
    pub remote_value: Value,
    pub created_at: DateTime<Utc>,
}

impl ConflictLog {
    #[must_use]
    pub fn new(shop_id: Uuid, entity_id: Uuid, entity_type: EntityType, diff: &FieldDiff) -> Self {
        Self {
            id: Uuid::new_v4(),
            shop_id,
            entity_id,
            entity_type,
            field: diff.field.clone(),
            local_value: diff.local.clone(),
            remote_value: diff.remote.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Storage for conflict logs.
#[async_trait]
pub trait ConflictLogStore: Send + Sync {
    async fn record(&self, log: &ConflictLog) -> SyncResult<()>;

    /// Drop all open conflicts for an entity, called once a pull
    /// resolves them.
    async fn clear(&self, shop_id: Uuid, entity_id: Uuid) -> SyncResult<u64>;
}

/// Postgres implementation over the `conflict_logs` table.
pub struct PgConflictLogStore {
    pool: PgPool,
}

impl PgConflictLogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConflictLogStore for PgConflictLogStore {
    async fn record(&self, log: &ConflictLog) -> SyncResult<()> {
        sqlx::query(
            r"
            INSERT INTO conflict_logs (
                id, shop_id, entity_id, entity_type, field,
                local_value, remote_value, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(log.id)
        .bind(log.shop_id)
        .bind(log.entity_id)
        .bind(log.entity_type.as_str())
        .bind(&log.field)
        .bind(&log.local_value)
        .bind(&log.remote_value)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, shop_id: Uuid, entity_id: Uuid) -> SyncResult<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM conflict_logs
            WHERE shop_id = $1 AND entity_id = $2
            ",
        )
        .bind(shop_id)
        .bind(entity_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Result of a single pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Remote fields applied locally.
    Applied { fields_changed: usize },
    /// Divergences logged for manual resolution, local copy untouched.
    ConflictsLogged { conflicts: usize },
    /// Local wins; remote state noted but not applied.
    SkippedLocalWins,
    /// The remote counterpart no longer exists; mapping deactivated.
    RemoteGone,
}

/// Pulls mapped products from a shop.
pub struct PullSynchronizer {
    client: Arc<dyn RemoteCatalogClient>,
    repository: Arc<dyn EntityRepository>,
    mappings: Arc<dyn MappingStore>,
    tasks: Arc<dyn SyncTaskRepository>,
    conflicts: Arc<dyn ConflictLogStore>,
}

impl PullSynchronizer {
    #[must_use]
    pub fn new(
        client: Arc<dyn RemoteCatalogClient>,
        repository: Arc<dyn EntityRepository>,
        mappings: Arc<dyn MappingStore>,
        tasks: Arc<dyn SyncTaskRepository>,
        conflicts: Arc<dyn ConflictLogStore>,
    ) -> Self {
        Self {
            client,
            repository,
            mappings,
            tasks,
            conflicts,
        }
    }

    /// Pull one product under the given conflict policy.
    #[instrument(skip(self), fields(%shop_id, %product_id, policy = %policy))]
    pub async fn pull_product(
        &self,
        shop_id: Uuid,
        product_id: Uuid,
        policy: ConflictPolicy,
    ) -> SyncResult<PullOutcome> {
        let mapping = self
            .mappings
            .get_by_local(shop_id, EntityType::Product, product_id)
            .await?
            .ok_or(SyncError::MappingMissing {
                shop_id,
                entity_type: "product",
                local_id: product_id,
            })?;

        let mut record = match self.tasks.get(product_id, shop_id).await? {
            Some(record) => record,
            None => SyncTaskRecord::new(product_id, shop_id, EntityType::Product),
        };

        let remote = match self.client.get_product(mapping.remote_id).await {
            Ok(remote) => remote,
            Err(RemoteError::NotFound { .. }) => {
                warn!(remote_id = mapping.remote_id, "Remote product gone, unlinking");
                self.mappings
                    .deactivate(shop_id, EntityType::Product, product_id)
                    .await?;
                record.mark_not_synced();
                self.tasks.upsert(&record).await?;
                return Ok(PullOutcome::RemoteGone);
            }
            Err(err) => return Err(err.into()),
        };

        let local = self
            .repository
            .get_product(product_id)
            .await?
            .ok_or(SyncError::EntityNotFound {
                entity: "product",
                id: product_id,
            })?;

        let diffs = diff_fields(&local.fields, &remote.fields);

        let outcome = if diffs.is_empty() || policy == ConflictPolicy::RemoteWins {
            self.repository
                .apply_product_fields(product_id, &remote.fields)
                .await?;
            let cleared = self.conflicts.clear(shop_id, product_id).await?;
            if cleared > 0 {
                info!(cleared, "Open conflicts resolved by pull");
            }
            record.mark_synced(mapping.remote_id, Some(payload_checksum(&remote.fields)));
            record.record_pull();
            PullOutcome::Applied {
                fields_changed: diffs.len(),
            }
        } else if policy == ConflictPolicy::Manual {
            // Replace any rows from an earlier pull so each differing
            // field is logged exactly once.
            self.conflicts.clear(shop_id, product_id).await?;
            for diff in &diffs {
                let log = ConflictLog::new(shop_id, product_id, EntityType::Product, diff);
                self.conflicts.record(&log).await?;
            }
            record.mark_conflict();
            record.record_pull();
            info!(conflicts = diffs.len(), "Divergence held for manual resolution");
            PullOutcome::ConflictsLogged {
                conflicts: diffs.len(),
            }
        } else {
            record.record_pull();
            PullOutcome::SkippedLocalWins
        };

        self.tasks.upsert(&record).await?;

        // Price and stock feeds fail independently of the field pull.
        if matches!(outcome, PullOutcome::Applied { .. }) {
            self.pull_sub_resource(product_id, mapping.remote_id, "prices")
                .await;
            self.pull_sub_resource(product_id, mapping.remote_id, "stock")
                .await;
        }

        Ok(outcome)
    }

    async fn pull_sub_resource(&self, product_id: Uuid, remote_id: i64, resource: &str) {
        let fetched = match resource {
            "prices" => self.client.get_product_prices(remote_id).await,
            _ => self.client.get_product_stock(remote_id).await,
        };
        match fetched {
            Ok(value) => {
                let patch = serde_json::json!({ resource: value });
                if let Err(err) = self.repository.apply_product_fields(product_id, &patch).await {
                    warn!(resource, error = %err, "Failed to apply sub-resource locally");
                }
            }
            Err(RemoteError::NotFound { .. }) => {}
            Err(err) => {
                warn!(resource, remote_id, error = %err, "Sub-resource pull failed");
            }
        }
    }
}
