//! Local-to-remote push.
//!
//! Pushes one local product to one shop, choosing create or update from
//! the mapping table rather than from remote state. An unchanged
//! payload short-circuits before any remote call, and an update against
//! a remote id that no longer exists falls back to create instead of
//! failing the task.

use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::mapping::{Mapping, MappingStore};
use crate::remote::{ProductPayload, RemoteCatalogClient, RemoteError};
use crate::repository::{EntityRepository, LocalProduct};
use crate::status::{SyncTaskRecord, SyncTaskRepository};
use crate::types::{ChangeKind, EntityType, SyncStatus};

/// Result of a single push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Entity was created remotely.
    Created { remote_id: i64 },
    /// Entity was updated remotely.
    Updated { remote_id: i64 },
    /// Checksum matched the last successful push, no remote call made.
    Unchanged,
}

/// Hex-encoded SHA-256 over the payload with object keys sorted, so the
/// same logical value always hashes the same.
#[must_use]
pub fn payload_checksum(payload: &Value) -> String {
    fn sort_keys(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: serde_json::Map<String, Value> = {
                    let mut entries: Vec<(String, Value)> =
                        map.iter().map(|(k, v)| (k.clone(), sort_keys(v))).collect();
                    entries.sort_by(|a, b| a.0.cmp(&b.0));
                    entries.into_iter().collect()
                };
                Value::Object(sorted)
            }
            Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
            other => other.clone(),
        }
    }

    let canonical = sort_keys(payload).to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Pushes local products to a shop.
pub struct PushSynchronizer {
    client: Arc<dyn RemoteCatalogClient>,
    repository: Arc<dyn EntityRepository>,
    mappings: Arc<dyn MappingStore>,
    tasks: Arc<dyn SyncTaskRepository>,
    config: SyncConfig,
}

impl PushSynchronizer {
    #[must_use]
    pub fn new(
        client: Arc<dyn RemoteCatalogClient>,
        repository: Arc<dyn EntityRepository>,
        mappings: Arc<dyn MappingStore>,
        tasks: Arc<dyn SyncTaskRepository>,
        config: SyncConfig,
    ) -> Self {
        Self {
            client,
            repository,
            mappings,
            tasks,
            config,
        }
    }

    /// Push one product. On a retryable failure the task record keeps
    /// its attempt count and the error is returned for the queue to
    /// reschedule; once the retry budget is spent the record goes to
    /// `Failed` and `RetriesExhausted` is returned instead.
    #[instrument(skip(self), fields(%shop_id, %product_id))]
    pub async fn push_product(&self, shop_id: Uuid, product_id: Uuid) -> SyncResult<PushOutcome> {
        let product = self
            .repository
            .get_product(product_id)
            .await?
            .ok_or(SyncError::EntityNotFound {
                entity: "product",
                id: product_id,
            })?;

        let mut record = match self.tasks.get(product_id, shop_id).await? {
            Some(record) => record,
            None => SyncTaskRecord::new(product_id, shop_id, EntityType::Product),
        };

        // Another worker still holds this entity within its lease.
        if record.status == SyncStatus::InProgress {
            let lease = chrono::Duration::from_std(self.config.sync_lease)
                .unwrap_or_else(|_| chrono::Duration::hours(1));
            if let Some(last) = record.last_attempt_at {
                if chrono::Utc::now() < last + lease {
                    return Err(SyncError::AlreadyInFlight {
                        entity_id: product_id,
                        shop_id,
                    });
                }
            }
        }

        let checksum = payload_checksum(&product.fields);
        if record.status == SyncStatus::Synced && record.checksum.as_deref() == Some(&checksum) {
            info!("Payload unchanged since last push, skipping");
            return Ok(PushOutcome::Unchanged);
        }

        record.begin_attempt();
        self.tasks.upsert(&record).await?;

        let payload = self.build_payload(shop_id, &product).await?;
        let mapping = self
            .mappings
            .get_by_local(shop_id, EntityType::Product, product_id)
            .await?;

        let result = match &mapping {
            Some(mapping) => {
                record.switch_operation(ChangeKind::Update);
                self.update_or_recreate(shop_id, product_id, mapping.remote_id, &payload)
                    .await
            }
            None => {
                record.switch_operation(ChangeKind::Create);
                self.create(shop_id, product_id, &payload).await
            }
        };

        match result {
            Ok(outcome) => {
                let remote_id = match outcome {
                    PushOutcome::Created { remote_id } | PushOutcome::Updated { remote_id } => {
                        remote_id
                    }
                    PushOutcome::Unchanged => unreachable!("push never returns Unchanged here"),
                };
                record.mark_synced(remote_id, Some(checksum));
                self.tasks.upsert(&record).await?;
                Ok(outcome)
            }
            Err(err) => {
                record.record_failure(&err.to_string());
                if err.is_retryable() && record.retry_count < self.config.max_retries {
                    record.status = SyncStatus::Pending;
                    self.tasks.upsert(&record).await?;
                    Err(err)
                } else {
                    record.mark_failed();
                    let attempts = record.retry_count;
                    let last_error = record.error_message.clone().unwrap_or_default();
                    self.tasks.upsert(&record).await?;
                    if err.is_retryable() {
                        Err(SyncError::RetriesExhausted {
                            entity_id: product_id,
                            shop_id,
                            attempts,
                            last_error,
                        })
                    } else {
                        Err(err)
                    }
                }
            }
        }
    }

    async fn create(
        &self,
        shop_id: Uuid,
        product_id: Uuid,
        payload: &ProductPayload,
    ) -> SyncResult<PushOutcome> {
        let remote_id = self.client.create_product(payload).await?;
        let mapping = Mapping::new(shop_id, EntityType::Product, product_id, remote_id, None);
        self.mappings.upsert(&mapping).await?;
        info!(remote_id, "Product created remotely");
        Ok(PushOutcome::Created { remote_id })
    }

    async fn update_or_recreate(
        &self,
        shop_id: Uuid,
        product_id: Uuid,
        remote_id: i64,
        payload: &ProductPayload,
    ) -> SyncResult<PushOutcome> {
        match self.client.update_product(remote_id, payload).await {
            Ok(()) => {
                info!(remote_id, "Product updated remotely");
                Ok(PushOutcome::Updated { remote_id })
            }
            Err(RemoteError::NotFound { .. }) => {
                // The mapped product vanished remotely; the mapping is
                // stale, recreate instead.
                warn!(remote_id, "Mapped product missing remotely, recreating");
                self.create(shop_id, product_id, payload).await
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Translate local category references into remote ids. Categories
    /// without a mapping are dropped from the payload rather than
    /// failing the push.
    async fn build_payload(
        &self,
        shop_id: Uuid,
        product: &LocalProduct,
    ) -> SyncResult<ProductPayload> {
        let mut category_ids = Vec::with_capacity(product.category_ids.len());
        for &local_id in &product.category_ids {
            match self
                .mappings
                .get_by_local(shop_id, EntityType::Category, local_id)
                .await?
            {
                Some(mapping) => category_ids.push(mapping.remote_id),
                None => {
                    warn!(%local_id, "Category has no mapping, omitting from payload");
                }
            }
        }
        Ok(ProductPayload {
            fields: product.fields.clone(),
            category_ids,
        })
    }
}
