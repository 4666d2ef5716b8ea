//! Id mappings between local entities and their remote counterparts.
//!
//! A mapping row is the single source of truth for "does this entity
//! already exist remotely". Existence is always checked here, never
//! assumed from a cache: workers are independent processes and another
//! resolver may have created the counterpart since the last look.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::types::EntityType;

/// A persisted local ↔ remote id association, scoped to one shop and
/// entity type. Unique per (shop, type, local_id) and per
/// (shop, type, remote_id); upserted, never duplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    /// Row id.
    pub id: Uuid,
    /// Shop this mapping belongs to.
    pub shop_id: Uuid,
    /// Entity type discriminator.
    pub entity_type: EntityType,
    /// Local entity id.
    pub local_id: Uuid,
    /// Remote platform id.
    pub remote_id: i64,
    /// Remote display label at mapping time, for diagnostics.
    pub remote_label: Option<String>,
    /// Inactive mappings are ignored by existence checks.
    pub active: bool,
    /// When the mapping was first written.
    pub created_at: DateTime<Utc>,
    /// Last upsert.
    pub updated_at: DateTime<Utc>,
}

impl Mapping {
    /// Create a new active mapping.
    #[must_use]
    pub fn new(
        shop_id: Uuid,
        entity_type: EntityType,
        local_id: Uuid,
        remote_id: i64,
        remote_label: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            shop_id,
            entity_type,
            local_id,
            remote_id,
            remote_label,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Store for id mappings, consumed and produced by every sync component.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Create or refresh a mapping. Keyed on (shop, type, local_id); a
    /// concurrent duplicate create resolves to the same single row.
    async fn upsert(&self, mapping: &Mapping) -> SyncResult<()>;

    /// Look up the active mapping for a local entity.
    async fn get_by_local(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        local_id: Uuid,
    ) -> SyncResult<Option<Mapping>>;

    /// Look up the active mapping for a remote id.
    async fn get_by_remote(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        remote_id: i64,
    ) -> SyncResult<Option<Mapping>>;

    /// Of the given remote ids, return the active mappings that exist.
    async fn get_by_remote_ids(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        remote_ids: &[i64],
    ) -> SyncResult<Vec<Mapping>>;

    /// Deactivate the mapping for a local entity (remote counterpart gone).
    /// A no-op when no mapping exists.
    async fn deactivate(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        local_id: Uuid,
    ) -> SyncResult<()>;
}

/// Postgres-backed mapping store.
pub struct PgMappingStore {
    pool: PgPool,
}

impl PgMappingStore {
    /// Create a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_mapping(row: &MappingRow) -> Mapping {
        Mapping {
            id: row.id,
            shop_id: row.shop_id,
            entity_type: row
                .entity_type
                .parse()
                .unwrap_or(EntityType::Product),
            local_id: row.local_id,
            remote_id: row.remote_id,
            remote_label: row.remote_label.clone(),
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MappingRow {
    id: Uuid,
    shop_id: Uuid,
    entity_type: String,
    local_id: Uuid,
    remote_id: i64,
    remote_label: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl MappingStore for PgMappingStore {
    #[instrument(skip(self, mapping))]
    async fn upsert(&self, mapping: &Mapping) -> SyncResult<()> {
        sqlx::query(
            r"
            INSERT INTO sync_mappings (
                id, shop_id, entity_type, local_id, remote_id,
                remote_label, active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (shop_id, entity_type, local_id) DO UPDATE SET
                remote_id = EXCLUDED.remote_id,
                remote_label = EXCLUDED.remote_label,
                active = EXCLUDED.active,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(mapping.id)
        .bind(mapping.shop_id)
        .bind(mapping.entity_type.as_str())
        .bind(mapping.local_id)
        .bind(mapping.remote_id)
        .bind(&mapping.remote_label)
        .bind(mapping.active)
        .bind(mapping.created_at)
        .bind(mapping.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_by_local(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        local_id: Uuid,
    ) -> SyncResult<Option<Mapping>> {
        let row = sqlx::query_as::<_, MappingRow>(
            r"
            SELECT id, shop_id, entity_type, local_id, remote_id,
                   remote_label, active, created_at, updated_at
            FROM sync_mappings
            WHERE shop_id = $1 AND entity_type = $2 AND local_id = $3 AND active
            ",
        )
        .bind(shop_id)
        .bind(entity_type.as_str())
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_mapping(&r)))
    }

    #[instrument(skip(self))]
    async fn get_by_remote(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        remote_id: i64,
    ) -> SyncResult<Option<Mapping>> {
        let row = sqlx::query_as::<_, MappingRow>(
            r"
            SELECT id, shop_id, entity_type, local_id, remote_id,
                   remote_label, active, created_at, updated_at
            FROM sync_mappings
            WHERE shop_id = $1 AND entity_type = $2 AND remote_id = $3 AND active
            ",
        )
        .bind(shop_id)
        .bind(entity_type.as_str())
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_mapping(&r)))
    }

    #[instrument(skip(self, remote_ids))]
    async fn get_by_remote_ids(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        remote_ids: &[i64],
    ) -> SyncResult<Vec<Mapping>> {
        if remote_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, MappingRow>(
            r"
            SELECT id, shop_id, entity_type, local_id, remote_id,
                   remote_label, active, created_at, updated_at
            FROM sync_mappings
            WHERE shop_id = $1 AND entity_type = $2
              AND remote_id = ANY($3) AND active
            ",
        )
        .bind(shop_id)
        .bind(entity_type.as_str())
        .bind(remote_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_mapping).collect())
    }

    #[instrument(skip(self))]
    async fn deactivate(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        local_id: Uuid,
    ) -> SyncResult<()> {
        sqlx::query(
            r"
            UPDATE sync_mappings
            SET active = FALSE, updated_at = NOW()
            WHERE shop_id = $1 AND entity_type = $2 AND local_id = $3
            ",
        )
        .bind(shop_id)
        .bind(entity_type.as_str())
        .bind(local_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
