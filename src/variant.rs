//! Variant and attribute synchronization.
//!
//! A variant carries an operation tag deciding what happens remotely.
//! Before any combination call, every attribute dimension the variant
//! uses is resolved to a remote attribute value id, auto-creating the
//! remote group and value (and their mappings) when they do not exist
//! yet. An override against a combination that vanished remotely falls
//! back to create, and deleting an already-absent combination succeeds.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::mapping::{Mapping, MappingStore};
use crate::remote::{CombinationPayload, RemoteCatalogClient, RemoteError};
use crate::repository::{EntityRepository, LocalVariant};
use crate::status::{SyncTaskRecord, SyncTaskRepository};
use crate::types::{EntityType, VariantOp};

/// Result of a single variant sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantOutcome {
    /// Combination created remotely.
    Created { combination_id: i64 },
    /// Existing combination updated in place.
    Updated { combination_id: i64 },
    /// Combination removed remotely (or already absent).
    Deleted,
    /// Inherits the parent's configuration, nothing to do remotely.
    Inherited,
}

/// Pushes variant combinations to a shop.
pub struct VariantSynchronizer {
    client: Arc<dyn RemoteCatalogClient>,
    repository: Arc<dyn EntityRepository>,
    mappings: Arc<dyn MappingStore>,
    tasks: Arc<dyn SyncTaskRepository>,
}

impl VariantSynchronizer {
    #[must_use]
    pub fn new(
        client: Arc<dyn RemoteCatalogClient>,
        repository: Arc<dyn EntityRepository>,
        mappings: Arc<dyn MappingStore>,
        tasks: Arc<dyn SyncTaskRepository>,
    ) -> Self {
        Self {
            client,
            repository,
            mappings,
            tasks,
        }
    }

    /// Synchronize one variant according to its operation tag.
    #[instrument(skip(self), fields(%shop_id, %variant_id))]
    pub async fn sync_variant(&self, shop_id: Uuid, variant_id: Uuid) -> SyncResult<VariantOutcome> {
        let variant = self
            .repository
            .get_variant(variant_id)
            .await?
            .ok_or(SyncError::EntityNotFound {
                entity: "variant",
                id: variant_id,
            })?;

        let outcome = match variant.op {
            VariantOp::Inherit => {
                info!("Variant inherits parent configuration, skipping");
                VariantOutcome::Inherited
            }
            VariantOp::Delete => self.delete(shop_id, &variant).await?,
            VariantOp::Add => self.create(shop_id, &variant).await?,
            VariantOp::Override => self.update_or_create(shop_id, &variant).await?,
        };

        self.record_outcome(shop_id, variant_id, &outcome).await?;
        Ok(outcome)
    }

    /// Resolve every (attribute type, attribute value) pair the variant
    /// uses to a remote attribute value id, auto-creating group and
    /// value remotely when no mapping exists.
    async fn resolve_dimensions(
        &self,
        shop_id: Uuid,
        variant: &LocalVariant,
    ) -> SyncResult<Vec<i64>> {
        let mut remote_value_ids = Vec::with_capacity(variant.dimension_values.len());
        for &(type_id, value_id) in &variant.dimension_values {
            let remote_value_id = match self
                .mappings
                .get_by_local(shop_id, EntityType::AttributeValue, value_id)
                .await?
            {
                Some(mapping) => mapping.remote_id,
                None => self.create_attribute_value(shop_id, type_id, value_id).await?,
            };
            remote_value_ids.push(remote_value_id);
        }
        Ok(remote_value_ids)
    }

    async fn create_attribute_value(
        &self,
        shop_id: Uuid,
        type_id: Uuid,
        value_id: Uuid,
    ) -> SyncResult<i64> {
        let remote_group_id = match self
            .mappings
            .get_by_local(shop_id, EntityType::AttributeType, type_id)
            .await?
        {
            Some(mapping) => mapping.remote_id,
            None => {
                let attribute_type = self
                    .repository
                    .get_attribute_type(type_id)
                    .await?
                    .ok_or(SyncError::EntityNotFound {
                        entity: "attribute_type",
                        id: type_id,
                    })?;
                let remote_id = self
                    .client
                    .create_attribute_group(&attribute_type.name)
                    .await?;
                // The group mapping is kept even if the value create
                // below fails; the next run reuses it.
                let mapping = Mapping::new(
                    shop_id,
                    EntityType::AttributeType,
                    type_id,
                    remote_id,
                    Some(attribute_type.name.clone()),
                );
                self.mappings.upsert(&mapping).await?;
                info!(remote_id, name = %attribute_type.name, "Attribute group created remotely");
                remote_id
            }
        };

        let value = self
            .repository
            .get_attribute_value(value_id)
            .await?
            .ok_or(SyncError::EntityNotFound {
                entity: "attribute_value",
                id: value_id,
            })?;
        let remote_value_id = self
            .client
            .create_attribute_value(remote_group_id, &value.label)
            .await?;
        let mapping = Mapping::new(
            shop_id,
            EntityType::AttributeValue,
            value_id,
            remote_value_id,
            Some(value.label.clone()),
        );
        self.mappings.upsert(&mapping).await?;
        info!(remote_value_id, label = %value.label, "Attribute value created remotely");

        Ok(remote_value_id)
    }

    async fn create(&self, shop_id: Uuid, variant: &LocalVariant) -> SyncResult<VariantOutcome> {
        let product_mapping = self
            .mappings
            .get_by_local(shop_id, EntityType::Product, variant.product_id)
            .await?
            .ok_or(SyncError::MappingMissing {
                shop_id,
                entity_type: "product",
                local_id: variant.product_id,
            })?;

        let attribute_value_ids = self.resolve_dimensions(shop_id, variant).await?;
        let payload = CombinationPayload {
            product_id: product_mapping.remote_id,
            attribute_value_ids,
            fields: variant.fields.clone(),
        };
        let combination_id = self.client.create_combination(&payload).await?;

        if !variant.image_ids.is_empty() {
            self.client
                .set_combination_images(combination_id, &variant.image_ids)
                .await?;
        }

        let mapping = Mapping::new(shop_id, EntityType::Variant, variant.id, combination_id, None);
        self.mappings.upsert(&mapping).await?;
        info!(combination_id, "Combination created remotely");

        Ok(VariantOutcome::Created { combination_id })
    }

    async fn update_or_create(
        &self,
        shop_id: Uuid,
        variant: &LocalVariant,
    ) -> SyncResult<VariantOutcome> {
        let Some(mapping) = self
            .mappings
            .get_by_local(shop_id, EntityType::Variant, variant.id)
            .await?
        else {
            // Never pushed before; an override degrades to a create.
            return self.create(shop_id, variant).await;
        };

        let attribute_value_ids = self.resolve_dimensions(shop_id, variant).await?;
        match self
            .client
            .set_combination_attributes(mapping.remote_id, &attribute_value_ids)
            .await
        {
            Ok(()) => {
                if !variant.image_ids.is_empty() {
                    self.client
                        .set_combination_images(mapping.remote_id, &variant.image_ids)
                        .await?;
                }
                info!(combination_id = mapping.remote_id, "Combination updated remotely");
                Ok(VariantOutcome::Updated {
                    combination_id: mapping.remote_id,
                })
            }
            Err(RemoteError::NotFound { .. }) => {
                warn!(
                    combination_id = mapping.remote_id,
                    "Mapped combination missing remotely, recreating"
                );
                self.create(shop_id, variant).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, shop_id: Uuid, variant: &LocalVariant) -> SyncResult<VariantOutcome> {
        let Some(mapping) = self
            .mappings
            .get_by_local(shop_id, EntityType::Variant, variant.id)
            .await?
        else {
            return Ok(VariantOutcome::Deleted);
        };

        match self.client.delete_combination(mapping.remote_id).await {
            Ok(()) | Err(RemoteError::NotFound { .. }) => {
                self.mappings
                    .deactivate(shop_id, EntityType::Variant, variant.id)
                    .await?;
                info!(combination_id = mapping.remote_id, "Combination removed remotely");
                Ok(VariantOutcome::Deleted)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn record_outcome(
        &self,
        shop_id: Uuid,
        variant_id: Uuid,
        outcome: &VariantOutcome,
    ) -> SyncResult<()> {
        let mut record = match self.tasks.get(variant_id, shop_id).await? {
            Some(record) => record,
            None => SyncTaskRecord::new(variant_id, shop_id, EntityType::Variant),
        };
        match outcome {
            VariantOutcome::Created { combination_id }
            | VariantOutcome::Updated { combination_id } => {
                record.mark_synced(*combination_id, None);
            }
            VariantOutcome::Deleted => record.mark_not_synced(),
            VariantOutcome::Inherited => record.mark_inherited(),
        }
        self.tasks.upsert(&record).await
    }
}
