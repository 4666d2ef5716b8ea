//! Local entity repository interface.
//!
//! The canonical catalog records are owned elsewhere; sync components
//! reference entities by id and go through this trait for every read or
//! write of local state. Workers are independent processes, so nothing in
//! the engine caches entities between task executions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::types::VariantOp;

/// A local catalog category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalCategory {
    /// Local id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Local parent, `None` for top-level categories.
    pub parent_id: Option<Uuid>,
    /// Whether the category is active locally.
    pub active: bool,
}

/// A local catalog product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProduct {
    /// Local id.
    pub id: Uuid,
    /// Field bag (name, descriptions, identifiers, dimensions...).
    pub fields: Value,
    /// Local category associations.
    pub category_ids: Vec<Uuid>,
    /// Last local modification.
    pub updated_at: DateTime<Utc>,
}

/// A variant dimension, e.g. "Size".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAttributeType {
    /// Local id.
    pub id: Uuid,
    /// Dimension name.
    pub name: String,
}

/// A concrete dimension value, e.g. "L".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAttributeValue {
    /// Local id.
    pub id: Uuid,
    /// Owning dimension.
    pub attribute_type_id: Uuid,
    /// Display label.
    pub label: String,
}

/// A product variant: one concrete set of dimension-value choices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalVariant {
    /// Local id.
    pub id: Uuid,
    /// Owning product.
    pub product_id: Uuid,
    /// Operation tag controlling the remote action.
    pub op: VariantOp,
    /// (dimension, value) pairs, by local id.
    pub dimension_values: Vec<(Uuid, Uuid)>,
    /// Extra combination fields (reference, price impact, stock).
    pub fields: Value,
    /// Image ids to associate with the remote combination.
    pub image_ids: Vec<i64>,
}

/// Local persistence for catalog entities, consumed by the sync engine.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Fetch a category.
    async fn get_category(&self, id: Uuid) -> SyncResult<Option<LocalCategory>>;

    /// Create a category, returning its id.
    async fn create_category(&self, category: &LocalCategory) -> SyncResult<Uuid>;

    /// Delete a category. Used as compensation when the paired remote
    /// creation fails; must be idempotent.
    async fn delete_category(&self, id: Uuid) -> SyncResult<()>;

    /// Of the given ids, return those that still exist. Drives orphan
    /// detection: a mapping whose local target is gone counts as missing.
    async fn existing_category_ids(&self, ids: &[Uuid]) -> SyncResult<Vec<Uuid>>;

    /// Fetch a product.
    async fn get_product(&self, id: Uuid) -> SyncResult<Option<LocalProduct>>;

    /// Overwrite a product's field bag with remote values (pull apply).
    async fn apply_product_fields(&self, id: Uuid, fields: &Value) -> SyncResult<()>;

    /// Fetch a variant dimension.
    async fn get_attribute_type(&self, id: Uuid) -> SyncResult<Option<LocalAttributeType>>;

    /// Fetch a dimension value.
    async fn get_attribute_value(&self, id: Uuid) -> SyncResult<Option<LocalAttributeValue>>;

    /// Fetch a variant.
    async fn get_variant(&self, id: Uuid) -> SyncResult<Option<LocalVariant>>;
}
