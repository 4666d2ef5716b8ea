//! Remote catalog client interface.
//!
//! The engine never speaks the platform wire protocol itself; it consumes
//! this trait. Implementations wrap the concrete shop API and classify
//! failures into the three classes the orchestration logic reacts to:
//! transient (retried), not-found (graceful unlink), permanent (surfaced).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Remote API errors, pre-classified by the client implementation.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Timeout, 5xx, rate limit. Retried with backoff up to budget.
    #[error("transient remote failure: {message}")]
    Transient { message: String },

    /// The referenced remote resource does not exist. Not a failure:
    /// drives deterministic unlink/mark-absent behavior.
    #[error("remote {resource} not found: {id}")]
    NotFound { resource: &'static str, id: i64 },

    /// Validation, auth, or other non-recoverable rejection. Never retried.
    #[error("permanent remote failure: {message}")]
    Permanent { message: String },
}

impl RemoteError {
    /// Create a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(resource: &'static str, id: i64) -> Self {
        Self::NotFound { resource, id }
    }

    /// Create a permanent error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    /// Check whether the failure is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient { .. })
    }

    /// Check for the distinguished not-found class.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }
}

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Lightweight product record returned by a filtered product listing.
/// Carries only what category dependency resolution needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProductRef {
    /// Remote product id.
    pub id: i64,
    /// Default category id, if the platform sets one.
    pub default_category_id: Option<i64>,
    /// Associated category ids.
    pub associated_category_ids: Vec<i64>,
}

impl RemoteProductRef {
    /// All category ids this product references, default first.
    #[must_use]
    pub fn referenced_category_ids(&self) -> Vec<i64> {
        let mut ids = Vec::with_capacity(1 + self.associated_category_ids.len());
        if let Some(default) = self.default_category_id {
            ids.push(default);
        }
        ids.extend(&self.associated_category_ids);
        ids
    }
}

/// Full remote category detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCategory {
    /// Remote category id.
    pub id: i64,
    /// Parent category id. Platform root categories have a parent at or
    /// below [`RemoteCategory::ROOT_PARENT_MAX`].
    pub parent_id: i64,
    /// Depth in the remote tree (root = 0).
    pub depth: i32,
    /// Display name.
    pub name: String,
    /// Whether the category is active remotely.
    pub active: bool,
}

impl RemoteCategory {
    /// Highest remote id still considered a platform root parent.
    pub const ROOT_PARENT_MAX: i64 = 2;

    /// Check if this category sits directly under the platform root.
    #[must_use]
    pub fn is_root_level(&self) -> bool {
        self.parent_id <= Self::ROOT_PARENT_MAX
    }
}

/// Full remote product state, returned by a single-product fetch and
/// consumed by the pull reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProduct {
    /// Remote product id.
    pub id: i64,
    /// Field bag in the local field namespace; the client implementation
    /// is responsible for normalizing platform field names.
    pub fields: Value,
}

/// A remote combination (one concrete variant of a product).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCombination {
    /// Remote combination id.
    pub id: i64,
    /// Owning remote product id.
    pub product_id: i64,
    /// Remote attribute-value ids making up the combination.
    pub attribute_value_ids: Vec<i64>,
}

/// Payload for creating or updating a remote category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryPayload {
    /// Display name.
    pub name: String,
    /// Remote parent category id.
    pub parent_id: i64,
    /// Whether the category should be active.
    pub active: bool,
}

/// Payload for creating or updating a remote product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPayload {
    /// Field bag to write.
    pub fields: Value,
    /// Remote category ids to associate.
    pub category_ids: Vec<i64>,
}

/// Payload for creating a remote combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinationPayload {
    /// Owning remote product id.
    pub product_id: i64,
    /// Remote attribute-value ids.
    pub attribute_value_ids: Vec<i64>,
    /// Additional fields (reference, price impact, stock).
    pub fields: Value,
}

/// Filter for the lightweight product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Restrict to these remote product ids.
    pub ids: Vec<i64>,
}

/// Client for one external shop platform instance.
///
/// One client instance is scoped to one shop and injected into the
/// pipelines at construction.
#[async_trait]
pub trait RemoteCatalogClient: Send + Sync {
    /// Fetch lightweight product records matching the filter in one call.
    /// A failure here is fatal to the caller; there is no per-id recovery.
    async fn get_products(&self, filter: &ProductFilter) -> RemoteResult<Vec<RemoteProductRef>>;

    /// Fetch one category's full detail.
    async fn get_category(&self, id: i64) -> RemoteResult<RemoteCategory>;

    /// Create a remote category, returning its new remote id.
    async fn create_category(&self, payload: &CategoryPayload) -> RemoteResult<i64>;

    /// Update an existing remote category.
    async fn update_category(&self, id: i64, payload: &CategoryPayload) -> RemoteResult<()>;

    /// Delete a remote category.
    async fn delete_category(&self, id: i64) -> RemoteResult<()>;

    /// Fetch one product's full remote state.
    async fn get_product(&self, id: i64) -> RemoteResult<RemoteProduct>;

    /// Create a remote product, returning its new remote id.
    async fn create_product(&self, payload: &ProductPayload) -> RemoteResult<i64>;

    /// Update an existing remote product.
    async fn update_product(&self, id: i64, payload: &ProductPayload) -> RemoteResult<()>;

    /// Delete a remote product.
    async fn delete_product(&self, id: i64) -> RemoteResult<()>;

    /// Fetch a product's pricing sub-resource.
    async fn get_product_prices(&self, product_id: i64) -> RemoteResult<Value>;

    /// Fetch a product's stock sub-resource.
    async fn get_product_stock(&self, product_id: i64) -> RemoteResult<Value>;

    /// Create a remote attribute group (variant dimension), returning its id.
    async fn create_attribute_group(&self, name: &str) -> RemoteResult<i64>;

    /// Create a remote attribute value under a group, returning its id.
    async fn create_attribute_value(&self, group_id: i64, label: &str) -> RemoteResult<i64>;

    /// Create a remote combination, returning its new remote id.
    async fn create_combination(&self, payload: &CombinationPayload) -> RemoteResult<i64>;

    /// Replace the attribute-value set of an existing combination.
    async fn set_combination_attributes(
        &self,
        combination_id: i64,
        attribute_value_ids: &[i64],
    ) -> RemoteResult<()>;

    /// Replace the image associations of an existing combination.
    async fn set_combination_images(
        &self,
        combination_id: i64,
        image_ids: &[i64],
    ) -> RemoteResult<()>;

    /// Delete a remote combination.
    async fn delete_combination(&self, id: i64) -> RemoteResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(RemoteError::transient("503").is_transient());
        assert!(!RemoteError::transient("503").is_not_found());

        assert!(RemoteError::not_found("product", 9).is_not_found());
        assert!(!RemoteError::not_found("product", 9).is_transient());

        assert!(!RemoteError::permanent("validation").is_transient());
        assert!(!RemoteError::permanent("validation").is_not_found());
    }

    #[test]
    fn test_product_ref_category_union() {
        let p = RemoteProductRef {
            id: 1,
            default_category_id: Some(10),
            associated_category_ids: vec![10, 11, 12],
        };
        let ids = p.referenced_category_ids();
        assert_eq!(ids, vec![10, 10, 11, 12]);
    }

    #[test]
    fn test_root_level_detection() {
        let root = RemoteCategory {
            id: 12,
            parent_id: 2,
            depth: 1,
            name: "Home".to_string(),
            active: true,
        };
        assert!(root.is_root_level());

        let nested = RemoteCategory {
            id: 11,
            parent_id: 12,
            depth: 2,
            name: "Chairs".to_string(),
            active: true,
        };
        assert!(!nested.is_root_level());
    }
}
