//! Crate-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::remote::RemoteError;
use crate::types::PreviewStatus;

/// Errors that can occur during synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Remote catalog API error.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local entity not found.
    #[error("{entity} not found: {id}")]
    EntityNotFound { entity: &'static str, id: Uuid },

    /// No mapping exists where one is required.
    #[error("No active mapping for {entity_type} {local_id} on shop {shop_id}")]
    MappingMissing {
        shop_id: Uuid,
        entity_type: &'static str,
        local_id: Uuid,
    },

    /// Preview action attempted in a non-pending state.
    #[error("Preview {preview_id} is {status}, expected pending")]
    PreviewNotPending {
        preview_id: Uuid,
        status: PreviewStatus,
    },

    /// Preview action attempted after expiry.
    #[error("Preview {preview_id} expired at {expired_at}")]
    PreviewExpired {
        preview_id: Uuid,
        expired_at: chrono::DateTime<chrono::Utc>,
    },

    /// A proposed category references a parent that cannot be resolved.
    #[error("Category {remote_id} references unresolvable parent {parent_remote_id}")]
    DanglingParent {
        remote_id: i64,
        parent_remote_id: i64,
    },

    /// The proposed category set contains a parent cycle.
    #[error("Cycle detected in proposed category set involving remote id {remote_id}")]
    CycleDetected { remote_id: i64 },

    /// Retry budget exhausted for a sync task.
    #[error("Retries exhausted for entity {entity_id} on shop {shop_id} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        entity_id: Uuid,
        shop_id: Uuid,
        attempts: i32,
        last_error: String,
    },

    /// Another worker holds the sync lease for this (entity, shop).
    #[error("Sync already in flight for entity {entity_id} on shop {shop_id}")]
    AlreadyInFlight { entity_id: Uuid, shop_id: Uuid },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error should be retried by the task runtime.
    ///
    /// Only transient remote failures and database errors qualify; domain
    /// errors (missing mappings, state violations) are permanent.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_transient(),
            SyncError::Database(_) => true,
            _ => false,
        }
    }

    /// Check if this error is the distinguished not-found class that drives
    /// graceful unlink behavior.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Remote(e) if e.is_not_found())
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_remote_is_retryable() {
        let err = SyncError::Remote(RemoteError::transient("gateway timeout"));
        assert!(err.is_retryable());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_is_not_retryable() {
        let err = SyncError::Remote(RemoteError::not_found("category", 42));
        assert!(!err.is_retryable());
        assert!(err.is_not_found());
    }

    #[test]
    fn test_domain_errors_are_permanent() {
        let err = SyncError::MappingMissing {
            shop_id: Uuid::new_v4(),
            entity_type: "category",
            local_id: Uuid::new_v4(),
        };
        assert!(!err.is_retryable());

        let err = SyncError::CycleDetected { remote_id: 7 };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::DanglingParent {
            remote_id: 11,
            parent_remote_id: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("11"));
        assert!(msg.contains("12"));
    }
}
