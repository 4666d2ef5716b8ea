//! Shared enums used across the synchronization engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of local catalog entity tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A sellable product.
    Product,
    /// A catalog category.
    Category,
    /// A variant dimension (e.g. "Size").
    AttributeType,
    /// A concrete value of a dimension (e.g. "L").
    AttributeValue,
    /// A product variant (remote "combination").
    Variant,
}

impl EntityType {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Category => "category",
            EntityType::AttributeType => "attribute_type",
            EntityType::AttributeValue => "attribute_value",
            EntityType::Variant => "variant",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product" => Ok(EntityType::Product),
            "category" => Ok(EntityType::Category),
            "attribute_type" => Ok(EntityType::AttributeType),
            "attribute_value" => Ok(EntityType::AttributeValue),
            "variant" => Ok(EntityType::Variant),
            _ => Err(format!("Unknown entity type: {s}")),
        }
    }
}

/// Per-entity-per-shop synchronization status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Queued, not yet attempted.
    Pending,
    /// A worker currently holds the sync lease.
    InProgress,
    /// Local and remote agree; remote id recorded.
    Synced,
    /// Retry budget exhausted; needs manual re-trigger.
    Failed,
    /// No remote counterpart (never pushed, or remote deleted it).
    NotSynced,
    /// Divergence detected under the manual policy.
    Conflict,
}

impl SyncStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::InProgress => "in_progress",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
            SyncStatus::NotSynced => "not_synced",
            SyncStatus::Conflict => "conflict",
        }
    }

    /// Check if this status allows an automatic retry.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::InProgress)
    }

    /// Check if this is a terminal status for the current attempt cycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Synced | SyncStatus::Failed | SyncStatus::Conflict
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "in_progress" => Ok(SyncStatus::InProgress),
            "synced" => Ok(SyncStatus::Synced),
            "failed" => Ok(SyncStatus::Failed),
            "not_synced" => Ok(SyncStatus::NotSynced),
            "conflict" => Ok(SyncStatus::Conflict),
            _ => Err(format!("Unknown sync status: {s}")),
        }
    }
}

/// Lifecycle status of a category preview awaiting human approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    /// Awaiting user action.
    Pending,
    /// Approved; creation dispatched.
    Approved,
    /// Rejected by the user.
    Rejected,
    /// Timed out with no user action.
    Expired,
}

impl PreviewStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PreviewStatus::Pending => "pending",
            PreviewStatus::Approved => "approved",
            PreviewStatus::Rejected => "rejected",
            PreviewStatus::Expired => "expired",
        }
    }

    /// Check if this is a terminal status. Transitions are single-shot:
    /// once non-pending, a preview never changes again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PreviewStatus::Pending)
    }
}

impl fmt::Display for PreviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PreviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PreviewStatus::Pending),
            "approved" => Ok(PreviewStatus::Approved),
            "rejected" => Ok(PreviewStatus::Rejected),
            "expired" => Ok(PreviewStatus::Expired),
            _ => Err(format!("Unknown preview status: {s}")),
        }
    }
}

/// Policy applied when a pull finds the remote and local state diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Remote values overwrite local values.
    RemoteWins,
    /// Local values stay; the pull timestamp is still recorded.
    LocalWins,
    /// Divergent fields are logged for review; local data untouched.
    Manual,
}

impl ConflictPolicy {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::RemoteWins => "remote_wins",
            ConflictPolicy::LocalWins => "local_wins",
            ConflictPolicy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remote_wins" => Ok(ConflictPolicy::RemoteWins),
            "local_wins" => Ok(ConflictPolicy::LocalWins),
            "manual" => Ok(ConflictPolicy::Manual),
            _ => Err(format!("Unknown conflict policy: {s}")),
        }
    }
}

/// Operation tag carried by a variant synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantOp {
    /// Create a new remote combination.
    Add,
    /// Update an existing remote combination; falls back to Add when the
    /// expected combination is absent.
    Override,
    /// Remove the remote combination (already-absent counts as success).
    Delete,
    /// No remote action; the default combination is used as-is.
    Inherit,
}

impl VariantOp {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantOp::Add => "ADD",
            VariantOp::Override => "OVERRIDE",
            VariantOp::Delete => "DELETE",
            VariantOp::Inherit => "INHERIT",
        }
    }
}

impl fmt::Display for VariantOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VariantOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ADD" => Ok(VariantOp::Add),
            "OVERRIDE" => Ok(VariantOp::Override),
            "DELETE" => Ok(VariantOp::Delete),
            "INHERIT" => Ok(VariantOp::Inherit),
            _ => Err(format!("Unknown variant operation: {s}")),
        }
    }
}

/// Kind of remote write a push performs. Changing kind (create → update)
/// is the one event that resets a sync record's retry counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// First remote materialization.
    Create,
    /// Remote counterpart exists; push updates it.
    Update,
}

impl ChangeKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(ChangeKind::Create),
            "update" => Ok(ChangeKind::Update),
            _ => Err(format!("Unknown change kind: {s}")),
        }
    }
}

/// Dispatch lane for batched tasks. High-priority lanes drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Drained first.
    High,
    /// Default lane.
    Normal,
    /// Drained last.
    Low,
}

impl TaskPriority {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
        }
    }

    /// Numeric rank used for queue ordering (lower dispatches first).
    #[must_use]
    pub fn rank(&self) -> i16 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Normal => 1,
            TaskPriority::Low => 2,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(TaskPriority::High),
            "normal" => Ok(TaskPriority::Normal),
            "low" => Ok(TaskPriority::Low),
            _ => Err(format!("Unknown task priority: {s}")),
        }
    }
}
