//! Category previews and the human approval gate.
//!
//! A preview is the output of dependency resolution: the tree of remote
//! categories that would be created locally, frozen for a human to
//! approve, reject, or let expire. State transitions are single-shot and
//! guarded at the database level so a preview can never be approved
//! twice or approved after expiring.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::queue::{QueuedTask, TaskKind, TaskScheduler};
use crate::types::{PreviewStatus, TaskPriority};

/// One remote category proposed for creation, with its proposed children
/// nested beneath it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    /// Remote category id.
    pub remote_id: i64,
    /// Remote parent id. `None` for nodes whose parent already exists
    /// locally or is a remote root.
    pub parent_remote_id: Option<i64>,
    /// Remote tree depth, used for parent-first ordering.
    pub depth: i32,
    /// Category name as reported by the remote.
    pub name: String,
    /// Whether the remote category is active.
    pub active: bool,
    /// Proposed children of this node.
    pub children: Vec<CategoryNode>,
}

impl CategoryNode {
    /// Count this node and all descendants.
    #[must_use]
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(CategoryNode::subtree_size).sum::<usize>()
    }
}

/// The proposed category forest for one resolution run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryTree {
    /// Top-level proposed nodes. Their parents already exist locally.
    pub roots: Vec<CategoryNode>,
}

impl CategoryTree {
    /// Total number of proposed categories.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.roots.iter().map(CategoryNode::subtree_size).sum()
    }

    /// Whether no categories need creating.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Flatten to a parent-first list (ascending depth, parents before
    /// their children).
    #[must_use]
    pub fn flatten(&self) -> Vec<CategoryNode> {
        fn walk(node: &CategoryNode, out: &mut Vec<CategoryNode>) {
            let mut flat = node.clone();
            flat.children = Vec::new();
            out.push(flat);
            for child in &node.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        for root in &self.roots {
            walk(root, &mut out);
        }
        out.sort_by_key(|n| n.depth);
        out
    }
}

/// A stored preview awaiting a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryPreview {
    /// Preview id.
    pub id: Uuid,
    /// The batch job that produced this preview.
    pub batch_job_id: Uuid,
    /// Target shop.
    pub shop_id: Uuid,
    /// Proposed categories.
    pub category_tree: CategoryTree,
    /// Total proposed category count, denormalized for listing.
    pub total_count: i32,
    /// Context needed to resume the originating import after approval,
    /// typically the remote product ids being imported.
    pub import_context: Value,
    /// Lifecycle state.
    pub status: PreviewStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Hard deadline after which the preview can no longer be approved.
    pub expires_at: DateTime<Utc>,
}

impl CategoryPreview {
    /// Create a pending preview.
    #[must_use]
    pub fn new(
        batch_job_id: Uuid,
        shop_id: Uuid,
        category_tree: CategoryTree,
        import_context: Value,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let total_count = category_tree.total_count() as i32;
        Self {
            id: Uuid::new_v4(),
            batch_job_id,
            shop_id,
            category_tree,
            total_count,
            import_context,
            status: PreviewStatus::Pending,
            created_at: Utc::now(),
            expires_at,
        }
    }

    /// Whether the approval deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Storage for previews. Transitions return `false` when the preview was
/// no longer pending, so callers can distinguish a lost race from
/// success without a second read.
#[async_trait]
pub trait PreviewRepository: Send + Sync {
    async fn create(&self, preview: &CategoryPreview) -> SyncResult<()>;

    async fn get(&self, preview_id: Uuid) -> SyncResult<Option<CategoryPreview>>;

    /// Pending -> Approved. `false` if not pending anymore.
    async fn mark_approved(&self, preview_id: Uuid) -> SyncResult<bool>;

    /// Pending -> Rejected. `false` if not pending anymore.
    async fn mark_rejected(&self, preview_id: Uuid) -> SyncResult<bool>;

    /// Pending -> Expired. `false` if not pending anymore.
    async fn mark_expired(&self, preview_id: Uuid) -> SyncResult<bool>;
}

/// Postgres implementation over the `category_previews` table.
pub struct PgPreviewRepository {
    pool: PgPool,
}

impl PgPreviewRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn transition(&self, preview_id: Uuid, to: PreviewStatus) -> SyncResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE category_previews
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            ",
        )
        .bind(preview_id)
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PreviewRepository for PgPreviewRepository {
    async fn create(&self, preview: &CategoryPreview) -> SyncResult<()> {
        sqlx::query(
            r"
            INSERT INTO category_previews (
                id, batch_job_id, shop_id, category_tree, total_count,
                import_context, status, created_at, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(preview.id)
        .bind(preview.batch_job_id)
        .bind(preview.shop_id)
        .bind(serde_json::to_value(&preview.category_tree)?)
        .bind(preview.total_count)
        .bind(&preview.import_context)
        .bind(preview.status.as_str())
        .bind(preview.created_at)
        .bind(preview.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, preview_id: Uuid) -> SyncResult<Option<CategoryPreview>> {
        let row = sqlx::query_as::<_, PreviewRow>(
            r"
            SELECT id, batch_job_id, shop_id, category_tree, total_count,
                   import_context, status, created_at, expires_at
            FROM category_previews
            WHERE id = $1
            ",
        )
        .bind(preview_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PreviewRow::to_preview_checked).transpose()
    }

    async fn mark_approved(&self, preview_id: Uuid) -> SyncResult<bool> {
        self.transition(preview_id, PreviewStatus::Approved).await
    }

    async fn mark_rejected(&self, preview_id: Uuid) -> SyncResult<bool> {
        self.transition(preview_id, PreviewStatus::Rejected).await
    }

    async fn mark_expired(&self, preview_id: Uuid) -> SyncResult<bool> {
        self.transition(preview_id, PreviewStatus::Expired).await
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PreviewRow {
    id: Uuid,
    batch_job_id: Uuid,
    shop_id: Uuid,
    category_tree: Value,
    total_count: i32,
    import_context: Value,
    status: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl PreviewRow {
    fn to_preview_checked(self) -> SyncResult<CategoryPreview> {
        Ok(CategoryPreview {
            id: self.id,
            batch_job_id: self.batch_job_id,
            shop_id: self.shop_id,
            category_tree: serde_json::from_value(self.category_tree)?,
            total_count: self.total_count,
            import_context: self.import_context,
            status: self.status.parse().unwrap_or(PreviewStatus::Expired),
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

/// Drives the approve / reject / expire decisions on a stored preview
/// and chains approved previews into category creation.
pub struct ApprovalWorkflow {
    previews: std::sync::Arc<dyn PreviewRepository>,
    scheduler: std::sync::Arc<dyn TaskScheduler>,
}

impl ApprovalWorkflow {
    #[must_use]
    pub fn new(
        previews: std::sync::Arc<dyn PreviewRepository>,
        scheduler: std::sync::Arc<dyn TaskScheduler>,
    ) -> Self {
        Self { previews, scheduler }
    }

    /// Approve a pending preview and dispatch category creation. With
    /// `selected`, only the named subtrees are created; the rest of the
    /// proposal is dropped. An empty tree skips creation entirely and
    /// resumes the originating import directly.
    #[instrument(skip(self, selected))]
    pub async fn approve(
        &self,
        preview_id: Uuid,
        selected: Option<Vec<i64>>,
    ) -> SyncResult<()> {
        let preview = self
            .previews
            .get(preview_id)
            .await?
            .ok_or(SyncError::EntityNotFound {
                entity: "category_preview",
                id: preview_id,
            })?;

        if preview.status != PreviewStatus::Pending {
            return Err(SyncError::PreviewNotPending {
                preview_id,
                status: preview.status,
            });
        }

        if preview.is_expired() {
            // Past deadline but not yet swept; expire it now.
            self.previews.mark_expired(preview_id).await?;
            return Err(SyncError::PreviewExpired {
                preview_id,
                expired_at: preview.expires_at,
            });
        }

        if !self.previews.mark_approved(preview_id).await? {
            // Lost the race against another decision or the sweeper.
            return Err(SyncError::PreviewNotPending {
                preview_id,
                status: PreviewStatus::Pending,
            });
        }

        if preview.category_tree.is_empty() {
            info!(%preview_id, "Preview approved with empty tree, resuming import directly");
            self.resume_import(&preview, true).await?;
            return Ok(());
        }

        let payload = serde_json::json!({
            "preview_id": preview.id,
            "selected": selected,
        });
        let task = QueuedTask::new(
            preview.shop_id,
            None,
            TaskKind::CreateCategories,
            payload,
        )
        .with_priority(TaskPriority::High);
        self.scheduler.schedule(task).await?;

        info!(%preview_id, total = preview.total_count, "Preview approved, category creation dispatched");
        Ok(())
    }

    /// Reject a pending preview. The originating import is not resumed.
    #[instrument(skip(self))]
    pub async fn reject(&self, preview_id: Uuid) -> SyncResult<()> {
        let preview = self
            .previews
            .get(preview_id)
            .await?
            .ok_or(SyncError::EntityNotFound {
                entity: "category_preview",
                id: preview_id,
            })?;

        if preview.status != PreviewStatus::Pending {
            return Err(SyncError::PreviewNotPending {
                preview_id,
                status: preview.status,
            });
        }

        if !self.previews.mark_rejected(preview_id).await? {
            return Err(SyncError::PreviewNotPending {
                preview_id,
                status: PreviewStatus::Pending,
            });
        }

        info!(%preview_id, "Preview rejected");
        Ok(())
    }

    /// Expire a preview whose deadline passed. Idempotent: expiring a
    /// preview that was already decided is a no-op, not an error.
    #[instrument(skip(self))]
    pub async fn expire(&self, preview_id: Uuid) -> SyncResult<()> {
        let Some(preview) = self.previews.get(preview_id).await? else {
            return Ok(());
        };

        if preview.status != PreviewStatus::Pending {
            return Ok(());
        }

        if self.previews.mark_expired(preview_id).await? {
            warn!(%preview_id, "Preview expired without a decision");
        }
        Ok(())
    }

    /// Resume the import the preview was blocking. `categories_present`
    /// tells the import it may skip re-resolving category dependencies.
    async fn resume_import(
        &self,
        preview: &CategoryPreview,
        categories_present: bool,
    ) -> SyncResult<()> {
        let payload = serde_json::json!({
            "import_context": preview.import_context,
            "categories_present": categories_present,
        });
        let task = QueuedTask::new(preview.shop_id, None, TaskKind::PushEntity, payload);
        self.scheduler.schedule(task).await?;
        Ok(())
    }
}
