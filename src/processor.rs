//! Task processor.
//!
//! Routes dequeued tasks to the pipeline that handles their kind,
//! parsing the kind-specific payload on the way. This is the only place
//! that knows how payloads are shaped; the pipelines themselves take
//! typed arguments.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::creator::HierarchicalEntityCreator;
use crate::error::{SyncError, SyncResult};
use crate::preview::ApprovalWorkflow;
use crate::pull::PullSynchronizer;
use crate::push::PushSynchronizer;
use crate::queue::{QueuedTask, TaskKind, TaskScheduler};
use crate::resolver::CategoryDependencyResolver;
use crate::types::ConflictPolicy;
use crate::variant::VariantSynchronizer;
use crate::worker::TaskHandler;

#[derive(Debug, Deserialize)]
struct ResolveCategoriesPayload {
    job_id: Uuid,
    remote_product_ids: Vec<i64>,
    #[serde(default)]
    import_context: Value,
}

#[derive(Debug, Deserialize)]
struct CreateCategoriesPayload {
    preview_id: Uuid,
    #[serde(default)]
    selected: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct ImportResumePayload {
    import_context: Value,
    #[serde(default)]
    categories_present: bool,
}

#[derive(Debug, Deserialize)]
struct PullEntityPayload {
    #[serde(default)]
    policy: Option<ConflictPolicy>,
}

#[derive(Debug, Deserialize)]
struct ExpirePreviewPayload {
    preview_id: Uuid,
}

/// Wires every pipeline behind the queue.
pub struct SyncProcessor {
    resolver: Arc<CategoryDependencyResolver>,
    creator: Arc<HierarchicalEntityCreator>,
    approval: Arc<ApprovalWorkflow>,
    push: Arc<PushSynchronizer>,
    pull: Arc<PullSynchronizer>,
    variants: Arc<VariantSynchronizer>,
    scheduler: Arc<dyn TaskScheduler>,
}

impl SyncProcessor {
    #[must_use]
    pub fn new(
        resolver: Arc<CategoryDependencyResolver>,
        creator: Arc<HierarchicalEntityCreator>,
        approval: Arc<ApprovalWorkflow>,
        push: Arc<PushSynchronizer>,
        pull: Arc<PullSynchronizer>,
        variants: Arc<VariantSynchronizer>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        Self {
            resolver,
            creator,
            approval,
            push,
            pull,
            variants,
            scheduler,
        }
    }

    fn entity_id(task: &QueuedTask) -> SyncResult<Uuid> {
        task.entity_id
            .ok_or_else(|| SyncError::internal(format!("{} task has no entity id", task.kind)))
    }

    /// Fan an import-resume payload out into one push task per product.
    async fn resume_import(&self, task: &QueuedTask, payload: ImportResumePayload) -> SyncResult<()> {
        #[derive(Debug, Deserialize)]
        struct ImportContext {
            #[serde(default)]
            product_ids: Vec<Uuid>,
        }

        let context: ImportContext = serde_json::from_value(payload.import_context)?;
        info!(
            products = context.product_ids.len(),
            categories_present = payload.categories_present,
            "Resuming import"
        );
        for product_id in context.product_ids {
            let push = crate::queue::QueuedTask::new(
                task.shop_id,
                Some(product_id),
                TaskKind::PushEntity,
                serde_json::json!({}),
            )
            .with_unique_key(crate::queue::QueuedTask::push_key(task.shop_id, product_id));
            self.scheduler.schedule(push).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for SyncProcessor {
    #[instrument(skip(self, task), fields(task_id = %task.id, kind = %task.kind))]
    async fn handle(&self, task: &QueuedTask) -> SyncResult<()> {
        match task.kind {
            TaskKind::ResolveCategories => {
                let payload: ResolveCategoriesPayload = serde_json::from_value(task.payload.clone())?;
                self.resolver
                    .resolve(
                        payload.job_id,
                        task.shop_id,
                        &payload.remote_product_ids,
                        payload.import_context,
                    )
                    .await?;
                Ok(())
            }
            TaskKind::CreateCategories => {
                let payload: CreateCategoriesPayload = serde_json::from_value(task.payload.clone())?;
                self.creator
                    .create_from_preview(payload.preview_id, payload.selected.as_deref())
                    .await?;
                Ok(())
            }
            TaskKind::PushEntity => match task.entity_id {
                Some(product_id) => {
                    self.push.push_product(task.shop_id, product_id).await?;
                    Ok(())
                }
                None => {
                    let payload: ImportResumePayload = serde_json::from_value(task.payload.clone())?;
                    self.resume_import(task, payload).await
                }
            },
            TaskKind::PullEntity => {
                let payload: PullEntityPayload = serde_json::from_value(task.payload.clone())?;
                let policy = payload.policy.unwrap_or(ConflictPolicy::RemoteWins);
                self.pull
                    .pull_product(task.shop_id, Self::entity_id(task)?, policy)
                    .await?;
                Ok(())
            }
            TaskKind::SyncVariants => {
                self.variants
                    .sync_variant(task.shop_id, Self::entity_id(task)?)
                    .await?;
                Ok(())
            }
            TaskKind::ExpirePreview => {
                let payload: ExpirePreviewPayload = serde_json::from_value(task.payload.clone())?;
                self.approval.expire(payload.preview_id).await
            }
        }
    }
}
