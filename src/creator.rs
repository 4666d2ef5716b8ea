//! Approved category creation.
//!
//! Materializes an approved preview parent-first: each proposed remote
//! category becomes a local category plus a mapping row. One node
//! failing never aborts the batch, but its descendants are skipped so
//! no category is ever created under a missing parent. A mapping write
//! failing after the local create rolls the local category back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::mapping::{Mapping, MappingStore};
use crate::preview::{CategoryNode, CategoryPreview, PreviewRepository};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::queue::{QueuedTask, TaskKind, TaskScheduler};
use crate::repository::{EntityRepository, LocalCategory};
use crate::types::{EntityType, PreviewStatus, TaskPriority};

/// Outcome for a single proposed category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Local category and mapping created.
    Created { local_id: Uuid },
    /// A live mapping already existed, nothing to do.
    AlreadyMapped { local_id: Uuid },
    /// The node itself failed.
    Failed { reason: String },
    /// An ancestor failed, so this node was not attempted.
    SkippedParentFailed { parent_remote_id: i64 },
}

impl NodeOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Created { .. } | NodeOutcome::AlreadyMapped { .. })
    }
}

/// Per-batch creation report.
#[derive(Debug, Clone, Default)]
pub struct CreationReport {
    /// Outcome per remote category id, in processing order.
    pub outcomes: Vec<(i64, NodeOutcome)>,
}

impl CreationReport {
    #[must_use]
    pub fn created(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, NodeOutcome::Created { .. }))
            .count()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_success()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    fn summary(&self) -> Value {
        serde_json::json!({
            "total": self.outcomes.len(),
            "created": self.created(),
            "succeeded": self.succeeded(),
            "failed": self.failed(),
        })
    }
}

/// Creates approved categories locally, parent-first, and resumes the
/// originating import once at least one category is usable.
pub struct HierarchicalEntityCreator {
    repository: Arc<dyn EntityRepository>,
    mappings: Arc<dyn MappingStore>,
    previews: Arc<dyn PreviewRepository>,
    scheduler: Arc<dyn TaskScheduler>,
    progress: Arc<dyn ProgressSink>,
}

impl HierarchicalEntityCreator {
    #[must_use]
    pub fn new(
        repository: Arc<dyn EntityRepository>,
        mappings: Arc<dyn MappingStore>,
        previews: Arc<dyn PreviewRepository>,
        scheduler: Arc<dyn TaskScheduler>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            repository,
            mappings,
            previews,
            scheduler,
            progress,
        }
    }

    /// Create the categories of an approved preview. With `selected`,
    /// only the named remote ids are attempted; a selected child whose
    /// parent was deselected fails as dangling rather than landing in
    /// the wrong place.
    #[instrument(skip(self, selected), fields(%preview_id))]
    pub async fn create_from_preview(
        &self,
        preview_id: Uuid,
        selected: Option<&[i64]>,
    ) -> SyncResult<CreationReport> {
        let preview = self
            .previews
            .get(preview_id)
            .await?
            .ok_or(SyncError::EntityNotFound {
                entity: "category_preview",
                id: preview_id,
            })?;

        if preview.status != PreviewStatus::Approved {
            return Err(SyncError::PreviewNotPending {
                preview_id,
                status: preview.status,
            });
        }

        let mut nodes = preview.category_tree.flatten();
        if let Some(selected) = selected {
            let keep: HashSet<i64> = selected.iter().copied().collect();
            nodes.retain(|n| keep.contains(&n.remote_id));
        }

        let report = self.create_nodes(&preview, &nodes).await?;

        info!(
            created = report.created(),
            failed = report.failed(),
            "Category creation finished"
        );

        if report.succeeded() > 0 || nodes.is_empty() {
            self.resume_import(&preview).await?;
            self.progress
                .completed(preview.batch_job_id, report.summary())
                .await;
        } else {
            // Everything failed; surface the batch as failed instead
            // of resuming an import that cannot place its products.
            self.progress
                .failed(preview.batch_job_id, "No categories could be created")
                .await;
        }

        Ok(report)
    }

    async fn create_nodes(
        &self,
        preview: &CategoryPreview,
        nodes: &[CategoryNode],
    ) -> SyncResult<CreationReport> {
        let shop_id = preview.shop_id;
        let total = nodes.len().max(1);
        // remote id -> local id for nodes handled in this run.
        let mut placed: HashMap<i64, Uuid> = HashMap::new();
        let mut failed_ids: HashSet<i64> = HashSet::new();
        let mut report = CreationReport::default();

        for (index, node) in nodes.iter().enumerate() {
            let percent = ((index + 1) * 100 / total) as u8;
            self.progress
                .report(ProgressUpdate::new(
                    preview.batch_job_id,
                    percent,
                    "creating_categories",
                    &format!("Creating category {}", node.name),
                ))
                .await;

            if let Some(parent) = node.parent_remote_id {
                if failed_ids.contains(&parent) {
                    failed_ids.insert(node.remote_id);
                    report.outcomes.push((
                        node.remote_id,
                        NodeOutcome::SkippedParentFailed { parent_remote_id: parent },
                    ));
                    continue;
                }
            }

            let outcome = self.create_node(shop_id, node, &placed).await;
            match &outcome {
                NodeOutcome::Created { local_id } | NodeOutcome::AlreadyMapped { local_id } => {
                    placed.insert(node.remote_id, *local_id);
                }
                NodeOutcome::Failed { reason } => {
                    error!(remote_id = node.remote_id, reason, "Category creation failed");
                    failed_ids.insert(node.remote_id);
                }
                NodeOutcome::SkippedParentFailed { .. } => {}
            }
            report.outcomes.push((node.remote_id, outcome));
        }

        Ok(report)
    }

    async fn create_node(
        &self,
        shop_id: Uuid,
        node: &CategoryNode,
        placed: &HashMap<i64, Uuid>,
    ) -> NodeOutcome {
        // Re-check the mapping so an interrupted run can be replayed
        // without duplicating categories.
        match self
            .mappings
            .get_by_remote(shop_id, EntityType::Category, node.remote_id)
            .await
        {
            Ok(Some(existing)) => {
                return NodeOutcome::AlreadyMapped { local_id: existing.local_id };
            }
            Ok(None) => {}
            Err(err) => return NodeOutcome::Failed { reason: err.to_string() },
        }

        let parent_local_id = match node.parent_remote_id {
            None => None,
            Some(parent_remote_id) => match placed.get(&parent_remote_id) {
                Some(local_id) => Some(*local_id),
                None => {
                    // Parent not created in this run; it must already be
                    // mapped or the node is dangling.
                    match self
                        .mappings
                        .get_by_remote(shop_id, EntityType::Category, parent_remote_id)
                        .await
                    {
                        Ok(Some(mapping)) => Some(mapping.local_id),
                        Ok(None) => {
                            let err = SyncError::DanglingParent {
                                remote_id: node.remote_id,
                                parent_remote_id,
                            };
                            return NodeOutcome::Failed { reason: err.to_string() };
                        }
                        Err(err) => return NodeOutcome::Failed { reason: err.to_string() },
                    }
                }
            },
        };

        let local = LocalCategory {
            id: Uuid::new_v4(),
            name: node.name.clone(),
            parent_id: parent_local_id,
            active: node.active,
        };
        let local_id = match self.repository.create_category(&local).await {
            Ok(id) => id,
            Err(err) => return NodeOutcome::Failed { reason: err.to_string() },
        };

        let mapping = Mapping::new(
            shop_id,
            EntityType::Category,
            local_id,
            node.remote_id,
            Some(node.name.clone()),
        );
        if let Err(err) = self.mappings.upsert(&mapping).await {
            // The pair must land together; undo the local create.
            warn!(remote_id = node.remote_id, %local_id, "Mapping write failed, rolling back local category");
            if let Err(cleanup) = self.repository.delete_category(local_id).await {
                error!(%local_id, error = %cleanup, "Rollback of local category failed");
            }
            return NodeOutcome::Failed { reason: err.to_string() };
        }

        NodeOutcome::Created { local_id }
    }

    /// Resume the originating import. The categories it needs are now
    /// present, so it may skip dependency resolution.
    async fn resume_import(&self, preview: &CategoryPreview) -> SyncResult<()> {
        let payload = serde_json::json!({
            "import_context": preview.import_context,
            "categories_present": true,
        });
        let task = QueuedTask::new(preview.shop_id, None, TaskKind::PushEntity, payload)
            .with_priority(TaskPriority::Normal);
        self.scheduler.schedule(task).await?;
        Ok(())
    }
}
