//! Category dependency resolution.
//!
//! Before products can be imported from a shop, every remote category
//! they reference must exist locally. The resolver walks the referenced
//! categories and their remote ancestors, subtracts what is already
//! mapped, and freezes the remainder into a preview for human approval.
//! Nothing is created here; creation happens only after approval.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::mapping::MappingStore;
use crate::preview::{CategoryNode, CategoryPreview, CategoryTree, PreviewRepository};
use crate::progress::{AwaitingUserAction, ProgressSink, ProgressUpdate};
use crate::queue::{QueuedTask, TaskKind, TaskScheduler};
use crate::remote::{ProductFilter, RemoteCatalogClient, RemoteCategory};
use crate::repository::EntityRepository;
use crate::types::EntityType;

const PRODUCT_BATCH_SIZE: usize = 50;

/// Resolves which remote categories must be created before an import
/// can proceed, and stores the result as a pending preview.
pub struct CategoryDependencyResolver {
    client: Arc<dyn RemoteCatalogClient>,
    mappings: Arc<dyn MappingStore>,
    repository: Arc<dyn EntityRepository>,
    previews: Arc<dyn PreviewRepository>,
    scheduler: Arc<dyn TaskScheduler>,
    progress: Arc<dyn ProgressSink>,
    config: SyncConfig,
}

impl CategoryDependencyResolver {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        client: Arc<dyn RemoteCatalogClient>,
        mappings: Arc<dyn MappingStore>,
        repository: Arc<dyn EntityRepository>,
        previews: Arc<dyn PreviewRepository>,
        scheduler: Arc<dyn TaskScheduler>,
        progress: Arc<dyn ProgressSink>,
        config: SyncConfig,
    ) -> Self {
        Self {
            client,
            mappings,
            repository,
            previews,
            scheduler,
            progress,
            config,
        }
    }

    /// Resolve category dependencies for the given remote products and
    /// store a preview. A preview is stored even when nothing is
    /// missing, so the approval gate is uniform for every import.
    ///
    /// Remote failures while fetching individual category details are
    /// tolerated: the affected category is dropped from the proposal.
    /// A failure fetching the product batch itself is fatal.
    #[instrument(skip(self, import_context), fields(%job_id, %shop_id, products = remote_product_ids.len()))]
    pub async fn resolve(
        &self,
        job_id: Uuid,
        shop_id: Uuid,
        remote_product_ids: &[i64],
        import_context: Value,
    ) -> SyncResult<CategoryPreview> {
        self.report(job_id, 10, "extracting_categories", "Reading product category references")
            .await;
        let referenced = self.collect_referenced_categories(remote_product_ids).await?;

        self.report(job_id, 30, "checking_existing", "Checking existing mappings")
            .await;
        let existing = self.existing_remote_ids(shop_id, &referenced).await?;

        let missing: Vec<i64> = {
            let mut ids: Vec<i64> = referenced
                .iter()
                .copied()
                .filter(|id| !existing.contains(id))
                .collect();
            ids.sort_unstable();
            ids
        };
        info!(
            referenced = referenced.len(),
            existing = existing.len(),
            missing = missing.len(),
            "Category reference partition computed"
        );

        self.report(job_id, 50, "fetching_details", "Fetching missing category details")
            .await;
        let fetched = self.fetch_with_ancestors(&missing, &existing).await?;

        self.report(job_id, 80, "building_tree", "Building category tree")
            .await;
        let tree = build_tree(&fetched)?;

        self.report(job_id, 95, "storing_preview", "Storing preview for approval")
            .await;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.config.preview_ttl)
                .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let preview = CategoryPreview::new(job_id, shop_id, tree, import_context, expires_at);
        self.previews.create(&preview).await?;

        // Sweep the preview if nobody decides before the deadline.
        let expire = QueuedTask::new(
            shop_id,
            None,
            TaskKind::ExpirePreview,
            serde_json::json!({ "preview_id": preview.id }),
        )
        .with_delay(self.config.preview_ttl);
        self.scheduler.schedule(expire).await?;

        self.progress
            .awaiting_user(AwaitingUserAction {
                job_id,
                action: "approve_categories".to_string(),
                payload: serde_json::json!({
                    "preview_id": preview.id,
                    "total_count": preview.total_count,
                }),
                message: format!(
                    "{} categories need to be created before the import can continue",
                    preview.total_count
                ),
            })
            .await;

        Ok(preview)
    }

    /// Fetch the products in batches and union every category id they
    /// reference, default and associated alike.
    async fn collect_referenced_categories(
        &self,
        remote_product_ids: &[i64],
    ) -> SyncResult<HashSet<i64>> {
        let mut referenced = HashSet::new();
        for chunk in remote_product_ids.chunks(PRODUCT_BATCH_SIZE) {
            let filter = ProductFilter { ids: chunk.to_vec() };
            let products = self.client.get_products(&filter).await?;
            for product in &products {
                referenced.extend(product.referenced_category_ids());
            }
        }
        Ok(referenced)
    }

    /// Remote ids already usable locally: mapped and backed by a local
    /// category that still exists. Mappings pointing at deleted local
    /// categories are deactivated so creation can re-map them.
    async fn existing_remote_ids(
        &self,
        shop_id: Uuid,
        referenced: &HashSet<i64>,
    ) -> SyncResult<HashSet<i64>> {
        let ids: Vec<i64> = referenced.iter().copied().collect();
        let mappings = self
            .mappings
            .get_by_remote_ids(shop_id, EntityType::Category, &ids)
            .await?;
        if mappings.is_empty() {
            return Ok(HashSet::new());
        }

        let local_ids: Vec<Uuid> = mappings.iter().map(|m| m.local_id).collect();
        let alive: HashSet<Uuid> = self
            .repository
            .existing_category_ids(&local_ids)
            .await?
            .into_iter()
            .collect();

        let mut existing = HashSet::new();
        for mapping in mappings {
            if alive.contains(&mapping.local_id) {
                existing.insert(mapping.remote_id);
            } else {
                warn!(
                    remote_id = mapping.remote_id,
                    local_id = %mapping.local_id,
                    "Mapping points at a deleted local category, deactivating"
                );
                self.mappings
                    .deactivate(shop_id, EntityType::Category, mapping.local_id)
                    .await?;
            }
        }
        Ok(existing)
    }

    /// Fetch details for the missing categories, then walk each parent
    /// chain upward until it reaches an existing or root-level category.
    /// Ancestors found along the way are added to the proposal. A parent
    /// chain revisiting one of its own ids is a cycle and aborts the run.
    async fn fetch_with_ancestors(
        &self,
        missing: &[i64],
        existing: &HashSet<i64>,
    ) -> SyncResult<HashMap<i64, RemoteCategory>> {
        let mut fetched: HashMap<i64, RemoteCategory> = HashMap::new();

        for &id in missing {
            if fetched.contains_key(&id) {
                continue;
            }
            let mut chain = HashSet::new();
            let mut current = id;
            loop {
                if !chain.insert(current) {
                    return Err(SyncError::CycleDetected { remote_id: current });
                }
                if fetched.contains_key(&current) || existing.contains(&current) {
                    break;
                }
                let category = match self.client.get_category(current).await {
                    Ok(category) => category,
                    Err(err) => {
                        // Unresolvable category; drop it and everything
                        // below it from the proposal.
                        warn!(remote_id = current, error = %err, "Dropping unresolvable category from proposal");
                        break;
                    }
                };
                let parent = category.parent_id;
                let is_root = category.is_root_level();
                fetched.insert(current, category);
                if is_root {
                    break;
                }
                current = parent;
            }
        }

        Ok(fetched)
    }

    async fn report(&self, job_id: Uuid, percent: u8, phase: &str, label: &str) {
        self.progress
            .report(ProgressUpdate::new(job_id, percent, phase, label))
            .await;
    }
}

/// Assemble fetched categories into a forest. A node is a root when its
/// parent is not part of the proposal (it exists locally or is a remote
/// root). Children are ordered by remote id for deterministic output.
fn build_tree(fetched: &HashMap<i64, RemoteCategory>) -> SyncResult<CategoryTree> {
    let mut children_of: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut root_ids = Vec::new();
    for category in fetched.values() {
        if fetched.contains_key(&category.parent_id) {
            children_of.entry(category.parent_id).or_default().push(category.id);
        } else {
            root_ids.push(category.id);
        }
    }
    root_ids.sort_unstable();
    for ids in children_of.values_mut() {
        ids.sort_unstable();
    }

    fn build_node(
        id: i64,
        fetched: &HashMap<i64, RemoteCategory>,
        children_of: &HashMap<i64, Vec<i64>>,
        visiting: &mut HashSet<i64>,
    ) -> SyncResult<CategoryNode> {
        if !visiting.insert(id) {
            return Err(SyncError::CycleDetected { remote_id: id });
        }
        let category = &fetched[&id];
        let mut children = Vec::new();
        if let Some(child_ids) = children_of.get(&id) {
            for &child_id in child_ids {
                children.push(build_node(child_id, fetched, children_of, visiting)?);
            }
        }
        Ok(CategoryNode {
            remote_id: category.id,
            parent_remote_id: if fetched.contains_key(&category.parent_id) {
                Some(category.parent_id)
            } else {
                None
            },
            depth: category.depth,
            name: category.name.clone(),
            active: category.active,
            children,
        })
    }

    let mut visiting = HashSet::new();
    let mut roots = Vec::new();
    for id in root_ids {
        roots.push(build_node(id, fetched, &children_of, &mut visiting)?);
    }

    // Anything never reached from a root sits on a cycle.
    if visiting.len() != fetched.len() {
        let orphan = fetched
            .keys()
            .find(|id| !visiting.contains(id))
            .copied()
            .unwrap_or_default();
        return Err(SyncError::CycleDetected { remote_id: orphan });
    }

    Ok(CategoryTree { roots })
}
