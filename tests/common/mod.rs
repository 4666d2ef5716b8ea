//! Shared in-memory test doubles for the sync pipelines.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use catalog_sync::error::SyncResult;
use catalog_sync::mapping::{Mapping, MappingStore};
use catalog_sync::preview::{CategoryPreview, PreviewRepository};
use catalog_sync::progress::{AwaitingUserAction, ProgressSink, ProgressUpdate};
use catalog_sync::pull::{ConflictLog, ConflictLogStore};
use catalog_sync::queue::{QueuedTask, TaskScheduler};
use catalog_sync::remote::{
    CategoryPayload, CombinationPayload, ProductFilter, ProductPayload, RemoteCatalogClient,
    RemoteCategory, RemoteError, RemoteProduct, RemoteProductRef, RemoteResult,
};
use catalog_sync::repository::{
    EntityRepository, LocalAttributeType, LocalAttributeValue, LocalCategory, LocalProduct,
    LocalVariant,
};
use catalog_sync::status::{SyncTaskRecord, SyncTaskRepository};
use catalog_sync::types::{EntityType, PreviewStatus};

// =============================================================================
// Mock remote client
// =============================================================================

/// Remote client with per-call behavior switches and call counters.
#[allow(dead_code)]
pub struct MockRemoteClient {
    pub product_refs: Mutex<HashMap<i64, RemoteProductRef>>,
    pub categories: Mutex<HashMap<i64, RemoteCategory>>,
    pub products: Mutex<HashMap<i64, RemoteProduct>>,
    next_id: AtomicI64,

    // Behavior switches. 0 = success.
    create_product_behavior: AtomicUsize, // 1 = transient error
    update_product_behavior: AtomicUsize, // 1 = transient, 2 = not found
    get_products_behavior: AtomicUsize,   // 1 = transient error
    update_combination_behavior: AtomicUsize, // 2 = not found
    delete_combination_behavior: AtomicUsize, // 2 = not found
    failing_categories: Mutex<Vec<i64>>,

    // Call counters and logs.
    create_product_calls: AtomicUsize,
    update_product_calls: AtomicUsize,
    create_group_calls: AtomicUsize,
    create_value_calls: AtomicUsize,
    get_product_calls: AtomicUsize,
    pub created_groups: Mutex<Vec<String>>,
    pub created_values: Mutex<Vec<(i64, String)>>,
    pub created_combinations: Mutex<Vec<CombinationPayload>>,
    pub deleted_combinations: Mutex<Vec<i64>>,
}

#[allow(dead_code)]
impl MockRemoteClient {
    pub fn new() -> Self {
        Self {
            product_refs: Mutex::new(HashMap::new()),
            categories: Mutex::new(HashMap::new()),
            products: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1000),
            create_product_behavior: AtomicUsize::new(0),
            update_product_behavior: AtomicUsize::new(0),
            get_products_behavior: AtomicUsize::new(0),
            update_combination_behavior: AtomicUsize::new(0),
            delete_combination_behavior: AtomicUsize::new(0),
            failing_categories: Mutex::new(Vec::new()),
            create_product_calls: AtomicUsize::new(0),
            update_product_calls: AtomicUsize::new(0),
            create_group_calls: AtomicUsize::new(0),
            create_value_calls: AtomicUsize::new(0),
            get_product_calls: AtomicUsize::new(0),
            created_groups: Mutex::new(Vec::new()),
            created_values: Mutex::new(Vec::new()),
            created_combinations: Mutex::new(Vec::new()),
            deleted_combinations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_product_ref(self, product: RemoteProductRef) -> Self {
        self.product_refs.lock().unwrap().insert(product.id, product);
        self
    }

    pub fn with_category(self, category: RemoteCategory) -> Self {
        self.categories.lock().unwrap().insert(category.id, category);
        self
    }

    pub fn with_product(self, product: RemoteProduct) -> Self {
        self.products.lock().unwrap().insert(product.id, product);
        self
    }

    pub fn with_get_products_error(self) -> Self {
        self.get_products_behavior.store(1, Ordering::SeqCst);
        self
    }

    pub fn with_failing_category(self, id: i64) -> Self {
        self.failing_categories.lock().unwrap().push(id);
        self
    }

    pub fn with_create_product_error(self) -> Self {
        self.create_product_behavior.store(1, Ordering::SeqCst);
        self
    }

    pub fn with_update_product_error(self) -> Self {
        self.update_product_behavior.store(1, Ordering::SeqCst);
        self
    }

    pub fn with_update_product_not_found(self) -> Self {
        self.update_product_behavior.store(2, Ordering::SeqCst);
        self
    }

    pub fn with_update_combination_not_found(self) -> Self {
        self.update_combination_behavior.store(2, Ordering::SeqCst);
        self
    }

    pub fn with_delete_combination_not_found(self) -> Self {
        self.delete_combination_behavior.store(2, Ordering::SeqCst);
        self
    }

    pub fn create_product_calls(&self) -> usize {
        self.create_product_calls.load(Ordering::SeqCst)
    }

    pub fn update_product_calls(&self) -> usize {
        self.update_product_calls.load(Ordering::SeqCst)
    }

    pub fn create_group_calls(&self) -> usize {
        self.create_group_calls.load(Ordering::SeqCst)
    }

    pub fn create_value_calls(&self) -> usize {
        self.create_value_calls.load(Ordering::SeqCst)
    }

    pub fn get_product_calls(&self) -> usize {
        self.get_product_calls.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteCatalogClient for MockRemoteClient {
    async fn get_products(&self, filter: &ProductFilter) -> RemoteResult<Vec<RemoteProductRef>> {
        if self.get_products_behavior.load(Ordering::SeqCst) == 1 {
            return Err(RemoteError::transient("product listing unavailable"));
        }
        let refs = self.product_refs.lock().unwrap();
        Ok(filter.ids.iter().filter_map(|id| refs.get(id).cloned()).collect())
    }

    async fn get_category(&self, category_id: i64) -> RemoteResult<RemoteCategory> {
        if self.failing_categories.lock().unwrap().contains(&category_id) {
            return Err(RemoteError::transient("category endpoint unavailable"));
        }
        self.categories
            .lock()
            .unwrap()
            .get(&category_id)
            .cloned()
            .ok_or(RemoteError::NotFound {
                resource: "category",
                id: category_id,
            })
    }

    async fn create_category(&self, _payload: &CategoryPayload) -> RemoteResult<i64> {
        Ok(self.next_id())
    }

    async fn update_category(&self, _category_id: i64, _payload: &CategoryPayload) -> RemoteResult<()> {
        Ok(())
    }

    async fn delete_category(&self, _category_id: i64) -> RemoteResult<()> {
        Ok(())
    }

    async fn get_product(&self, product_id: i64) -> RemoteResult<RemoteProduct> {
        self.get_product_calls.fetch_add(1, Ordering::SeqCst);
        self.products
            .lock()
            .unwrap()
            .get(&product_id)
            .cloned()
            .ok_or(RemoteError::NotFound {
                resource: "product",
                id: product_id,
            })
    }

    async fn create_product(&self, _payload: &ProductPayload) -> RemoteResult<i64> {
        self.create_product_calls.fetch_add(1, Ordering::SeqCst);
        if self.create_product_behavior.load(Ordering::SeqCst) == 1 {
            return Err(RemoteError::transient("remote temporarily unavailable"));
        }
        Ok(self.next_id())
    }

    async fn update_product(&self, product_id: i64, _payload: &ProductPayload) -> RemoteResult<()> {
        self.update_product_calls.fetch_add(1, Ordering::SeqCst);
        match self.update_product_behavior.load(Ordering::SeqCst) {
            1 => Err(RemoteError::transient("remote temporarily unavailable")),
            2 => Err(RemoteError::NotFound {
                resource: "product",
                id: product_id,
            }),
            _ => Ok(()),
        }
    }

    async fn delete_product(&self, _product_id: i64) -> RemoteResult<()> {
        Ok(())
    }

    async fn get_product_prices(&self, _product_id: i64) -> RemoteResult<Value> {
        Err(RemoteError::NotFound {
            resource: "prices",
            id: 0,
        })
    }

    async fn get_product_stock(&self, _product_id: i64) -> RemoteResult<Value> {
        Err(RemoteError::NotFound {
            resource: "stock",
            id: 0,
        })
    }

    async fn create_attribute_group(&self, name: &str) -> RemoteResult<i64> {
        self.create_group_calls.fetch_add(1, Ordering::SeqCst);
        self.created_groups.lock().unwrap().push(name.to_string());
        Ok(self.next_id())
    }

    async fn create_attribute_value(&self, group_id: i64, label: &str) -> RemoteResult<i64> {
        self.create_value_calls.fetch_add(1, Ordering::SeqCst);
        self.created_values.lock().unwrap().push((group_id, label.to_string()));
        Ok(self.next_id())
    }

    async fn create_combination(&self, payload: &CombinationPayload) -> RemoteResult<i64> {
        self.created_combinations.lock().unwrap().push(payload.clone());
        Ok(self.next_id())
    }

    async fn set_combination_attributes(
        &self,
        combination_id: i64,
        _attribute_value_ids: &[i64],
    ) -> RemoteResult<()> {
        if self.update_combination_behavior.load(Ordering::SeqCst) == 2 {
            return Err(RemoteError::NotFound {
                resource: "combination",
                id: combination_id,
            });
        }
        Ok(())
    }

    async fn set_combination_images(&self, _combination_id: i64, _image_ids: &[i64]) -> RemoteResult<()> {
        Ok(())
    }

    async fn delete_combination(&self, combination_id: i64) -> RemoteResult<()> {
        if self.delete_combination_behavior.load(Ordering::SeqCst) == 2 {
            return Err(RemoteError::NotFound {
                resource: "combination",
                id: combination_id,
            });
        }
        self.deleted_combinations.lock().unwrap().push(combination_id);
        Ok(())
    }
}

// =============================================================================
// In-memory local catalog
// =============================================================================

#[derive(Default)]
#[allow(dead_code)]
pub struct InMemoryEntityRepository {
    pub categories: Mutex<HashMap<Uuid, LocalCategory>>,
    pub products: Mutex<HashMap<Uuid, LocalProduct>>,
    pub attribute_types: Mutex<HashMap<Uuid, LocalAttributeType>>,
    pub attribute_values: Mutex<HashMap<Uuid, LocalAttributeValue>>,
    pub variants: Mutex<HashMap<Uuid, LocalVariant>>,
    create_category_calls: AtomicUsize,
    fail_category_creates: AtomicUsize,
}

#[allow(dead_code)]
impl InMemoryEntityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(self, product: LocalProduct) -> Self {
        self.products.lock().unwrap().insert(product.id, product);
        self
    }

    pub fn with_category(self, category: LocalCategory) -> Self {
        self.categories.lock().unwrap().insert(category.id, category);
        self
    }

    pub fn with_attribute_type(self, attribute_type: LocalAttributeType) -> Self {
        self.attribute_types
            .lock()
            .unwrap()
            .insert(attribute_type.id, attribute_type);
        self
    }

    pub fn with_attribute_value(self, value: LocalAttributeValue) -> Self {
        self.attribute_values.lock().unwrap().insert(value.id, value);
        self
    }

    pub fn with_variant(self, variant: LocalVariant) -> Self {
        self.variants.lock().unwrap().insert(variant.id, variant);
        self
    }

    /// Fail the next `count` category creates.
    pub fn with_failing_category_creates(self, count: usize) -> Self {
        self.fail_category_creates.store(count, Ordering::SeqCst);
        self
    }

    pub fn create_category_calls(&self) -> usize {
        self.create_category_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityRepository for InMemoryEntityRepository {
    async fn get_category(&self, category_id: Uuid) -> SyncResult<Option<LocalCategory>> {
        Ok(self.categories.lock().unwrap().get(&category_id).cloned())
    }

    async fn create_category(&self, category: &LocalCategory) -> SyncResult<Uuid> {
        self.create_category_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_category_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_category_creates.store(remaining - 1, Ordering::SeqCst);
            return Err(catalog_sync::error::SyncError::internal("local create failed"));
        }
        self.categories
            .lock()
            .unwrap()
            .insert(category.id, category.clone());
        Ok(category.id)
    }

    async fn delete_category(&self, category_id: Uuid) -> SyncResult<()> {
        self.categories.lock().unwrap().remove(&category_id);
        Ok(())
    }

    async fn existing_category_ids(&self, category_ids: &[Uuid]) -> SyncResult<Vec<Uuid>> {
        let categories = self.categories.lock().unwrap();
        Ok(category_ids
            .iter()
            .copied()
            .filter(|id| categories.contains_key(id))
            .collect())
    }

    async fn get_product(&self, product_id: Uuid) -> SyncResult<Option<LocalProduct>> {
        Ok(self.products.lock().unwrap().get(&product_id).cloned())
    }

    async fn apply_product_fields(&self, product_id: Uuid, fields: &Value) -> SyncResult<()> {
        let mut products = self.products.lock().unwrap();
        if let Some(product) = products.get_mut(&product_id) {
            if let (Some(target), Some(patch)) =
                (product.fields.as_object_mut(), fields.as_object())
            {
                for (key, value) in patch {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    async fn get_attribute_type(&self, type_id: Uuid) -> SyncResult<Option<LocalAttributeType>> {
        Ok(self.attribute_types.lock().unwrap().get(&type_id).cloned())
    }

    async fn get_attribute_value(&self, value_id: Uuid) -> SyncResult<Option<LocalAttributeValue>> {
        Ok(self.attribute_values.lock().unwrap().get(&value_id).cloned())
    }

    async fn get_variant(&self, variant_id: Uuid) -> SyncResult<Option<LocalVariant>> {
        Ok(self.variants.lock().unwrap().get(&variant_id).cloned())
    }
}

// =============================================================================
// In-memory mapping store
// =============================================================================

#[derive(Default)]
#[allow(dead_code)]
pub struct InMemoryMappingStore {
    pub mappings: Mutex<Vec<Mapping>>,
    fail_upserts: AtomicUsize,
}

#[allow(dead_code)]
impl InMemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(self, mapping: Mapping) -> Self {
        self.mappings.lock().unwrap().push(mapping);
        self
    }

    /// Fail the next `count` upserts.
    pub fn with_failing_upserts(self, count: usize) -> Self {
        self.fail_upserts.store(count, Ordering::SeqCst);
        self
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.lock().unwrap().len()
    }
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn upsert(&self, mapping: &Mapping) -> SyncResult<()> {
        let remaining = self.fail_upserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_upserts.store(remaining - 1, Ordering::SeqCst);
            return Err(catalog_sync::error::SyncError::internal("mapping write failed"));
        }
        let mut mappings = self.mappings.lock().unwrap();
        if let Some(existing) = mappings.iter_mut().find(|m| {
            m.shop_id == mapping.shop_id
                && m.entity_type == mapping.entity_type
                && m.local_id == mapping.local_id
        }) {
            existing.remote_id = mapping.remote_id;
            existing.remote_label = mapping.remote_label.clone();
            existing.active = true;
        } else {
            mappings.push(mapping.clone());
        }
        Ok(())
    }

    async fn get_by_local(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        local_id: Uuid,
    ) -> SyncResult<Option<Mapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .find(|m| {
                m.shop_id == shop_id
                    && m.entity_type == entity_type
                    && m.local_id == local_id
                    && m.active
            })
            .cloned())
    }

    async fn get_by_remote(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        remote_id: i64,
    ) -> SyncResult<Option<Mapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .find(|m| {
                m.shop_id == shop_id
                    && m.entity_type == entity_type
                    && m.remote_id == remote_id
                    && m.active
            })
            .cloned())
    }

    async fn get_by_remote_ids(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        remote_ids: &[i64],
    ) -> SyncResult<Vec<Mapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                m.shop_id == shop_id
                    && m.entity_type == entity_type
                    && m.active
                    && remote_ids.contains(&m.remote_id)
            })
            .cloned()
            .collect())
    }

    async fn deactivate(
        &self,
        shop_id: Uuid,
        entity_type: EntityType,
        local_id: Uuid,
    ) -> SyncResult<()> {
        let mut mappings = self.mappings.lock().unwrap();
        for mapping in mappings.iter_mut() {
            if mapping.shop_id == shop_id
                && mapping.entity_type == entity_type
                && mapping.local_id == local_id
            {
                mapping.active = false;
            }
        }
        Ok(())
    }
}

// =============================================================================
// In-memory task records, previews, conflicts
// =============================================================================

#[derive(Default)]
pub struct InMemorySyncTaskRepository {
    pub records: Mutex<HashMap<(Uuid, Uuid), SyncTaskRecord>>,
}

#[allow(dead_code)]
impl InMemorySyncTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entity_id: Uuid, shop_id: Uuid) -> Option<SyncTaskRecord> {
        self.records.lock().unwrap().get(&(entity_id, shop_id)).cloned()
    }
}

#[async_trait]
impl SyncTaskRepository for InMemorySyncTaskRepository {
    async fn get(&self, entity_id: Uuid, shop_id: Uuid) -> SyncResult<Option<SyncTaskRecord>> {
        Ok(self.records.lock().unwrap().get(&(entity_id, shop_id)).cloned())
    }

    async fn upsert(&self, record: &SyncTaskRecord) -> SyncResult<()> {
        self.records
            .lock()
            .unwrap()
            .insert((record.entity_id, record.shop_id), record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPreviewRepository {
    pub previews: Mutex<HashMap<Uuid, CategoryPreview>>,
}

#[allow(dead_code)]
impl InMemoryPreviewRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preview(&self, preview_id: Uuid) -> Option<CategoryPreview> {
        self.previews.lock().unwrap().get(&preview_id).cloned()
    }

    pub fn insert(&self, preview: CategoryPreview) {
        self.previews.lock().unwrap().insert(preview.id, preview);
    }

    fn transition(&self, preview_id: Uuid, to: PreviewStatus) -> bool {
        let mut previews = self.previews.lock().unwrap();
        match previews.get_mut(&preview_id) {
            Some(preview) if preview.status == PreviewStatus::Pending => {
                preview.status = to;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl PreviewRepository for InMemoryPreviewRepository {
    async fn create(&self, preview: &CategoryPreview) -> SyncResult<()> {
        self.previews.lock().unwrap().insert(preview.id, preview.clone());
        Ok(())
    }

    async fn get(&self, preview_id: Uuid) -> SyncResult<Option<CategoryPreview>> {
        Ok(self.previews.lock().unwrap().get(&preview_id).cloned())
    }

    async fn mark_approved(&self, preview_id: Uuid) -> SyncResult<bool> {
        Ok(self.transition(preview_id, PreviewStatus::Approved))
    }

    async fn mark_rejected(&self, preview_id: Uuid) -> SyncResult<bool> {
        Ok(self.transition(preview_id, PreviewStatus::Rejected))
    }

    async fn mark_expired(&self, preview_id: Uuid) -> SyncResult<bool> {
        Ok(self.transition(preview_id, PreviewStatus::Expired))
    }
}

#[derive(Default)]
pub struct InMemoryConflictLogStore {
    pub logs: Mutex<Vec<ConflictLog>>,
}

#[allow(dead_code)]
impl InMemoryConflictLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_count(&self) -> usize {
        self.logs.lock().unwrap().len()
    }
}

#[async_trait]
impl ConflictLogStore for InMemoryConflictLogStore {
    async fn record(&self, log: &ConflictLog) -> SyncResult<()> {
        self.logs.lock().unwrap().push(log.clone());
        Ok(())
    }

    async fn clear(&self, shop_id: Uuid, entity_id: Uuid) -> SyncResult<u64> {
        let mut logs = self.logs.lock().unwrap();
        let before = logs.len();
        logs.retain(|log| !(log.shop_id == shop_id && log.entity_id == entity_id));
        Ok((before - logs.len()) as u64)
    }
}

// =============================================================================
// Recording scheduler and progress sink
// =============================================================================

#[derive(Default)]
pub struct RecordingScheduler {
    pub tasks: Mutex<Vec<QueuedTask>>,
}

#[allow(dead_code)]
impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<QueuedTask> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskScheduler for RecordingScheduler {
    async fn schedule(&self, task: QueuedTask) -> SyncResult<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(key) = &task.unique_key {
            if tasks.iter().any(|t| t.unique_key.as_ref() == Some(key)) {
                return Ok(false);
            }
        }
        tasks.push(task);
        Ok(true)
    }
}

#[derive(Default)]
pub struct RecordingProgressSink {
    pub updates: Mutex<Vec<ProgressUpdate>>,
    pub awaiting: Mutex<Vec<AwaitingUserAction>>,
    pub completed: Mutex<Vec<(Uuid, Value)>>,
    pub failed: Mutex<Vec<(Uuid, String)>>,
}

#[allow(dead_code)]
impl RecordingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self) -> Vec<String> {
        self.updates.lock().unwrap().iter().map(|u| u.phase.clone()).collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingProgressSink {
    async fn report(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }

    async fn awaiting_user(&self, signal: AwaitingUserAction) {
        self.awaiting.lock().unwrap().push(signal);
    }

    async fn completed(&self, job_id: Uuid, summary: Value) {
        self.completed.lock().unwrap().push((job_id, summary));
    }

    async fn failed(&self, job_id: Uuid, error: &str) {
        self.failed.lock().unwrap().push((job_id, error.to_string()));
    }
}
