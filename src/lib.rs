//! # Catalog Sync Engine
//!
//! Synchronization between a local product catalog and external shop
//! platforms.
//!
//! This crate provides the infrastructure for:
//! - Category dependency resolution with a human approval gate
//! - Hierarchical category creation with per-node failure isolation
//! - Push and pull product synchronization with conflict resolution
//! - Attribute and variant synchronization with remote auto-creation
//! - Batch orchestration over independent sync tasks
//! - A durable task queue with retries, backoff, and dead-lettering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌───────────────┐
//! │  Batch / API │────►│   Queue      │────►│   Processor   │
//! └──────────────┘     └──────────────┘     └───────┬───────┘
//!                                                   │
//!              ┌───────────────┬────────────────────┼─────────────┐
//!              ▼               ▼                    ▼             ▼
//!        ┌──────────┐   ┌───────────┐        ┌───────────┐  ┌──────────┐
//!        │ Resolver │──►│ Approval  │───────►│  Creator  │  │ Push/Pull│
//!        │          │   │  (human)  │        │           │  │ Variants │
//!        └──────────┘   └───────────┘        └───────────┘  └──────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use catalog_sync::{QueuedTask, SyncQueue, TaskKind};
//!
//! // Enqueue a resolution run for a set of remote products
//! let task = QueuedTask::new(
//!     shop_id,
//!     None,
//!     TaskKind::ResolveCategories,
//!     serde_json::json!({
//!         "job_id": job_id,
//!         "remote_product_ids": [101, 102, 103],
//!         "import_context": { "product_ids": [] },
//!     }),
//! );
//! queue.enqueue(&task).await?;
//!
//! // The worker picks it up and stores a preview for approval
//! worker.run().await;
//! ```

pub mod batch;
pub mod config;
pub mod creator;
pub mod error;
pub mod mapping;
pub mod preview;
pub mod processor;
pub mod progress;
pub mod pull;
pub mod push;
pub mod queue;
pub mod remote;
pub mod repository;
pub mod resolver;
pub mod status;
pub mod types;
pub mod variant;
pub mod worker;

// Re-exports for convenience
pub use batch::{
    BatchHooks, BatchItem, BatchOrchestrator, BatchOutcome, BatchProgress, BatchTracker, NoHooks,
};
pub use config::SyncConfig;
pub use creator::{CreationReport, HierarchicalEntityCreator, NodeOutcome};
pub use error::{SyncError, SyncResult};
pub use mapping::{Mapping, MappingStore, PgMappingStore};
pub use preview::{
    ApprovalWorkflow, CategoryNode, CategoryPreview, CategoryTree, PgPreviewRepository,
    PreviewRepository,
};
pub use processor::SyncProcessor;
pub use progress::{AwaitingUserAction, NullProgressSink, ProgressSink, ProgressUpdate};
pub use pull::{
    diff_fields, ConflictLog, ConflictLogStore, FieldDiff, PgConflictLogStore, PullOutcome,
    PullSynchronizer,
};
pub use push::{payload_checksum, PushOutcome, PushSynchronizer};
pub use queue::{QueuedTask, SyncQueue, TaskKind, TaskScheduler};
pub use remote::{
    CategoryPayload, CombinationPayload, ProductFilter, ProductPayload, RemoteCatalogClient,
    RemoteCategory, RemoteCombination, RemoteError, RemoteProduct, RemoteProductRef, RemoteResult,
};
pub use repository::{
    EntityRepository, LocalAttributeType, LocalAttributeValue, LocalCategory, LocalProduct,
    LocalVariant,
};
pub use resolver::CategoryDependencyResolver;
pub use status::{PgSyncTaskRepository, SyncTaskRecord, SyncTaskRepository};
pub use types::{
    ChangeKind, ConflictPolicy, EntityType, PreviewStatus, SyncStatus, TaskPriority, VariantOp,
};
pub use variant::{VariantOutcome, VariantSynchronizer};
pub use worker::{SyncWorker, TaskHandler, WorkerConfig};
