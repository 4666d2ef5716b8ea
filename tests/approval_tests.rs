//! Approval gate scenarios: single-shot decisions, expiration, and the
//! chain from approval into category creation.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use catalog_sync::error::SyncError;
use catalog_sync::preview::{ApprovalWorkflow, CategoryNode, CategoryPreview, CategoryTree};
use catalog_sync::queue::TaskKind;
use catalog_sync::types::PreviewStatus;

use common::{InMemoryPreviewRepository, RecordingScheduler};

fn tree_with_one_node() -> CategoryTree {
    CategoryTree {
        roots: vec![CategoryNode {
            remote_id: 11,
            parent_remote_id: None,
            depth: 2,
            name: "Chairs".to_string(),
            children: Vec::new(),
            active: true,
        }],
    }
}

fn pending_preview(tree: CategoryTree, expires_in: Duration) -> CategoryPreview {
    CategoryPreview::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        tree,
        json!({"product_ids": []}),
        Utc::now() + expires_in,
    )
}

fn workflow() -> (Arc<InMemoryPreviewRepository>, Arc<RecordingScheduler>, ApprovalWorkflow) {
    let previews = Arc::new(InMemoryPreviewRepository::new());
    let scheduler = Arc::new(RecordingScheduler::new());
    let workflow = ApprovalWorkflow::new(previews.clone(), scheduler.clone());
    (previews, scheduler, workflow)
}

#[tokio::test]
async fn test_approve_dispatches_category_creation() {
    let (previews, scheduler, workflow) = workflow();
    let preview = pending_preview(tree_with_one_node(), Duration::minutes(15));
    previews.insert(preview.clone());

    workflow.approve(preview.id, None).await.unwrap();

    assert_eq!(previews.preview(preview.id).unwrap().status, PreviewStatus::Approved);
    let scheduled = scheduler.scheduled();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].kind, TaskKind::CreateCategories);
    assert_eq!(scheduled[0].payload["preview_id"], json!(preview.id));
}

#[tokio::test]
async fn test_approve_is_single_shot() {
    let (previews, scheduler, workflow) = workflow();
    let preview = pending_preview(tree_with_one_node(), Duration::minutes(15));
    previews.insert(preview.clone());

    workflow.approve(preview.id, None).await.unwrap();
    let second = workflow.approve(preview.id, None).await;

    assert!(matches!(second, Err(SyncError::PreviewNotPending { .. })));
    assert_eq!(scheduler.scheduled().len(), 1, "no second dispatch");
}

#[tokio::test]
async fn test_approve_after_deadline_expires_preview() {
    let (previews, scheduler, workflow) = workflow();
    let preview = pending_preview(tree_with_one_node(), Duration::minutes(-1));
    previews.insert(preview.clone());

    let result = workflow.approve(preview.id, None).await;

    assert!(matches!(result, Err(SyncError::PreviewExpired { .. })));
    assert_eq!(previews.preview(preview.id).unwrap().status, PreviewStatus::Expired);
    assert!(scheduler.scheduled().is_empty(), "expired approval has no side effects");
}

#[tokio::test]
async fn test_empty_tree_approval_resumes_import_directly() {
    let (previews, scheduler, workflow) = workflow();
    let preview = pending_preview(CategoryTree::default(), Duration::minutes(15));
    previews.insert(preview.clone());

    workflow.approve(preview.id, None).await.unwrap();

    let scheduled = scheduler.scheduled();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].kind, TaskKind::PushEntity);
    assert_eq!(scheduled[0].payload["categories_present"], json!(true));
}

#[tokio::test]
async fn test_reject_blocks_later_approval() {
    let (previews, scheduler, workflow) = workflow();
    let preview = pending_preview(tree_with_one_node(), Duration::minutes(15));
    previews.insert(preview.clone());

    workflow.reject(preview.id).await.unwrap();
    let approve = workflow.approve(preview.id, None).await;

    assert_eq!(previews.preview(preview.id).unwrap().status, PreviewStatus::Rejected);
    assert!(matches!(approve, Err(SyncError::PreviewNotPending { .. })));
    assert!(scheduler.scheduled().is_empty());
}

#[tokio::test]
async fn test_expire_is_idempotent() {
    let (previews, _scheduler, workflow) = workflow();
    let preview = pending_preview(tree_with_one_node(), Duration::minutes(15));
    previews.insert(preview.clone());

    workflow.expire(preview.id).await.unwrap();
    // A second sweep and a sweep of an unknown preview are no-ops.
    workflow.expire(preview.id).await.unwrap();
    workflow.expire(Uuid::new_v4()).await.unwrap();

    assert_eq!(previews.preview(preview.id).unwrap().status, PreviewStatus::Expired);
}

#[tokio::test]
async fn test_expire_does_not_touch_decided_preview() {
    let (previews, _scheduler, workflow) = workflow();
    let preview = pending_preview(tree_with_one_node(), Duration::minutes(15));
    previews.insert(preview.clone());

    workflow.approve(preview.id, None).await.unwrap();
    workflow.expire(preview.id).await.unwrap();

    assert_eq!(previews.preview(preview.id).unwrap().status, PreviewStatus::Approved);
}

#[tokio::test]
async fn test_approve_unknown_preview_fails() {
    let (_previews, _scheduler, workflow) = workflow();
    let result = workflow.approve(Uuid::new_v4(), None).await;
    assert!(matches!(result, Err(SyncError::EntityNotFound { .. })));
}
