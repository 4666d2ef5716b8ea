//! Progress and notification reporting.
//!
//! Sync jobs report phase and percentage through a sink consumed by an
//! external tracker such as UI polling or websockets. The
//! sink also carries the "awaiting user action" signal with a
//! machine-actionable payload such as a preview id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One progress report for a batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Job being reported on.
    pub job_id: Uuid,
    /// 0–100.
    pub percent: u8,
    /// Machine-readable phase, e.g. `checking_existing`.
    pub phase: String,
    /// Human-readable phase label.
    pub phase_label: String,
}

impl ProgressUpdate {
    /// Create an update, clamping the percentage.
    #[must_use]
    pub fn new(job_id: Uuid, percent: u8, phase: &str, phase_label: &str) -> Self {
        Self {
            job_id,
            percent: percent.min(100),
            phase: phase.to_string(),
            phase_label: phase_label.to_string(),
        }
    }
}

/// Signal that a job is paused on a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwaitingUserAction {
    /// Job being paused.
    pub job_id: Uuid,
    /// Action the UI should offer, e.g. `open_category_preview`.
    pub action: String,
    /// Machine-actionable payload (preview id, shop id).
    pub payload: Value,
    /// Message shown to the user.
    pub message: String,
}

/// Consumer of job progress. Implementations must tolerate duplicate and
/// out-of-order reports; reporting failures never fail the job itself.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Report phase/percentage progress.
    async fn report(&self, update: ProgressUpdate);

    /// Report that the job is waiting on a user decision.
    async fn awaiting_user(&self, signal: AwaitingUserAction);

    /// Report terminal success with a summary payload.
    async fn completed(&self, job_id: Uuid, summary: Value);

    /// Report terminal failure with the persisted error.
    async fn failed(&self, job_id: Uuid, error: &str);
}

/// Sink that drops everything. Used where no tracker is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn report(&self, _update: ProgressUpdate) {}
    async fn awaiting_user(&self, _signal: AwaitingUserAction) {}
    async fn completed(&self, _job_id: Uuid, _summary: Value) {}
    async fn failed(&self, _job_id: Uuid, _error: &str) {}
}
