//! Engine configuration.

use std::time::Duration;

use crate::queue::TaskKind;

/// Tunables for the synchronization engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum automatic retry attempts for a push task.
    pub max_retries: i32,

    /// Backoff delays applied after the 1st, 2nd, ... failed attempt.
    /// Attempts beyond the schedule reuse the last entry.
    pub retry_backoff: Vec<Duration>,

    /// Lease held by a worker on an in-flight (entity, shop) sync.
    /// A crashed worker's lease expires and the task becomes claimable again.
    pub sync_lease: Duration,

    /// How long a pending category preview waits for user action.
    pub preview_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(300),
            ],
            sync_lease: Duration::from_secs(3600),
            preview_ttl: Duration::from_secs(15 * 60),
        }
    }
}

impl SyncConfig {
    /// Backoff delay before the given retry (1-based attempt that failed).
    #[must_use]
    pub fn backoff_for_attempt(&self, attempt: i32) -> Duration {
        if self.retry_backoff.is_empty() {
            return Duration::from_secs(30);
        }
        let idx = usize::try_from(attempt.max(1) - 1).unwrap_or(0);
        self.retry_backoff[idx.min(self.retry_backoff.len() - 1)]
    }

    /// Wall-clock timeout for one execution of the given task kind.
    /// The runtime kills and reschedules a task that overruns it.
    #[must_use]
    pub fn task_timeout(&self, kind: TaskKind) -> Duration {
        match kind {
            TaskKind::ResolveCategories => Duration::from_secs(10 * 60),
            TaskKind::CreateCategories => Duration::from_secs(15 * 60),
            TaskKind::PushEntity => Duration::from_secs(5 * 60),
            TaskKind::PullEntity => Duration::from_secs(5 * 60),
            TaskKind::SyncVariants => Duration::from_secs(10 * 60),
            TaskKind::ExpirePreview => Duration::from_secs(3 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let config = SyncConfig::default();
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(30));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(60));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_secs(300));
        // Past the schedule the last entry sticks.
        assert_eq!(config.backoff_for_attempt(7), Duration::from_secs(300));
        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(30));
    }

    #[test]
    fn test_task_timeouts_within_declared_range() {
        let config = SyncConfig::default();
        for kind in [
            TaskKind::ResolveCategories,
            TaskKind::CreateCategories,
            TaskKind::PushEntity,
            TaskKind::PullEntity,
            TaskKind::SyncVariants,
            TaskKind::ExpirePreview,
        ] {
            let t = config.task_timeout(kind);
            assert!(t >= Duration::from_secs(3 * 60));
            assert!(t <= Duration::from_secs(15 * 60));
        }
    }
}
