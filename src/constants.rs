//! # System Constants
//!
//! Operational boundaries and defaults for the agent task queue. Values here
//! are the hard system limits; the tunable runtime knobs live in
//! [`crate::config::WayfareConfig`].

use crate::state_machine::TaskStatus;

/// Hard bounds enforced (by clamping or rejection) at the submission boundary
pub mod bounds {
    pub const MIN_PRIORITY: u8 = 1;
    pub const MAX_PRIORITY: u8 = 10;

    pub const MIN_TIMEOUT_MS: u64 = 1_000;
    pub const MAX_TIMEOUT_MS: u64 = 3_600_000;

    pub const MAX_RETRY_ATTEMPTS: u32 = 10;
    pub const MIN_BASE_DELAY_MS: u64 = 100;
    pub const MAX_BACKOFF_DELAY_MS: u64 = 3_600_000;

    pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;
}

/// Defaults applied when a submission omits optional fields
pub mod defaults {
    pub const DEFAULT_PRIORITY: u8 = 5;
    pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
    pub const DEFAULT_MAX_DELAY_MS: u64 = 300_000;
}

/// Error codes captured on failed tasks
pub mod error_codes {
    /// Execution exceeded the task's timeout budget
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Executor returned or raised a failure
    pub const EXECUTION_FAILED: &str = "EXECUTION_FAILED";
    /// No executor registered for the task's agent kind
    pub const EXECUTOR_NOT_FOUND: &str = "EXECUTOR_NOT_FOUND";
    /// Executor returned a task that was not in a terminal state
    pub const INVALID_EXECUTOR_RESULT: &str = "INVALID_EXECUTOR_RESULT";
}

/// System-level operational defaults (overridable via [`crate::config`])
pub mod system {
    pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 10;
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
    pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 30_000;
    pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 300_000;
    pub const DEFAULT_IDEMPOTENCY_SWEEP_INTERVAL_MS: u64 = 3_600_000;

    pub const DEFAULT_RETENTION_HOURS: i64 = 24;
    pub const DEFAULT_IDEMPOTENCY_TTL_HOURS: i64 = 24;

    /// A running task whose document has not been touched for this long is
    /// reported as a health signal
    pub const DEFAULT_STALE_RUNNING_MS: u64 = 600_000;
    /// A running task started this long ago is presumed orphaned and reset
    pub const DEFAULT_ZOMBIE_RUNNING_MS: u64 = 1_800_000;

    pub const DEFAULT_MONITOR_GRACE_MS: u64 = 60_000;
    pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 30_000;
}

/// Status groupings used by queries and cleanup
pub mod status_groups {
    use super::TaskStatus;

    /// States with no further transitions
    pub const TERMINAL: &[TaskStatus] = &[TaskStatus::Completed, TaskStatus::Cancelled];

    /// States eligible for retention cleanup
    pub const CLEANUP_ELIGIBLE: &[TaskStatus] =
        &[TaskStatus::Completed, TaskStatus::Cancelled];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_consistent() {
        assert!(bounds::MIN_PRIORITY < bounds::MAX_PRIORITY);
        assert!(bounds::MIN_TIMEOUT_MS < bounds::MAX_TIMEOUT_MS);
        assert!(defaults::DEFAULT_TIMEOUT_MS >= bounds::MIN_TIMEOUT_MS);
        assert!(defaults::DEFAULT_TIMEOUT_MS <= bounds::MAX_TIMEOUT_MS);
        assert!(defaults::DEFAULT_MAX_ATTEMPTS <= bounds::MAX_RETRY_ATTEMPTS);
    }

    #[test]
    fn test_cleanup_group_is_terminal_only() {
        for status in status_groups::CLEANUP_ELIGIBLE {
            assert!(status.is_terminal());
        }
    }
}
