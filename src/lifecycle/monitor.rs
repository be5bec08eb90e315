//! In-memory monitors for locally dispatched tasks. Each process monitors
//! only the work it owns; cross-process recovery goes through the durable
//! store, not this registry.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::models::AgentTask;

/// Ephemeral record of one running task's timeout budget
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMonitor {
    pub task_id: String,
    pub timeout_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl TaskMonitor {
    /// A monitor expires once timeout plus grace has elapsed without a
    /// completion being observed
    pub fn is_expired(&self, now: DateTime<Utc>, grace_ms: u64) -> bool {
        let deadline = self.started_at
            + Duration::milliseconds(self.timeout_ms as i64)
            + Duration::milliseconds(grace_ms as i64);
        now > deadline
    }
}

/// Concurrency-safe registry of active task monitors
pub struct MonitorRegistry {
    monitors: DashMap<String, TaskMonitor>,
    grace_ms: u64,
}

impl MonitorRegistry {
    pub fn new(grace_ms: u64) -> Self {
        Self {
            monitors: DashMap::new(),
            grace_ms,
        }
    }

    pub fn register(&self, task: &AgentTask) {
        let monitor = TaskMonitor {
            task_id: task.task_id.clone(),
            timeout_ms: task.timeout_ms,
            started_at: task.started_at.unwrap_or_else(Utc::now),
        };
        debug!(task_id = %task.task_id, timeout_ms = task.timeout_ms, "Monitor registered");
        self.monitors.insert(task.task_id.clone(), monitor);
    }

    pub fn remove(&self, task_id: &str) -> Option<TaskMonitor> {
        self.monitors.remove(task_id).map(|(_, monitor)| monitor)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.monitors.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Drop monitors whose timeout plus grace elapsed without a completion,
    /// returning the evicted task ids
    pub fn evict_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .monitors
            .iter()
            .filter(|entry| entry.value().is_expired(now, self.grace_ms))
            .map(|entry| entry.key().clone())
            .collect();

        for task_id in &expired {
            self.monitors.remove(task_id);
            debug!(task_id = %task_id, "Expired monitor evicted");
        }
        expired
    }
}
