//! # Task Metrics
//!
//! Pure in-process aggregation: lifecycle counters per task-type and per
//! agent-kind, duration aggregates, and per-(task_type, error-code) failure
//! counts. Updates are lock-free atomic accumulation; [`TaskMetrics::snapshot`]
//! produces a point-in-time view with no cross-field atomicity guarantee —
//! good enough for monitoring, never for decisions.
//!
//! Counters are derived, not authoritative: [`TaskMetrics::reset`] clears
//! them without touching any task data.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::models::AgentTask;

#[derive(Debug, Default)]
struct CounterCell {
    submitted: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

impl CounterCell {
    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct DurationCell {
    min_ms: AtomicU64,
    max_ms: AtomicU64,
    total_ms: AtomicU64,
    count: AtomicU64,
}

impl Default for DurationCell {
    fn default() -> Self {
        Self {
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }
}

impl DurationCell {
    fn record(&self, duration_ms: u64) {
        self.min_ms.fetch_min(duration_ms, Ordering::Relaxed);
        self.max_ms.fetch_max(duration_ms, Ordering::Relaxed);
        self.total_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DurationSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_ms.load(Ordering::Relaxed);
        DurationSnapshot {
            min_ms: if count == 0 {
                0
            } else {
                self.min_ms.load(Ordering::Relaxed)
            },
            max_ms: self.max_ms.load(Ordering::Relaxed),
            avg_ms: if count == 0 {
                0.0
            } else {
                total as f64 / count as f64
            },
            count,
        }
    }
}

/// Point-in-time counter values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub submitted: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
}

/// Point-in-time duration aggregates over finished executions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DurationSnapshot {
    pub min_ms: u64,
    pub max_ms: u64,
    pub avg_ms: f64,
    pub count: u64,
}

/// One (task_type, error_code) failure tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureCount {
    pub task_type: String,
    pub error_code: String,
    pub count: u64,
}

/// Full metrics snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub totals: CounterSnapshot,
    pub by_task_type: HashMap<String, CounterSnapshot>,
    pub by_agent_kind: HashMap<String, CounterSnapshot>,
    pub durations: DurationSnapshot,
    pub failures: Vec<FailureCount>,
}

/// Lock-free lifecycle metrics for the task queue
#[derive(Debug, Default)]
pub struct TaskMetrics {
    totals: CounterCell,
    by_task_type: DashMap<String, CounterCell>,
    by_agent_kind: DashMap<String, CounterCell>,
    durations: DurationCell,
    failures_by_code: DashMap<(String, String), AtomicU64>,
}

impl TaskMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self, task: &AgentTask) {
        self.bump(task, |cell| &cell.submitted);
    }

    pub fn record_started(&self, task: &AgentTask) {
        self.bump(task, |cell| &cell.started);
    }

    pub fn record_completed(&self, task: &AgentTask, duration_ms: Option<u64>) {
        self.bump(task, |cell| &cell.completed);
        if let Some(duration_ms) = duration_ms {
            self.durations.record(duration_ms);
        }
    }

    pub fn record_failed(&self, task: &AgentTask, error_code: &str, duration_ms: Option<u64>) {
        self.bump(task, |cell| &cell.failed);
        if let Some(duration_ms) = duration_ms {
            self.durations.record(duration_ms);
        }
        self.failures_by_code
            .entry((task.task_type.clone(), error_code.to_string()))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self, task: &AgentTask) {
        self.bump(task, |cell| &cell.retried);
    }

    /// Clear every counter; task data is unaffected
    pub fn reset(&self) {
        for field in [
            &self.totals.submitted,
            &self.totals.started,
            &self.totals.completed,
            &self.totals.failed,
            &self.totals.retried,
        ] {
            field.store(0, Ordering::Relaxed);
        }
        self.by_task_type.clear();
        self.by_agent_kind.clear();
        self.failures_by_code.clear();
        self.durations.min_ms.store(u64::MAX, Ordering::Relaxed);
        self.durations.max_ms.store(0, Ordering::Relaxed);
        self.durations.total_ms.store(0, Ordering::Relaxed);
        self.durations.count.store(0, Ordering::Relaxed);
    }

    /// Point-in-time view of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let by_task_type = self
            .by_task_type
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        let by_agent_kind = self
            .by_agent_kind
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        let mut failures: Vec<FailureCount> = self
            .failures_by_code
            .iter()
            .map(|entry| FailureCount {
                task_type: entry.key().0.clone(),
                error_code: entry.key().1.clone(),
                count: entry.value().load(Ordering::Relaxed),
            })
            .collect();
        failures.sort_by(|a, b| {
            (&a.task_type, &a.error_code).cmp(&(&b.task_type, &b.error_code))
        });

        MetricsSnapshot {
            totals: self.totals.snapshot(),
            by_task_type,
            by_agent_kind,
            durations: self.durations.snapshot(),
            failures,
        }
    }

    fn bump<F>(&self, task: &AgentTask, field: F)
    where
        F: Fn(&CounterCell) -> &AtomicU64,
    {
        field(&self.totals).fetch_add(1, Ordering::Relaxed);
        field(
            self.by_task_type
                .entry(task.task_type.clone())
                .or_default()
                .value(),
        )
        .fetch_add(1, Ordering::Relaxed);
        field(
            self.by_agent_kind
                .entry(task.agent_kind.clone())
                .or_default()
                .value(),
        )
        .fetch_add(1, Ordering::Relaxed);
    }
}
