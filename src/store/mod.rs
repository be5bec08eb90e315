//! # Durable Store Contracts
//!
//! The queue treats persistence as a pluggable collaborator. Three seams:
//!
//! - [`TaskStore`]: the primary document store, keyed by task id, queryable
//!   by status/priority/time with an optional change feed of newly persisted
//!   pending tasks.
//! - [`DeadLetterStore`]: terminal-failure storage, write-only from the core.
//! - [`IdempotencyStore`]: key/record storage backing the idempotency ledger.
//!
//! Queries are expressed as typed predicates rather than strings so a backing
//! store can translate them to its own index structure. A store that cannot
//! serve a compound query (multiple predicates, or predicate plus ordering)
//! signals [`StoreError::IndexUnavailable`] and the caller falls back to a
//! single-predicate scan with in-memory filtering.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::{AgentTask, IdempotencyRecord};
use crate::state_machine::TaskStatus;

pub use memory::{MemoryDeadLetterStore, MemoryIdempotencyStore, MemoryTaskStore};

/// Errors surfaced by store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("Write failed: {operation}: {message}")]
    WriteFailed { operation: String, message: String },

    #[error("Missing index for query: {description}")]
    IndexUnavailable { description: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Sort direction for a query ordering key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Task fields a query may order by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskField {
    Priority,
    ScheduledAt,
    CreatedAt,
    UpdatedAt,
    StartedAt,
    CompletedAt,
}

/// Typed query predicates (equality, range, and set membership)
#[derive(Debug, Clone)]
pub enum Predicate {
    StatusEq(TaskStatus),
    StatusIn(Vec<TaskStatus>),
    ItineraryEq(String),
    PriorityAtLeast(u8),
    ScheduledBefore(DateTime<Utc>),
    StartedBefore(DateTime<Utc>),
    UpdatedBefore(DateTime<Utc>),
    CompletedBefore(DateTime<Utc>),
}

impl Predicate {
    /// Evaluate the predicate against a task document
    pub fn matches(&self, task: &AgentTask) -> bool {
        match self {
            Predicate::StatusEq(status) => task.status == *status,
            Predicate::StatusIn(statuses) => statuses.contains(&task.status),
            Predicate::ItineraryEq(itinerary_id) => task.itinerary_id == *itinerary_id,
            Predicate::PriorityAtLeast(priority) => task.priority >= *priority,
            Predicate::ScheduledBefore(cutoff) => task.scheduled_at <= *cutoff,
            Predicate::StartedBefore(cutoff) => {
                task.started_at.is_some_and(|started| started < *cutoff)
            }
            Predicate::UpdatedBefore(cutoff) => task.updated_at < *cutoff,
            Predicate::CompletedBefore(cutoff) => {
                task.completed_at.is_some_and(|completed| completed < *cutoff)
            }
        }
    }
}

/// A composable task query: predicates, ordering keys, and a result cap
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<(TaskField, SortOrder)>,
    pub limit: Option<usize>,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.predicates.push(Predicate::StatusEq(status));
        self
    }

    pub fn status_in(mut self, statuses: &[TaskStatus]) -> Self {
        self.predicates.push(Predicate::StatusIn(statuses.to_vec()));
        self
    }

    pub fn itinerary(mut self, itinerary_id: impl Into<String>) -> Self {
        self.predicates
            .push(Predicate::ItineraryEq(itinerary_id.into()));
        self
    }

    pub fn scheduled_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.predicates.push(Predicate::ScheduledBefore(cutoff));
        self
    }

    pub fn started_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.predicates.push(Predicate::StartedBefore(cutoff));
        self
    }

    pub fn updated_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.predicates.push(Predicate::UpdatedBefore(cutoff));
        self
    }

    pub fn order_by(mut self, field: TaskField, order: SortOrder) -> Self {
        self.order_by.push((field, order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether serving this query requires a compound secondary index
    pub fn is_compound(&self) -> bool {
        self.predicates.len() > 1
            || (!self.predicates.is_empty() && !self.order_by.is_empty())
    }

    /// Evaluate every predicate against a task
    pub fn matches(&self, task: &AgentTask) -> bool {
        self.predicates.iter().all(|predicate| predicate.matches(task))
    }

    /// Apply the ordering keys to a result set in memory
    pub fn sort(&self, tasks: &mut [AgentTask]) {
        if self.order_by.is_empty() {
            return;
        }
        tasks.sort_by(|a, b| self.compare(a, b));
    }

    fn compare(&self, a: &AgentTask, b: &AgentTask) -> Ordering {
        for (field, order) in &self.order_by {
            let ordering = match field {
                TaskField::Priority => a.priority.cmp(&b.priority),
                TaskField::ScheduledAt => a.scheduled_at.cmp(&b.scheduled_at),
                TaskField::CreatedAt => a.created_at.cmp(&b.created_at),
                TaskField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                TaskField::StartedAt => a.started_at.cmp(&b.started_at),
                TaskField::CompletedAt => a.completed_at.cmp(&b.completed_at),
            };
            let ordering = match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Primary durable store for task documents
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist (insert or overwrite) a task document
    async fn save(&self, task: &AgentTask) -> StoreResult<()>;

    /// Fetch a task by id
    async fn get(&self, task_id: &str) -> StoreResult<Option<AgentTask>>;

    /// Run a predicate query
    async fn query(&self, query: &TaskQuery) -> StoreResult<Vec<AgentTask>>;

    /// Remove a task document; removing an absent id is not an error
    async fn delete(&self, task_id: &str) -> StoreResult<()>;

    /// Change feed of newly persisted pending tasks, when the backend
    /// supports one; `None` forces the caller onto the polling path
    fn watch_pending(&self) -> Option<broadcast::Receiver<AgentTask>>;
}

/// Terminal-failure storage; write-only from the core's perspective
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn save(&self, task: &AgentTask) -> StoreResult<()>;
}

/// Record storage backing the idempotency ledger
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn put(&self, record: &IdempotencyRecord) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Keys of all records expired as of `now`
    async fn expired_keys(&self, now: DateTime<Utc>) -> StoreResult<Vec<String>>;
}
