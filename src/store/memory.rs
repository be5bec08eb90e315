//! # In-memory Store Implementations
//!
//! Concurrency-safe reference implementations of the store contracts, used
//! by tests and embedded deployments. `MemoryTaskStore` serves every query
//! shape by scanning its document map; `without_compound_indexes()` builds a
//! store that rejects compound queries the way an index-poor document store
//! would, which is how the dispatcher's degraded polling path is exercised.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::{
    DeadLetterStore, IdempotencyStore, StoreError, StoreResult, TaskQuery, TaskStore,
};
use crate::models::{AgentTask, IdempotencyRecord};
use crate::state_machine::TaskStatus;

const PENDING_FEED_CAPACITY: usize = 256;

/// DashMap-backed task document store with a broadcast change feed
pub struct MemoryTaskStore {
    documents: DashMap<String, AgentTask>,
    pending_feed: broadcast::Sender<AgentTask>,
    compound_indexes: bool,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        let (pending_feed, _) = broadcast::channel(PENDING_FEED_CAPACITY);
        Self {
            documents: DashMap::new(),
            pending_feed,
            compound_indexes: true,
        }
    }

    /// A store that refuses compound queries with `IndexUnavailable`,
    /// mimicking a backend missing its secondary indexes
    pub fn without_compound_indexes() -> Self {
        Self {
            compound_indexes: false,
            ..Self::new()
        }
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(&self, task: &AgentTask) -> StoreResult<()> {
        self.documents.insert(task.task_id.clone(), task.clone());

        // Feed subscribers only care about dispatchable work
        if task.status == TaskStatus::Pending {
            // send() fails only when nobody is subscribed
            let _ = self.pending_feed.send(task.clone());
        }

        Ok(())
    }

    async fn get(&self, task_id: &str) -> StoreResult<Option<AgentTask>> {
        Ok(self.documents.get(task_id).map(|entry| entry.clone()))
    }

    async fn query(&self, query: &TaskQuery) -> StoreResult<Vec<AgentTask>> {
        if !self.compound_indexes && query.is_compound() {
            return Err(StoreError::IndexUnavailable {
                description: format!(
                    "compound query over {} predicates and {} ordering keys",
                    query.predicates.len(),
                    query.order_by.len()
                ),
            });
        }

        let mut results: Vec<AgentTask> = self
            .documents
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        query.sort(&mut results);

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        debug!(results = results.len(), "memory store query served");
        Ok(results)
    }

    async fn delete(&self, task_id: &str) -> StoreResult<()> {
        self.documents.remove(task_id);
        Ok(())
    }

    fn watch_pending(&self) -> Option<broadcast::Receiver<AgentTask>> {
        Some(self.pending_feed.subscribe())
    }
}

/// Dead-letter storage backed by a DashMap
///
/// The read accessors exist for operational tooling and tests; the core
/// itself only writes here.
pub struct MemoryDeadLetterStore {
    documents: DashMap<String, AgentTask>,
}

impl MemoryDeadLetterStore {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, task_id: &str) -> Option<AgentTask> {
        self.documents.get(task_id).map(|entry| entry.clone())
    }
}

impl Default for MemoryDeadLetterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetterStore {
    async fn save(&self, task: &AgentTask) -> StoreResult<()> {
        self.documents.insert(task.task_id.clone(), task.clone());
        Ok(())
    }
}

/// Idempotency record storage backed by a DashMap
pub struct MemoryIdempotencyStore {
    records: DashMap<String, IdempotencyRecord>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn put(&self, record: &IdempotencyRecord) -> StoreResult<()> {
        self.records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>> {
        Ok(self.records.get(key).map(|entry| entry.clone()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.records.remove(key);
        Ok(())
    }

    async fn expired_keys(&self, now: DateTime<Utc>) -> StoreResult<Vec<String>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect())
    }
}
