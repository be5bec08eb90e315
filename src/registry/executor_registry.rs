//! # Executor Registry
//!
//! Lookup table mapping `agent_kind` to its [`TaskExecutor`], populated at
//! startup by the hosting application. Dispatch resolves executors here by
//! name; nothing in the core depends on a concrete executor type.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::orchestration::executor::TaskExecutor;

/// Registry statistics
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total_executors: usize,
    pub agent_kinds: Vec<String>,
}

/// Concurrency-safe `agent_kind` → executor lookup
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: DashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: DashMap::new(),
        }
    }

    /// Register an executor under its agent kind, replacing any prior
    /// registration for the same kind
    pub fn register(&self, executor: Arc<dyn TaskExecutor>) {
        let agent_kind = executor.agent_kind().to_string();
        if self
            .executors
            .insert(agent_kind.clone(), executor)
            .is_some()
        {
            warn!(agent_kind = %agent_kind, "Executor registration replaced");
        } else {
            info!(agent_kind = %agent_kind, "Executor registered");
        }
    }

    /// Resolve the executor for an agent kind
    pub fn resolve(&self, agent_kind: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(agent_kind).map(|entry| entry.clone())
    }

    pub fn contains(&self, agent_kind: &str) -> bool {
        self.executors.contains_key(agent_kind)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let mut agent_kinds: Vec<String> = self
            .executors
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        agent_kinds.sort();
        RegistryStats {
            total_executors: agent_kinds.len(),
            agent_kinds,
        }
    }
}
