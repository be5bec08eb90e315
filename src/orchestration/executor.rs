//! Delegation interface for task execution. The core never knows what an
//! agent actually does — it hands the task to whichever executor is
//! registered for the task's `agent_kind` and takes back an updated task
//! with a terminal status and result/error populated.

use async_trait::async_trait;

use crate::models::{AgentTask, TaskError};

/// A pluggable task body, keyed by agent kind
///
/// Implementations must be idempotent: the queue guarantees at-least-once
/// execution, so a task body may run more than once (timeout races, zombie
/// recovery, process restarts).
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Agent kind this executor serves, used for registry lookup and logging
    fn agent_kind(&self) -> &str;

    /// Run the task body and return the updated task with terminal status
    /// and result/error populated. A returned `Err` is captured on the task
    /// and drives the retry/dead-letter decision.
    async fn execute(&self, task: AgentTask) -> Result<AgentTask, TaskError>;
}
