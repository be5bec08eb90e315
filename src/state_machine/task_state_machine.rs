//! # Task State Machine
//!
//! Transition table and mutation rules for the agent task lifecycle:
//!
//! ```text
//! pending --start--> running --complete--> completed
//!    |                  |
//!    |                  +--fail--> failed --reset--> pending   (retry)
//!    |                  +--reset--> pending                     (zombie / startup recovery)
//!    +--cancel--> cancelled
//! ```
//!
//! The durable store holds the current status on the task document itself;
//! this module owns the legality of transitions and the timestamp invariants
//! that ride along with them (`started_at` set only on the transition to
//! running and cleared on reset, `completed_at` set on terminal states).

use super::errors::{StateMachineError, StateMachineResult};
use super::events::TaskEvent;
use super::states::TaskStatus;
use crate::models::task::{AgentTask, TaskError};
use chrono::{DateTime, Utc};

/// Stateless transition evaluator for agent tasks
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Determine the target state for an event, or reject the transition
    pub fn target_state(
        current: TaskStatus,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskStatus> {
        let target = match (current, event) {
            // Dispatch
            (TaskStatus::Pending, TaskEvent::Start) => TaskStatus::Running,

            // Completion
            (TaskStatus::Running, TaskEvent::Complete) => TaskStatus::Completed,

            // Failure
            (TaskStatus::Running, TaskEvent::Fail(_)) => TaskStatus::Failed,
            (TaskStatus::Pending, TaskEvent::Fail(_)) => TaskStatus::Failed,

            // Cancellation is only legal while still pending
            (TaskStatus::Pending, TaskEvent::Cancel) => TaskStatus::Cancelled,

            // Reset paths: retry scheduling and zombie/startup recovery
            (TaskStatus::Failed, TaskEvent::Reset) => TaskStatus::Pending,
            (TaskStatus::Running, TaskEvent::Reset) => TaskStatus::Pending,

            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Apply an event to a task, enforcing the timestamp invariants
    ///
    /// On `Fail`, the event's message is captured as the task error only when
    /// the caller has not already attached a structured error.
    pub fn apply(
        task: &mut AgentTask,
        event: TaskEvent,
        now: DateTime<Utc>,
    ) -> StateMachineResult<TaskStatus> {
        let target = Self::target_state(task.status, &event)?;

        match target {
            TaskStatus::Running => {
                task.started_at = Some(now);
            }
            TaskStatus::Pending => {
                // Reset: the next dispatch owns a fresh started_at
                task.started_at = None;
                task.completed_at = None;
            }
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                task.completed_at = Some(now);
            }
        }

        if let TaskEvent::Fail(message) = &event {
            if task.error.is_none() {
                task.error = Some(TaskError::execution(message.clone()));
            }
        }

        task.status = target;
        task.updated_at = now;

        Ok(target)
    }
}
