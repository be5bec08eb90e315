//! # Agent Task Model
//!
//! The unit of work flowing through the queue. Each document carries its
//! classification (`task_type`, `agent_kind`), ownership context
//! (`itinerary_id`, `user_id`), scheduling fields, retry state, and the
//! opaque payload/result the executors exchange.
//!
//! Submissions arrive as an [`AgentTaskRequest`] (the task minus generated
//! fields); [`AgentTaskRequest::into_task`] fills in defaults and produces
//! the persistable [`AgentTask`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{bounds, defaults, error_codes};
use crate::state_machine::states::TaskStatus;

/// Structured error captured on a task when execution fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl TaskError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Generic execution failure
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(error_codes::EXECUTION_FAILED, message)
    }

    /// Execution exceeded the task's timeout budget
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(
            error_codes::TIMEOUT,
            format!("Task execution exceeded {timeout_ms}ms"),
        )
    }
}

/// Per-task retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total execution attempts allowed (1-based; bounded by [`bounds::MAX_RETRY_ATTEMPTS`])
    pub max_attempts: u32,
    /// First backoff delay; doubles each attempt
    pub base_delay_ms: u64,
    /// Ceiling applied to the computed backoff delay
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: defaults::DEFAULT_BASE_DELAY_MS,
            max_delay_ms: defaults::DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Clamp the policy to system bounds, reporting each adjustment
    pub fn normalize(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.max_attempts > bounds::MAX_RETRY_ATTEMPTS {
            warnings.push(format!(
                "retry max_attempts {} clamped to {}",
                self.max_attempts,
                bounds::MAX_RETRY_ATTEMPTS
            ));
            self.max_attempts = bounds::MAX_RETRY_ATTEMPTS;
        }
        if self.max_attempts == 0 {
            warnings.push("retry max_attempts 0 raised to 1".to_string());
            self.max_attempts = 1;
        }
        if self.base_delay_ms < bounds::MIN_BASE_DELAY_MS {
            warnings.push(format!(
                "retry base_delay_ms {} raised to {}",
                self.base_delay_ms,
                bounds::MIN_BASE_DELAY_MS
            ));
            self.base_delay_ms = bounds::MIN_BASE_DELAY_MS;
        }
        if self.max_delay_ms > bounds::MAX_BACKOFF_DELAY_MS {
            warnings.push(format!(
                "retry max_delay_ms {} clamped to {}",
                self.max_delay_ms,
                bounds::MAX_BACKOFF_DELAY_MS
            ));
            self.max_delay_ms = bounds::MAX_BACKOFF_DELAY_MS;
        }

        warnings
    }
}

/// A persisted agent task document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub task_type: String,
    pub agent_kind: String,
    pub itinerary_id: String,
    pub user_id: String,
    pub priority: u8,
    pub scheduled_at: DateTime<Utc>,
    pub timeout_ms: u64,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub current_attempt: u32,
    pub retry_config: RetryConfig,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
}

impl AgentTask {
    /// Whether the task is eligible for dispatch at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.scheduled_at <= now
    }

    /// Whether a failed execution still has retry budget left
    pub fn can_retry(&self) -> bool {
        self.current_attempt < self.retry_config.max_attempts
    }

    /// Milliseconds spent executing, when both endpoints are known
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => {
                Some((completed - started).num_milliseconds().max(0) as u64)
            }
            _ => None,
        }
    }

    /// Milliseconds the task has been running as of `now`
    pub fn running_for_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        self.started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64)
    }

    /// Whether a running task has exceeded its timeout budget at `now`
    pub fn timed_out(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Running
            && self
                .running_for_ms(now)
                .is_some_and(|elapsed| elapsed > self.timeout_ms)
    }

    /// Advance retry state: bump the attempt counter and push `scheduled_at`
    /// out by the computed backoff delay. Status/timestamp changes are the
    /// state machine's job (`TaskEvent::Reset`).
    pub fn prepare_retry(&mut self, delay_ms: u64, now: DateTime<Utc>) {
        self.current_attempt += 1;
        self.scheduled_at = now + Duration::milliseconds(delay_ms as i64);
        self.updated_at = now;
    }
}

/// Submission shape for a new agent task
///
/// Required classification and ownership fields are constructor/builder
/// arguments; everything else falls back to system defaults in
/// [`into_task`](Self::into_task).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentTaskRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub task_type: String,
    pub agent_kind: String,
    pub itinerary_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<RetryConfig>,
    #[serde(default)]
    pub payload: Value,
}

impl AgentTaskRequest {
    pub fn new(task_type: impl Into<String>, agent_kind: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            agent_kind: agent_kind.into(),
            ..Self::default()
        }
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn itinerary_id(mut self, itinerary_id: impl Into<String>) -> Self {
        self.itinerary_id = itinerary_id.into();
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = Some(retry_config);
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Materialize the request into a pending task, generating an id when the
    /// caller did not supply one
    pub fn into_task(self) -> AgentTask {
        let now = Utc::now();

        AgentTask {
            task_id: self
                .task_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            idempotency_key: self.idempotency_key,
            task_type: self.task_type,
            agent_kind: self.agent_kind,
            itinerary_id: self.itinerary_id,
            user_id: self.user_id,
            priority: self.priority.unwrap_or(defaults::DEFAULT_PRIORITY),
            scheduled_at: self.scheduled_at.unwrap_or(now),
            timeout_ms: self.timeout_ms.unwrap_or(defaults::DEFAULT_TIMEOUT_MS),
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            current_attempt: 1,
            retry_config: self.retry_config.unwrap_or_default(),
            payload: self.payload,
            result: None,
            error: None,
            cancellation_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_task_defaults() {
        let task = AgentTaskRequest::new("itinerary_research", "places")
            .itinerary_id("it-1")
            .user_id("u-1")
            .into_task();

        assert!(!task.task_id.is_empty());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, defaults::DEFAULT_PRIORITY);
        assert_eq!(task.timeout_ms, defaults::DEFAULT_TIMEOUT_MS);
        assert_eq!(task.current_attempt, 1);
        assert!(task.started_at.is_none());
        assert!(task.is_due(Utc::now()));
    }

    #[test]
    fn test_scheduled_at_is_honored() {
        let later = Utc::now() + Duration::minutes(10);
        let task = AgentTaskRequest::new("booking", "booking")
            .itinerary_id("it-1")
            .user_id("u-1")
            .scheduled_at(later)
            .into_task();

        assert!(!task.is_due(Utc::now()));
        assert!(task.is_due(later + Duration::seconds(1)));
    }

    #[test]
    fn test_retry_budget() {
        let mut task = AgentTaskRequest::new("booking", "booking")
            .itinerary_id("it-1")
            .user_id("u-1")
            .retry_config(RetryConfig {
                max_attempts: 2,
                ..RetryConfig::default()
            })
            .into_task();

        assert!(task.can_retry());
        let now = Utc::now();
        task.prepare_retry(500, now);
        assert_eq!(task.current_attempt, 2);
        assert!(task.scheduled_at > now);
        assert!(!task.can_retry());
    }

    #[test]
    fn test_retry_config_normalize_clamps() {
        let mut config = RetryConfig {
            max_attempts: 50,
            base_delay_ms: 10,
            max_delay_ms: 86_400_000,
        };
        let warnings = config.normalize();

        assert_eq!(config.max_attempts, bounds::MAX_RETRY_ATTEMPTS);
        assert_eq!(config.base_delay_ms, bounds::MIN_BASE_DELAY_MS);
        assert_eq!(config.max_delay_ms, bounds::MAX_BACKOFF_DELAY_MS);
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn test_timed_out() {
        let mut task = AgentTaskRequest::new("payment", "payment")
            .itinerary_id("it-1")
            .user_id("u-1")
            .timeout_ms(1_000)
            .into_task();
        let now = Utc::now();

        task.status = TaskStatus::Running;
        task.started_at = Some(now - Duration::milliseconds(1_500));
        assert!(task.timed_out(now));

        task.started_at = Some(now - Duration::milliseconds(500));
        assert!(!task.timed_out(now));
    }

    #[test]
    fn test_task_serde_round_trip() {
        let task = AgentTaskRequest::new("itinerary_research", "places")
            .itinerary_id("it-1")
            .user_id("u-1")
            .payload(serde_json::json!({"city": "Lisbon"}))
            .into_task();

        let json = serde_json::to_string(&task).unwrap();
        let parsed: AgentTask = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, task);
    }
}
