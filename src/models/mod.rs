// Data models for the agent task queue

pub mod idempotency_record;
pub mod task;

pub use idempotency_record::IdempotencyRecord;
pub use task::{AgentTask, AgentTaskRequest, RetryConfig, TaskError};
