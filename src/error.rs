use std::fmt;

/// Coarse crate-level error taxonomy
///
/// Component boundaries carry their own structured errors (`StoreError`,
/// `SubmissionError`, `StateMachineError`); this enum is the surface for
/// configuration and for callers that want a single error type.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCoreError {
    ValidationError(String),
    StorageError(String),
    StateTransitionError(String),
    ExecutionError(String),
    ConfigurationError(String),
}

impl fmt::Display for TaskCoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskCoreError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            TaskCoreError::StorageError(msg) => write!(f, "Storage error: {msg}"),
            TaskCoreError::StateTransitionError(msg) => {
                write!(f, "State transition error: {msg}")
            }
            TaskCoreError::ExecutionError(msg) => write!(f, "Execution error: {msg}"),
            TaskCoreError::ConfigurationError(msg) => {
                write!(f, "Configuration error: {msg}")
            }
        }
    }
}

impl std::error::Error for TaskCoreError {}

pub type Result<T> = std::result::Result<T, TaskCoreError>;
