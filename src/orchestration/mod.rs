//! # Orchestration
//!
//! The task-system facade and the executor delegation seam.
//!
//! - [`AgentTaskSystem`]: submission, dispatch, cancellation, projections,
//!   retention cleanup, shutdown
//! - [`TaskExecutor`]: the capability the hosting application plugs in, one
//!   implementation per agent kind

pub mod executor;
pub mod system;

pub use executor::TaskExecutor;
pub use system::{AgentTaskSystem, SubmissionError, SystemError, SystemStats};
