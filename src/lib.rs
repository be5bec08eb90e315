#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Wayfare Task Core
//!
//! Durable agent-task processing core for the Wayfare travel-planning
//! backend: a persistence-backed queue that accepts asynchronous work items,
//! dispatches them to a bounded worker pool, tracks their lifecycle
//! (pending → running → completed/failed → retried/dead-lettered), and
//! survives process restarts without losing work.
//!
//! ## Architecture
//!
//! The core owns coordination; the hosting application plugs in capabilities
//! at two seams: a [`store::TaskStore`] for durable persistence and one
//! [`orchestration::TaskExecutor`] per agent kind for the task bodies.
//! Executors run under **at-least-once** semantics — timeout races, zombie
//! recovery, and restarts may re-run a task body, so bodies must be
//! idempotent.
//!
//! ## Module Organization
//!
//! - [`models`] - Task, submission request, retry policy, idempotency record
//! - [`state_machine`] - Status/event definitions and transition rules
//! - [`store`] - Durable store contracts and in-memory implementations
//! - [`idempotency`] - TTL-scoped submission deduplication ledger
//! - [`lifecycle`] - Validation, monitors, sweeps, recovery, retry routing
//! - [`registry`] - Executor registration and discovery
//! - [`orchestration`] - The task system facade and executor seam
//! - [`metrics`] - Lock-free lifecycle counters and latency aggregates
//! - [`config`] - Environment-driven runtime tunables
//! - [`error`] - Crate-level error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wayfare_task_core::config::WayfareConfig;
//! use wayfare_task_core::models::AgentTaskRequest;
//! use wayfare_task_core::orchestration::AgentTaskSystem;
//! use wayfare_task_core::registry::ExecutorRegistry;
//! use wayfare_task_core::store::{
//!     MemoryDeadLetterStore, MemoryIdempotencyStore, MemoryTaskStore,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executors = Arc::new(ExecutorRegistry::new());
//! // executors.register(Arc::new(PlacesAgentExecutor::new(...)));
//!
//! let system = AgentTaskSystem::new(
//!     Arc::new(MemoryTaskStore::new()),
//!     Arc::new(MemoryDeadLetterStore::new()),
//!     Arc::new(MemoryIdempotencyStore::new()),
//!     executors,
//!     WayfareConfig::from_env()?,
//! );
//! system.start().await?;
//!
//! let task_id = system
//!     .submit(
//!         AgentTaskRequest::new("itinerary_research", "places")
//!             .itinerary_id("it-123")
//!             .user_id("u-456")
//!             .idempotency_key("research.it-123.v1")
//!             .priority(7),
//!     )
//!     .await?;
//! println!("submitted {task_id}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod idempotency;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod store;

pub use config::WayfareConfig;
pub use error::{Result, TaskCoreError};
pub use idempotency::IdempotencyLedger;
pub use lifecycle::{CompletionOutcome, SweepReport, TaskLifecycleManager};
pub use metrics::{MetricsSnapshot, TaskMetrics};
pub use models::{AgentTask, AgentTaskRequest, IdempotencyRecord, RetryConfig, TaskError};
pub use orchestration::{AgentTaskSystem, SubmissionError, SystemError, TaskExecutor};
pub use registry::ExecutorRegistry;
pub use state_machine::{TaskEvent, TaskStatus};
pub use store::{DeadLetterStore, IdempotencyStore, StoreError, TaskQuery, TaskStore};
