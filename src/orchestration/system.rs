//! # Agent Task System
//!
//! The orchestration facade: owns the bounded worker pool, the change-feed
//! subscription (with a polling fallback), the submission API, read-only
//! projections, retention cleanup, and graceful shutdown. State transitions
//! and retry/dead-letter routing are delegated to the
//! [`TaskLifecycleManager`]; executors are resolved from the
//! [`ExecutorRegistry`] by `agent_kind`.
//!
//! ## Dispatch
//!
//! Two sources feed the pool:
//! - the store's pending-task change feed, for low-latency dispatch of newly
//!   persisted work;
//! - a periodic poll ordered by priority desc then `scheduled_at` asc, which
//!   also picks up backoff-delayed retries and anything the feed dropped
//!   while the pool was saturated.
//!
//! Both paths converge on the in-flight map, so a task id is never executed
//! twice concurrently by this process. Cross-process duplicate execution is
//! tolerated by design: executors run under at-least-once semantics.

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::executor::TaskExecutor;
use crate::config::WayfareConfig;
use crate::constants::{error_codes, status_groups};
use crate::idempotency::IdempotencyLedger;
use crate::lifecycle::{LifecycleConfig, LifecycleError, TaskLifecycleManager};
use crate::metrics::{MetricsSnapshot, TaskMetrics};
use crate::models::{AgentTask, AgentTaskRequest, TaskError};
use crate::registry::ExecutorRegistry;
use crate::state_machine::{
    StateMachineError, TaskEvent, TaskStateMachine, TaskStatus,
};
use crate::store::{
    DeadLetterStore, IdempotencyStore, SortOrder, StoreError, TaskField, TaskQuery, TaskStore,
};

/// Operation type recorded on submission idempotency records
const SUBMIT_OPERATION: &str = "submit_task";

/// Errors surfaced by [`AgentTaskSystem::submit`]
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Submission rejected: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("Invalid idempotency key: {key}")]
    InvalidIdempotencyKey { key: String },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Errors surfaced by the non-submission operations
#[derive(Debug, Error)]
pub enum SystemError {
    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),
}

/// Point-in-time operational view of the system
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub in_flight: usize,
    pub monitored: usize,
    pub pending: usize,
    pub running: usize,
    pub registered_agent_kinds: Vec<String>,
    pub metrics: MetricsSnapshot,
}

/// Orchestrator for the durable agent-task queue
pub struct AgentTaskSystem {
    store: Arc<dyn TaskStore>,
    ledger: Arc<IdempotencyLedger>,
    metrics: Arc<TaskMetrics>,
    lifecycle: Arc<TaskLifecycleManager>,
    executors: Arc<ExecutorRegistry>,
    config: WayfareConfig,
    in_flight: DashMap<String, JoinHandle<()>>,
    permits: Arc<Semaphore>,
    shutting_down: AtomicBool,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentTaskSystem {
    pub fn new(
        store: Arc<dyn TaskStore>,
        dead_letter: Arc<dyn DeadLetterStore>,
        idempotency_store: Arc<dyn IdempotencyStore>,
        executors: Arc<ExecutorRegistry>,
        config: WayfareConfig,
    ) -> Arc<Self> {
        let metrics = Arc::new(TaskMetrics::new());
        let ledger = Arc::new(IdempotencyLedger::with_ttl_hours(
            idempotency_store,
            config.idempotency_ttl_hours,
        ));
        let lifecycle = Arc::new(TaskLifecycleManager::new(
            store.clone(),
            dead_letter,
            ledger.clone(),
            metrics.clone(),
            LifecycleConfig {
                stale_running_ms: config.stale_running_ms,
                zombie_running_ms: config.zombie_running_ms,
                monitor_grace_ms: config.monitor_grace_ms,
            },
        ));
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks));

        Arc::new(Self {
            store,
            ledger,
            metrics,
            lifecycle,
            executors,
            config,
            in_flight: DashMap::new(),
            permits,
            shutting_down: AtomicBool::new(false),
            background: Mutex::new(Vec::new()),
        })
    }

    /// Recover interrupted work, dispatch the due backlog, and start the
    /// change-feed listener and periodic timers
    pub async fn start(self: &Arc<Self>) -> Result<(), SystemError> {
        info!(
            max_concurrent = self.config.max_concurrent_tasks,
            poll_interval_ms = self.config.poll_interval_ms,
            "Agent task system starting"
        );

        let recovered = self.lifecycle.recover_interrupted().await?;
        if recovered > 0 {
            info!(recovered = recovered, "Recovered interrupted tasks");
        }
        self.dispatch_due_pending().await?;

        let mut background = Vec::new();

        match self.store.watch_pending() {
            Some(feed) => background.push(self.spawn_pending_listener(feed)),
            None => info!("Store provides no change feed; relying on the dispatch poll"),
        }

        background.push(self.spawn_dispatch_poll());
        background.push(self.spawn_monitor_sweep());
        background.push(self.spawn_idempotency_sweep());
        background.push(self.spawn_retention_cleanup());

        self.background.lock().extend(background);
        Ok(())
    }

    /// Validate, dedupe, persist, and record a new submission; returns the
    /// task id (the prior one on an idempotency hit)
    pub async fn submit(&self, request: AgentTaskRequest) -> Result<String, SubmissionError> {
        if let Some(key) = &request.idempotency_key {
            if !IdempotencyLedger::is_valid_key(key) {
                return Err(SubmissionError::InvalidIdempotencyKey { key: key.clone() });
            }
        }

        let mut task = request.into_task();
        let outcome = self.lifecycle.validate_submission(&mut task).await;
        for warning in &outcome.warnings {
            warn!(task_id = %task.task_id, warning = %warning, "Submission warning");
        }
        if !outcome.is_valid() {
            return Err(SubmissionError::Validation {
                errors: outcome.errors,
            });
        }

        // De-dup before any side-effecting persistence
        if let Some(key) = task.idempotency_key.clone() {
            if let Some(record) = self.ledger.lookup(&key).await {
                if let Some(existing) = record.result.get("task_id").and_then(|v| v.as_str()) {
                    info!(
                        key = %key,
                        task_id = existing,
                        "Duplicate submission; returning prior task id"
                    );
                    return Ok(existing.to_string());
                }
            }
        }

        self.store.save(&task).await?;

        if let Some(key) = task.idempotency_key.clone() {
            let result = serde_json::json!({ "task_id": task.task_id });
            if let Err(storage_error) =
                self.ledger.store(&key, result, SUBMIT_OPERATION, None).await
            {
                warn!(
                    key = %key,
                    error = %storage_error,
                    "Failed to record idempotency result; duplicate protection lost for this key"
                );
            }
        }

        self.metrics.record_submitted(&task);
        info!(
            task_id = %task.task_id,
            task_type = %task.task_type,
            agent_kind = %task.agent_kind,
            priority = task.priority,
            "Task submitted"
        );
        Ok(task.task_id)
    }

    /// Cancel a task; succeeds only while it is still pending
    pub async fn cancel(&self, task_id: &str, reason: &str) -> Result<bool, SystemError> {
        let Some(mut task) = self.store.get(task_id).await? else {
            return Ok(false);
        };
        if task.status != TaskStatus::Pending {
            debug!(
                task_id = %task_id,
                status = %task.status,
                "Cancellation refused; task is not pending"
            );
            return Ok(false);
        }

        TaskStateMachine::apply(&mut task, TaskEvent::Cancel, Utc::now())?;
        task.cancellation_reason = Some(reason.to_string());
        self.store.save(&task).await?;

        info!(task_id = %task_id, reason = %reason, "Task cancelled");
        Ok(true)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<AgentTask>, SystemError> {
        Ok(self.store.get(task_id).await?)
    }

    /// All tasks for an itinerary, oldest first; never mutates state
    pub async fn get_tasks_for_itinerary(
        &self,
        itinerary_id: &str,
    ) -> Result<Vec<AgentTask>, SystemError> {
        let query = TaskQuery::new()
            .itinerary(itinerary_id)
            .order_by(TaskField::CreatedAt, SortOrder::Asc);
        Ok(self.query_degrading(query).await?)
    }

    /// Operational snapshot; never mutates state
    pub async fn get_stats(&self) -> Result<SystemStats, SystemError> {
        let pending = self
            .query_degrading(TaskQuery::new().status(TaskStatus::Pending))
            .await?
            .len();
        let running = self
            .query_degrading(TaskQuery::new().status(TaskStatus::Running))
            .await?
            .len();

        Ok(SystemStats {
            in_flight: self.in_flight.len(),
            monitored: self.lifecycle.monitored_count(),
            pending,
            running,
            registered_agent_kinds: self.executors.stats().agent_kinds,
            metrics: self.metrics.snapshot(),
        })
    }

    /// Query due pending work (priority desc, then scheduled_at asc, capped
    /// to the pool size) and dispatch it. Returns the number of tasks handed
    /// to the pool.
    pub async fn dispatch_due_pending(self: &Arc<Self>) -> Result<usize, SystemError> {
        let now = Utc::now();
        let query = TaskQuery::new()
            .status(TaskStatus::Pending)
            .scheduled_before(now)
            .order_by(TaskField::Priority, SortOrder::Desc)
            .order_by(TaskField::ScheduledAt, SortOrder::Asc)
            .limit(self.config.max_concurrent_tasks);

        let due = self.query_degrading(query).await?;

        let mut dispatched = 0;
        for task in due {
            if self.spawn_execution(task) {
                dispatched += 1;
            }
        }
        if dispatched > 0 {
            debug!(dispatched = dispatched, "Dispatch poll handed tasks to the pool");
        }
        Ok(dispatched)
    }

    /// Delete terminal tasks older than the retention window
    pub async fn cleanup_old_tasks(&self) -> Result<usize, SystemError> {
        let cutoff = Utc::now() - ChronoDuration::hours(self.config.retention_hours);
        let query = TaskQuery::new()
            .status_in(status_groups::CLEANUP_ELIGIBLE)
            .updated_before(cutoff);

        let old = self.query_degrading(query).await?;
        let mut removed = 0;
        for task in old {
            self.store.delete(&task.task_id).await?;
            removed += 1;
        }

        if removed > 0 {
            info!(removed = removed, "Retention cleanup removed old terminal tasks");
        }
        Ok(removed)
    }

    /// Stop accepting dispatches, stop the background loops, await in-flight
    /// work up to the grace period, then abort the remainder. Tasks aborted
    /// here stay RUNNING in the store and are recovered on the next startup.
    pub async fn shutdown(&self) {
        info!("Agent task system shutting down");
        self.shutting_down.store(true, Ordering::SeqCst);

        let background: Vec<JoinHandle<()>> = self.background.lock().drain(..).collect();
        for handle in background {
            handle.abort();
        }

        let keys: Vec<String> = self
            .in_flight
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let mut joins = Vec::new();
        let mut aborts = Vec::new();
        for key in keys {
            if let Some((_, handle)) = self.in_flight.remove(&key) {
                aborts.push(handle.abort_handle());
                joins.push(handle);
            }
        }

        if joins.is_empty() {
            info!("Shutdown complete; no in-flight tasks");
            return;
        }

        info!(
            in_flight = joins.len(),
            grace_ms = self.config.shutdown_grace_ms,
            "Awaiting in-flight tasks"
        );
        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        match tokio::time::timeout(grace, join_all(joins)).await {
            Ok(_) => info!("All in-flight tasks finished before shutdown"),
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                warn!("Shutdown grace expired; remaining workers aborted");
            }
        }
    }

    /// Access to the lifecycle manager (sweeps are also driveable directly,
    /// e.g. by operational tooling)
    pub fn lifecycle(&self) -> Arc<TaskLifecycleManager> {
        self.lifecycle.clone()
    }

    pub fn metrics(&self) -> Arc<TaskMetrics> {
        self.metrics.clone()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Run a query, degrading to a single-predicate scan with in-memory
    /// filtering and ordering when the store lacks a compound index
    async fn query_degrading(&self, query: TaskQuery) -> Result<Vec<AgentTask>, StoreError> {
        match self.store.query(&query).await {
            Ok(tasks) => Ok(tasks),
            Err(StoreError::IndexUnavailable { description }) => {
                debug!(
                    description = %description,
                    "Compound query unsupported; filtering in memory"
                );
                let simple = TaskQuery {
                    predicates: query.predicates.first().cloned().into_iter().collect(),
                    order_by: Vec::new(),
                    limit: None,
                };
                let mut tasks = self.store.query(&simple).await?;
                tasks.retain(|task| query.matches(task));
                query.sort(&mut tasks);
                if let Some(limit) = query.limit {
                    tasks.truncate(limit);
                }
                Ok(tasks)
            }
            Err(error) => Err(error),
        }
    }

    /// Hand a task to the worker pool. Returns false when the system is
    /// shutting down, the task is not due, the pool is saturated, or the
    /// task is already in flight.
    fn spawn_execution(self: &Arc<Self>, task: AgentTask) -> bool {
        if self.shutting_down.load(Ordering::SeqCst) {
            return false;
        }
        if !task.is_due(Utc::now()) {
            return false;
        }

        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(
                    task_id = %task.task_id,
                    "Worker pool saturated; leaving task for the next poll"
                );
                return false;
            }
        };

        match self.in_flight.entry(task.task_id.clone()) {
            Entry::Occupied(_) => {
                drop(permit);
                false
            }
            Entry::Vacant(slot) => {
                let system = Arc::clone(self);
                let handle = tokio::spawn(async move {
                    system.execute_task(task, permit).await;
                });
                slot.insert(handle);
                true
            }
        }
    }

    /// The worker future: claim, execute, then run the completion
    /// continuation (persist final state + lifecycle routing) before
    /// releasing the slot
    async fn execute_task(self: Arc<Self>, task: AgentTask, permit: OwnedSemaphorePermit) {
        let task_id = task.task_id.clone();

        // Re-read the document: the dispatched copy may have been cancelled
        // or rescheduled since it was queued
        let current = match self.store.get(&task_id).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                self.in_flight.remove(&task_id);
                return;
            }
            Err(storage_error) => {
                error!(task_id = %task_id, error = %storage_error, "Claim read failed");
                self.in_flight.remove(&task_id);
                return;
            }
        };
        if !current.is_due(Utc::now()) {
            self.in_flight.remove(&task_id);
            return;
        }

        let mut task = current;
        let now = Utc::now();
        if let Err(transition_error) = TaskStateMachine::apply(&mut task, TaskEvent::Start, now) {
            warn!(task_id = %task_id, error = %transition_error, "Task no longer dispatchable");
            self.in_flight.remove(&task_id);
            return;
        }
        if let Err(storage_error) = self.store.save(&task).await {
            error!(task_id = %task_id, error = %storage_error, "Failed to persist running state");
            self.in_flight.remove(&task_id);
            return;
        }

        self.metrics.record_started(&task);
        self.lifecycle.start_monitoring(&task);
        debug!(
            task_id = %task_id,
            agent_kind = %task.agent_kind,
            attempt = task.current_attempt,
            "Task execution started"
        );

        let finished = self.invoke_executor(task).await;

        // Persist the final state, then route through the lifecycle manager;
        // both ride the worker future so they always travel together
        if let Err(storage_error) = self.store.save(&finished).await {
            error!(
                task_id = %task_id,
                error = %storage_error,
                "Failed to persist final task state"
            );
        } else if let Err(lifecycle_error) = self.lifecycle.handle_completion(finished).await {
            error!(
                task_id = %task_id,
                error = %lifecycle_error,
                "Completion handling failed"
            );
        }

        // Free the pool slot before clearing the in-flight entry, so an
        // empty in-flight map always implies available capacity
        drop(permit);
        self.in_flight.remove(&task_id);
    }

    /// Resolve and run the executor under the task's timeout budget,
    /// normalizing every outcome to a terminal task document
    async fn invoke_executor(&self, task: AgentTask) -> AgentTask {
        let timeout_ms = task.timeout_ms;
        let Some(executor) = self.executors.resolve(&task.agent_kind) else {
            let agent_kind = task.agent_kind.clone();
            return Self::fail_task(
                task,
                TaskError::new(
                    error_codes::EXECUTOR_NOT_FOUND,
                    format!("No executor registered for agent kind {agent_kind}"),
                ),
            );
        };

        let original = task.clone();
        match tokio::time::timeout(Duration::from_millis(timeout_ms), executor.execute(task))
            .await
        {
            Ok(Ok(mut updated)) => match updated.status {
                TaskStatus::Completed | TaskStatus::Failed => {
                    let now = Utc::now();
                    if updated.completed_at.is_none() {
                        updated.completed_at = Some(now);
                    }
                    updated.updated_at = now;
                    updated
                }
                other => Self::fail_task(
                    updated,
                    TaskError::new(
                        error_codes::INVALID_EXECUTOR_RESULT,
                        format!("Executor returned non-terminal status {other}"),
                    ),
                ),
            },
            Ok(Err(task_error)) => Self::fail_task(original, task_error),
            Err(_) => Self::fail_task(original, TaskError::timeout(timeout_ms)),
        }
    }

    /// Force a task into the failed state carrying the given error
    fn fail_task(mut task: AgentTask, error: TaskError) -> AgentTask {
        let now = Utc::now();
        let message = error.message.clone();
        task.error = Some(error);
        if TaskStateMachine::apply(&mut task, TaskEvent::Fail(message), now).is_err() {
            // Executor handed back a state with no legal failure transition
            task.status = TaskStatus::Failed;
            task.completed_at = Some(now);
            task.updated_at = now;
        }
        task
    }

    fn spawn_pending_listener(
        self: &Arc<Self>,
        mut feed: broadcast::Receiver<AgentTask>,
    ) -> JoinHandle<()> {
        let system = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(task) => {
                        if system.shutting_down.load(Ordering::SeqCst) {
                            break;
                        }
                        // Future-scheduled tasks are the poll's business
                        if task.is_due(Utc::now()) {
                            system.spawn_execution(task);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed = missed, "Pending feed lagged; poll will recover");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_dispatch_poll(self: &Arc<Self>) -> JoinHandle<()> {
        let system = Arc::clone(self);
        let period = Duration::from_millis(self.config.poll_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if system.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(poll_error) = system.dispatch_due_pending().await {
                    warn!(error = %poll_error, "Dispatch poll failed");
                }
            }
        })
    }

    fn spawn_monitor_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let system = Arc::clone(self);
        let period = Duration::from_millis(self.config.sweep_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if system.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(sweep_error) = system.lifecycle.run_sweep().await {
                    warn!(error = %sweep_error, "Monitor sweep failed");
                }
            }
        })
    }

    fn spawn_idempotency_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let system = Arc::clone(self);
        let period = Duration::from_millis(self.config.idempotency_sweep_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if system.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                system.ledger.sweep_expired().await;
            }
        })
    }

    fn spawn_retention_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let system = Arc::clone(self);
        let period = Duration::from_millis(self.config.cleanup_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if system.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(cleanup_error) = system.cleanup_old_tasks().await {
                    warn!(error = %cleanup_error, "Retention cleanup failed");
                }
            }
        })
    }
}
