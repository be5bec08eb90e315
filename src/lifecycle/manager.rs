//! # Task Lifecycle Manager
//!
//! Owns everything that happens to a task outside the executor call itself:
//! submission validation, per-task monitors, the completion continuation
//! (metrics + retry scheduling + dead-letter routing), the periodic
//! timeout/stale/zombie sweep, and startup recovery.
//!
//! Recovery semantics are deliberately blunt: a task found RUNNING at startup
//! is reset to PENDING unconditionally, because the process cannot know
//! whether its predecessor crashed mid-task. Executors therefore run under
//! at-least-once semantics and must be safe to re-run.

use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::backoff::BackoffCalculator;
use super::monitor::MonitorRegistry;
use super::validation::{validate_structure, ValidationOutcome};
use crate::constants::{error_codes, system};
use crate::idempotency::IdempotencyLedger;
use crate::metrics::TaskMetrics;
use crate::models::{AgentTask, TaskError};
use crate::state_machine::{
    StateMachineError, TaskEvent, TaskStateMachine, TaskStatus,
};
use crate::store::{DeadLetterStore, StoreError, TaskQuery, TaskStore};

/// Errors raised by lifecycle operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error("Unexpected status {status} for task {task_id} in completion handling")]
    UnexpectedStatus { task_id: String, status: String },
}

/// How a finished execution was routed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Task completed successfully and its final state stands
    Finalized,
    /// Task failed with retry budget left; re-persisted as pending
    RetryScheduled { next_attempt: u32, delay_ms: u64 },
    /// Task exhausted its retry budget and moved to dead-letter storage
    DeadLettered,
}

/// Counts from one monitor sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub timed_out: usize,
    pub stale: usize,
    pub zombies_reset: usize,
    pub monitors_evicted: usize,
}

/// Tunables for the sweep scans
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub stale_running_ms: u64,
    pub zombie_running_ms: u64,
    pub monitor_grace_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stale_running_ms: system::DEFAULT_STALE_RUNNING_MS,
            zombie_running_ms: system::DEFAULT_ZOMBIE_RUNNING_MS,
            monitor_grace_ms: system::DEFAULT_MONITOR_GRACE_MS,
        }
    }
}

/// Validation, monitoring, recovery, and completion routing for agent tasks
pub struct TaskLifecycleManager {
    store: Arc<dyn TaskStore>,
    dead_letter: Arc<dyn DeadLetterStore>,
    ledger: Arc<IdempotencyLedger>,
    metrics: Arc<TaskMetrics>,
    monitors: MonitorRegistry,
    config: LifecycleConfig,
}

impl TaskLifecycleManager {
    pub fn new(
        store: Arc<dyn TaskStore>,
        dead_letter: Arc<dyn DeadLetterStore>,
        ledger: Arc<IdempotencyLedger>,
        metrics: Arc<TaskMetrics>,
        config: LifecycleConfig,
    ) -> Self {
        let monitors = MonitorRegistry::new(config.monitor_grace_ms);
        Self {
            store,
            dead_letter,
            ledger,
            metrics,
            monitors,
            config,
        }
    }

    /// Validate a submission: structural errors reject it, soft constraints
    /// are clamped, and a pre-existing idempotency record only warns — the
    /// de-dup short-circuit belongs to the orchestrator.
    pub async fn validate_submission(&self, task: &mut AgentTask) -> ValidationOutcome {
        let mut outcome = validate_structure(task);

        if let Some(key) = task.idempotency_key.clone() {
            if self.ledger.lookup(&key).await.is_some() {
                outcome.warnings.push(format!(
                    "idempotency key {key} already maps to a recorded result"
                ));
            }
        }

        outcome
    }

    pub fn start_monitoring(&self, task: &AgentTask) {
        self.monitors.register(task);
    }

    pub fn stop_monitoring(&self, task_id: &str) {
        self.monitors.remove(task_id);
    }

    pub fn monitored_count(&self) -> usize {
        self.monitors.len()
    }

    /// Completion continuation for a task whose terminal state the caller has
    /// already persisted: stop the monitor, record metrics, and route the
    /// result (final / retry / dead-letter).
    pub async fn handle_completion(
        &self,
        task: AgentTask,
    ) -> Result<CompletionOutcome, LifecycleError> {
        self.stop_monitoring(&task.task_id);
        let duration_ms = task.duration_ms();

        match task.status {
            TaskStatus::Completed => {
                self.metrics.record_completed(&task, duration_ms);
                info!(
                    task_id = %task.task_id,
                    task_type = %task.task_type,
                    duration_ms = duration_ms,
                    "Task completed"
                );
                Ok(CompletionOutcome::Finalized)
            }
            TaskStatus::Failed => {
                let error_code = task
                    .error
                    .as_ref()
                    .map(|error| error.code.clone())
                    .unwrap_or_else(|| error_codes::EXECUTION_FAILED.to_string());
                self.metrics.record_failed(&task, &error_code, duration_ms);

                if task.can_retry() {
                    self.schedule_retry(task).await
                } else {
                    self.dead_letter_task(task).await
                }
            }
            other => Err(LifecycleError::UnexpectedStatus {
                task_id: task.task_id,
                status: other.to_string(),
            }),
        }
    }

    /// Reset every RUNNING task to PENDING at process start
    pub async fn recover_interrupted(&self) -> Result<usize, LifecycleError> {
        let running = self
            .store
            .query(&TaskQuery::new().status(TaskStatus::Running))
            .await?;

        let mut recovered = 0;
        for mut task in running {
            let now = Utc::now();
            TaskStateMachine::apply(&mut task, TaskEvent::Reset, now)?;
            task.scheduled_at = now;
            self.store.save(&task).await?;
            recovered += 1;
            info!(
                task_id = %task.task_id,
                attempt = task.current_attempt,
                "Interrupted task reset to pending at startup"
            );
        }

        if recovered > 0 {
            info!(recovered = recovered, "Startup recovery finished");
        }
        Ok(recovered)
    }

    /// One monitor sweep: three independent scans over RUNNING tasks plus
    /// monitor eviction.
    pub async fn run_sweep(&self) -> Result<SweepReport, LifecycleError> {
        let mut report = SweepReport::default();

        report.timed_out = self.sweep_timed_out().await?;
        report.stale = self.sweep_stale().await?;
        report.zombies_reset = self.sweep_zombies().await?;
        report.monitors_evicted = self.monitors.evict_expired(Utc::now()).len();

        if report != SweepReport::default() {
            info!(
                timed_out = report.timed_out,
                stale = report.stale,
                zombies_reset = report.zombies_reset,
                monitors_evicted = report.monitors_evicted,
                "Monitor sweep finished"
            );
        }
        Ok(report)
    }

    /// Scan 1: running tasks past their timeout budget are failed with code
    /// `TIMEOUT` and run through completion handling (which may retry them)
    async fn sweep_timed_out(&self) -> Result<usize, LifecycleError> {
        let now = Utc::now();
        let running = self.running_tasks().await?;
        let mut timed_out = 0;

        for mut task in running {
            if !task.timed_out(now) {
                continue;
            }
            warn!(
                task_id = %task.task_id,
                timeout_ms = task.timeout_ms,
                running_for_ms = task.running_for_ms(now),
                "Task exceeded timeout budget"
            );
            task.error = Some(TaskError::timeout(task.timeout_ms));
            TaskStateMachine::apply(
                &mut task,
                TaskEvent::fail_with_error("timeout sweep"),
                now,
            )?;
            self.store.save(&task).await?;
            self.handle_completion(task).await?;
            timed_out += 1;
        }
        Ok(timed_out)
    }

    /// Scan 2: running tasks whose document has gone quiet are a health
    /// signal only — an executor may legitimately still be working
    async fn sweep_stale(&self) -> Result<usize, LifecycleError> {
        let cutoff = Utc::now() - Duration::milliseconds(self.config.stale_running_ms as i64);
        let stale: Vec<AgentTask> = self
            .running_tasks()
            .await?
            .into_iter()
            .filter(|task| task.updated_at < cutoff)
            .collect();

        for task in &stale {
            warn!(
                task_id = %task.task_id,
                updated_at = %task.updated_at,
                "Running task has not been updated recently"
            );
        }
        Ok(stale.len())
    }

    /// Scan 3: running tasks started long ago are presumed orphaned by a dead
    /// worker and force-reset to pending
    async fn sweep_zombies(&self) -> Result<usize, LifecycleError> {
        let now = Utc::now();
        let cutoff = now - Duration::milliseconds(self.config.zombie_running_ms as i64);
        let zombies: Vec<AgentTask> = self
            .running_tasks()
            .await?
            .into_iter()
            .filter(|task| task.started_at.is_some_and(|started| started < cutoff))
            .collect();

        let mut reset = 0;
        for mut task in zombies {
            warn!(
                task_id = %task.task_id,
                started_at = ?task.started_at,
                "Zombie task detected; resetting to pending"
            );
            TaskStateMachine::apply(&mut task, TaskEvent::Reset, now)?;
            task.scheduled_at = now;
            self.store.save(&task).await?;
            self.stop_monitoring(&task.task_id);
            reset += 1;
        }
        Ok(reset)
    }

    async fn running_tasks(&self) -> Result<Vec<AgentTask>, LifecycleError> {
        Ok(self
            .store
            .query(&TaskQuery::new().status(TaskStatus::Running))
            .await?)
    }

    async fn schedule_retry(
        &self,
        mut task: AgentTask,
    ) -> Result<CompletionOutcome, LifecycleError> {
        let delay_ms = BackoffCalculator::delay_ms(&task.retry_config, task.current_attempt);
        let now = Utc::now();

        TaskStateMachine::apply(&mut task, TaskEvent::Reset, now)?;
        task.prepare_retry(delay_ms, now);
        self.store.save(&task).await?;
        self.metrics.record_retried(&task);

        info!(
            task_id = %task.task_id,
            next_attempt = task.current_attempt,
            delay_ms = delay_ms,
            "Retry scheduled"
        );
        Ok(CompletionOutcome::RetryScheduled {
            next_attempt: task.current_attempt,
            delay_ms,
        })
    }

    async fn dead_letter_task(
        &self,
        task: AgentTask,
    ) -> Result<CompletionOutcome, LifecycleError> {
        self.dead_letter.save(&task).await?;
        self.store.delete(&task.task_id).await?;

        warn!(
            task_id = %task.task_id,
            task_type = %task.task_type,
            attempts = task.current_attempt,
            error_code = task.error.as_ref().map(|e| e.code.as_str()),
            "Task exhausted retries; moved to dead-letter"
        );
        Ok(CompletionOutcome::DeadLettered)
    }
}
