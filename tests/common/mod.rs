//! Shared fixtures for the integration suites: an in-memory harness around
//! the task system plus scripted executors with observable behavior.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wayfare_task_core::config::WayfareConfig;
use wayfare_task_core::models::{AgentTask, AgentTaskRequest, TaskError};
use wayfare_task_core::orchestration::{AgentTaskSystem, TaskExecutor};
use wayfare_task_core::registry::ExecutorRegistry;
use wayfare_task_core::state_machine::TaskStatus;
use wayfare_task_core::store::{
    MemoryDeadLetterStore, MemoryIdempotencyStore, MemoryTaskStore,
};

/// Everything a test needs to drive and observe the system
pub struct TestHarness {
    pub system: Arc<AgentTaskSystem>,
    pub store: Arc<MemoryTaskStore>,
    pub dead_letter: Arc<MemoryDeadLetterStore>,
    pub idempotency: Arc<MemoryIdempotencyStore>,
    pub executors: Arc<ExecutorRegistry>,
}

pub fn harness(config: WayfareConfig) -> TestHarness {
    harness_with_store(Arc::new(MemoryTaskStore::new()), config)
}

pub fn harness_with_store(store: Arc<MemoryTaskStore>, config: WayfareConfig) -> TestHarness {
    let dead_letter = Arc::new(MemoryDeadLetterStore::new());
    let idempotency = Arc::new(MemoryIdempotencyStore::new());
    let executors = Arc::new(ExecutorRegistry::new());

    let system = AgentTaskSystem::new(
        store.clone(),
        dead_letter.clone(),
        idempotency.clone(),
        executors.clone(),
        config,
    );

    TestHarness {
        system,
        store,
        dead_letter,
        idempotency,
        executors,
    }
}

/// Fast timers suitable for integration tests
pub fn fast_config() -> WayfareConfig {
    WayfareConfig {
        poll_interval_ms: 50,
        sweep_interval_ms: 100,
        cleanup_interval_ms: 200,
        shutdown_grace_ms: 5_000,
        ..WayfareConfig::default()
    }
}

/// A submission with the required ownership fields filled in
pub fn request(task_type: &str, agent_kind: &str) -> AgentTaskRequest {
    AgentTaskRequest::new(task_type, agent_kind)
        .itinerary_id("it-100")
        .user_id("u-200")
}

/// Executor that completes immediately and records execution order
pub struct RecordingExecutor {
    kind: String,
    pub executed: Arc<Mutex<Vec<String>>>,
}

impl RecordingExecutor {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn executed_ids(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    fn agent_kind(&self) -> &str {
        &self.kind
    }

    async fn execute(&self, mut task: AgentTask) -> Result<AgentTask, TaskError> {
        self.executed.lock().push(task.task_id.clone());
        task.status = TaskStatus::Completed;
        task.result = Some(serde_json::json!({ "ok": true }));
        Ok(task)
    }
}

/// Executor that fails the first `fail_times` calls, then completes
pub struct FlakyExecutor {
    kind: String,
    fail_times: u32,
    pub calls: AtomicU32,
}

impl FlakyExecutor {
    pub fn new(kind: &str, fail_times: u32) -> Self {
        Self {
            kind: kind.to_string(),
            fail_times,
            calls: AtomicU32::new(0),
        }
    }

    /// An executor that never succeeds
    pub fn always_failing(kind: &str) -> Self {
        Self::new(kind, u32::MAX)
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for FlakyExecutor {
    fn agent_kind(&self) -> &str {
        &self.kind
    }

    async fn execute(&self, mut task: AgentTask) -> Result<AgentTask, TaskError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_times {
            return Err(TaskError::execution(format!("scripted failure #{call}")));
        }
        task.status = TaskStatus::Completed;
        Ok(task)
    }
}

/// Executor that sleeps before completing, for pool/shutdown scenarios
pub struct SlowExecutor {
    kind: String,
    delay: Duration,
}

impl SlowExecutor {
    pub fn new(kind: &str, delay: Duration) -> Self {
        Self {
            kind: kind.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl TaskExecutor for SlowExecutor {
    fn agent_kind(&self) -> &str {
        &self.kind
    }

    async fn execute(&self, mut task: AgentTask) -> Result<AgentTask, TaskError> {
        tokio::time::sleep(self.delay).await;
        task.status = TaskStatus::Completed;
        Ok(task)
    }
}

/// Poll a synchronous condition until it holds or the timeout expires
pub async fn eventually<F>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll the store until the task reaches the wanted status
pub async fn eventually_status(
    store: &MemoryTaskStore,
    task_id: &str,
    wanted: TaskStatus,
    timeout_ms: u64,
) -> bool {
    use wayfare_task_core::store::TaskStore;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if let Ok(Some(task)) = store.get(task_id).await {
            if task.status == wanted {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
