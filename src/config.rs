use crate::constants::system;
use crate::error::{Result, TaskCoreError};

/// Runtime tunables for the agent task system
///
/// Every knob has a default from [`crate::constants::system`] and an
/// environment override read by [`from_env`](Self::from_env).
#[derive(Debug, Clone)]
pub struct WayfareConfig {
    pub max_concurrent_tasks: usize,
    pub poll_interval_ms: u64,
    pub sweep_interval_ms: u64,
    pub cleanup_interval_ms: u64,
    pub idempotency_sweep_interval_ms: u64,
    pub retention_hours: i64,
    pub idempotency_ttl_hours: i64,
    pub stale_running_ms: u64,
    pub zombie_running_ms: u64,
    pub monitor_grace_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for WayfareConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: system::DEFAULT_MAX_CONCURRENT_TASKS,
            poll_interval_ms: system::DEFAULT_POLL_INTERVAL_MS,
            sweep_interval_ms: system::DEFAULT_SWEEP_INTERVAL_MS,
            cleanup_interval_ms: system::DEFAULT_CLEANUP_INTERVAL_MS,
            idempotency_sweep_interval_ms: system::DEFAULT_IDEMPOTENCY_SWEEP_INTERVAL_MS,
            retention_hours: system::DEFAULT_RETENTION_HOURS,
            idempotency_ttl_hours: system::DEFAULT_IDEMPOTENCY_TTL_HOURS,
            stale_running_ms: system::DEFAULT_STALE_RUNNING_MS,
            zombie_running_ms: system::DEFAULT_ZOMBIE_RUNNING_MS,
            monitor_grace_ms: system::DEFAULT_MONITOR_GRACE_MS,
            shutdown_grace_ms: system::DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl WayfareConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("WAYFARE_MAX_CONCURRENT_TASKS") {
            config.max_concurrent_tasks = parse(&value, "max_concurrent_tasks")?;
        }
        if let Ok(value) = std::env::var("WAYFARE_POLL_INTERVAL_MS") {
            config.poll_interval_ms = parse(&value, "poll_interval_ms")?;
        }
        if let Ok(value) = std::env::var("WAYFARE_SWEEP_INTERVAL_MS") {
            config.sweep_interval_ms = parse(&value, "sweep_interval_ms")?;
        }
        if let Ok(value) = std::env::var("WAYFARE_CLEANUP_INTERVAL_MS") {
            config.cleanup_interval_ms = parse(&value, "cleanup_interval_ms")?;
        }
        if let Ok(value) = std::env::var("WAYFARE_IDEMPOTENCY_SWEEP_INTERVAL_MS") {
            config.idempotency_sweep_interval_ms =
                parse(&value, "idempotency_sweep_interval_ms")?;
        }
        if let Ok(value) = std::env::var("WAYFARE_RETENTION_HOURS") {
            config.retention_hours = parse(&value, "retention_hours")?;
        }
        if let Ok(value) = std::env::var("WAYFARE_IDEMPOTENCY_TTL_HOURS") {
            config.idempotency_ttl_hours = parse(&value, "idempotency_ttl_hours")?;
        }
        if let Ok(value) = std::env::var("WAYFARE_STALE_RUNNING_MS") {
            config.stale_running_ms = parse(&value, "stale_running_ms")?;
        }
        if let Ok(value) = std::env::var("WAYFARE_ZOMBIE_RUNNING_MS") {
            config.zombie_running_ms = parse(&value, "zombie_running_ms")?;
        }
        if let Ok(value) = std::env::var("WAYFARE_MONITOR_GRACE_MS") {
            config.monitor_grace_ms = parse(&value, "monitor_grace_ms")?;
        }
        if let Ok(value) = std::env::var("WAYFARE_SHUTDOWN_GRACE_MS") {
            config.shutdown_grace_ms = parse(&value, "shutdown_grace_ms")?;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(value: &str, name: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|parse_error| {
        TaskCoreError::ConfigurationError(format!("Invalid {name}: {parse_error}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WayfareConfig::default();
        assert_eq!(config.max_concurrent_tasks, 10);
        assert_eq!(config.sweep_interval_ms, 30_000);
        assert_eq!(config.retention_hours, 24);
    }

    // Single test for the env path: from_env reads every variable, so
    // parallel tests mutating the environment would race each other
    #[test]
    fn test_env_override_and_rejection() {
        std::env::set_var("WAYFARE_MAX_CONCURRENT_TASKS", "4");
        let config = WayfareConfig::from_env().unwrap();
        assert_eq!(config.max_concurrent_tasks, 4);

        std::env::set_var("WAYFARE_POLL_INTERVAL_MS", "not-a-number");
        let result = WayfareConfig::from_env();
        assert!(matches!(
            result,
            Err(TaskCoreError::ConfigurationError(_))
        ));

        std::env::remove_var("WAYFARE_MAX_CONCURRENT_TASKS");
        std::env::remove_var("WAYFARE_POLL_INTERVAL_MS");
    }
}
