//! Submission validation: strict on structural fields, permissive on soft
//! constraints (out-of-range values are clamped with a warning rather than
//! rejected).

use crate::constants::bounds;
use crate::models::AgentTask;

/// Result of validating a submission
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Check required fields and clamp soft constraints in place
pub fn validate_structure(task: &mut AgentTask) -> ValidationOutcome {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for (field, value) in [
        ("task_id", &task.task_id),
        ("task_type", &task.task_type),
        ("agent_kind", &task.agent_kind),
        ("itinerary_id", &task.itinerary_id),
        ("user_id", &task.user_id),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("required field {field} is missing"));
        }
    }

    if task.priority < bounds::MIN_PRIORITY {
        warnings.push(format!(
            "priority {} raised to {}",
            task.priority,
            bounds::MIN_PRIORITY
        ));
        task.priority = bounds::MIN_PRIORITY;
    } else if task.priority > bounds::MAX_PRIORITY {
        warnings.push(format!(
            "priority {} clamped to {}",
            task.priority,
            bounds::MAX_PRIORITY
        ));
        task.priority = bounds::MAX_PRIORITY;
    }

    if task.timeout_ms < bounds::MIN_TIMEOUT_MS {
        warnings.push(format!(
            "timeout_ms {} raised to {}",
            task.timeout_ms,
            bounds::MIN_TIMEOUT_MS
        ));
        task.timeout_ms = bounds::MIN_TIMEOUT_MS;
    } else if task.timeout_ms > bounds::MAX_TIMEOUT_MS {
        warnings.push(format!(
            "timeout_ms {} clamped to {}",
            task.timeout_ms,
            bounds::MAX_TIMEOUT_MS
        ));
        task.timeout_ms = bounds::MAX_TIMEOUT_MS;
    }

    warnings.extend(task.retry_config.normalize());

    ValidationOutcome {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentTaskRequest;

    fn build_task() -> AgentTask {
        AgentTaskRequest::new("itinerary_research", "places")
            .itinerary_id("it-1")
            .user_id("u-1")
            .into_task()
    }

    #[test]
    fn test_valid_task_passes() {
        let mut task = build_task();
        let outcome = validate_structure(&mut task);
        assert!(outcome.is_valid());
        assert!(outcome.errors.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        let mut task = build_task();
        task.itinerary_id = String::new();
        task.user_id = "  ".to_string();

        let outcome = validate_structure(&mut task);
        assert!(!outcome.is_valid());
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors[0].contains("itinerary_id"));
        assert!(outcome.errors[1].contains("user_id"));
    }

    #[test]
    fn test_soft_constraints_clamped_with_warning() {
        let mut task = build_task();
        task.priority = 42;
        task.timeout_ms = 10;

        let outcome = validate_structure(&mut task);
        assert!(outcome.is_valid());
        assert_eq!(task.priority, bounds::MAX_PRIORITY);
        assert_eq!(task.timeout_ms, bounds::MIN_TIMEOUT_MS);
        assert_eq!(outcome.warnings.len(), 2);
    }

    #[test]
    fn test_zero_priority_raised() {
        let mut task = build_task();
        task.priority = 0;

        let outcome = validate_structure(&mut task);
        assert!(outcome.is_valid());
        assert_eq!(task.priority, bounds::MIN_PRIORITY);
    }
}
