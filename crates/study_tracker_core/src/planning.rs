//! crates/study_tracker_core/src/planning.rs
//!
//! Validation for batch task planning. A batch is accepted whole or not at all.

use crate::domain::{NewTask, PlannedTask, Subject};
use crate::ports::{PortError, PortResult};

pub const MAX_BATCH_SIZE: usize = 20;
pub const MAX_TASK_NAME_CHARS: usize = 200;
pub const MIN_ESTIMATED_MINUTES: i64 = 5;
pub const MAX_ESTIMATED_MINUTES: i64 = 720;

/// Validates every entry and returns the normalized batch.
///
/// Names are trimmed, subjects coerced. The first failing entry rejects the
/// batch and the error names its 1-based position.
pub fn validate_batch(planned: &[PlannedTask]) -> PortResult<Vec<NewTask>> {
    if planned.is_empty() {
        return Err(PortError::Validation("at least one task is required".to_string()));
    }
    if planned.len() > MAX_BATCH_SIZE {
        return Err(PortError::Validation(format!(
            "at most {} tasks can be added at once, got {}",
            MAX_BATCH_SIZE,
            planned.len()
        )));
    }

    planned
        .iter()
        .enumerate()
        .map(|(i, p)| validate_one(p).map_err(|msg| PortError::Validation(format!("task {}: {}", i + 1, msg))))
        .collect()
}

fn validate_one(planned: &PlannedTask) -> Result<NewTask, String> {
    let task_name = planned.task_name.trim();
    if task_name.is_empty() {
        return Err("task_name must not be empty".to_string());
    }
    if task_name.chars().count() > MAX_TASK_NAME_CHARS {
        return Err(format!(
            "task_name must be at most {} characters",
            MAX_TASK_NAME_CHARS
        ));
    }
    if !(MIN_ESTIMATED_MINUTES..=MAX_ESTIMATED_MINUTES).contains(&planned.estimated_minutes) {
        return Err(format!(
            "estimated_minutes must be between {} and {}",
            MIN_ESTIMATED_MINUTES, MAX_ESTIMATED_MINUTES
        ));
    }

    Ok(NewTask {
        task_name: task_name.to_string(),
        subject: Subject::coerce(&planned.subject),
        estimated_minutes: planned.estimated_minutes,
    })
}
