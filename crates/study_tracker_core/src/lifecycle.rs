//! crates/study_tracker_core/src/lifecycle.rs
//!
//! The task state machine:
//!
//! ```text
//! pending ──start──> in_progress ──complete──> completed_ontime | completed_delayed
//!    │                    │
//!    └──────skip──────────┴──skip / end of day──> skipped
//! ```
//!
//! Terminal states never change. The guards here are pure; the store re-checks
//! the expected prior status when it writes.

use crate::domain::{ActiveSession, Task, TaskStatus};
use crate::ports::{PortError, PortResult};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Whether `from -> to` is an edge of the lifecycle graph.
pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    matches!(
        (from, to),
        (Pending, InProgress)
            | (Pending, Skipped)
            | (InProgress, CompletedOntime)
            | (InProgress, CompletedDelayed)
            | (InProgress, Skipped)
    )
}

/// Tasks owned by somebody else are reported exactly like missing ones.
pub fn ensure_owned(task: &Task, user_id: Uuid) -> PortResult<()> {
    if task.user_id != user_id {
        return Err(PortError::NotFound(format!("Task {} not found", task.id)));
    }
    Ok(())
}

pub fn check_start(task: &Task, user_id: Uuid) -> PortResult<()> {
    ensure_owned(task, user_id)?;
    if task.status != TaskStatus::Pending {
        return Err(PortError::Conflict(format!(
            "Task {} cannot be started from status {}",
            task.id, task.status
        )));
    }
    Ok(())
}

pub fn check_complete(task: &Task, user_id: Uuid) -> PortResult<()> {
    ensure_owned(task, user_id)?;
    if task.status != TaskStatus::InProgress {
        return Err(PortError::Conflict(format!(
            "Task {} is not in progress (status {})",
            task.id, task.status
        )));
    }
    Ok(())
}

pub fn check_skip(task: &Task, user_id: Uuid) -> PortResult<()> {
    ensure_owned(task, user_id)?;
    if task.status.is_terminal() {
        return Err(PortError::Conflict(format!(
            "Task {} is already {}",
            task.id, task.status
        )));
    }
    Ok(())
}

/// An active session must point at an in-progress task owned by the same user.
pub fn verify_session(session: &ActiveSession, task: &Task) -> PortResult<()> {
    if task.id != session.active_task_id
        || task.user_id != session.user_id
        || task.status != TaskStatus::InProgress
    {
        return Err(PortError::Integrity(format!(
            "active session of user {} points at task {} (owner {}, status {})",
            session.user_id, session.active_task_id, task.user_id, task.status
        )));
    }
    Ok(())
}

/// Whole minutes between `started_at` and `now`, rounded half up. Never negative.
pub fn elapsed_minutes(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (now - started_at).num_milliseconds().max(0);
    (millis as f64 / 60_000.0).round() as i64
}

/// Finishing exactly on the estimate counts as on time.
pub fn completion_status(actual_minutes: i64, estimated_minutes: i64) -> TaskStatus {
    if actual_minutes <= estimated_minutes {
        TaskStatus::CompletedOntime
    } else {
        TaskStatus::CompletedDelayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Subject;
    use chrono::{Duration, NaiveDate, TimeZone};

    const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::CompletedOntime,
        TaskStatus::CompletedDelayed,
        TaskStatus::Skipped,
    ];

    fn task(owner: Uuid, status: TaskStatus) -> Task {
        Task {
            id: Uuid::new_v4(),
            user_id: owner,
            task_name: "Kinematics".to_string(),
            subject: Subject::Physics,
            estimated_minutes: 30,
            task_date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            status,
            started_at: None,
            completed_at: None,
            actual_minutes: None,
            sequence: 1,
            created_at: Utc.with_ymd_and_hms(2024, 5, 6, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!can_transition(from, to), "{} -> {}", from, to);
            }
        }
        assert!(can_transition(TaskStatus::Pending, TaskStatus::InProgress));
        assert!(!can_transition(TaskStatus::Pending, TaskStatus::CompletedOntime));
        assert!(!can_transition(TaskStatus::InProgress, TaskStatus::Pending));
    }

    #[test]
    fn guards_follow_the_graph() {
        let owner = Uuid::new_v4();
        for status in ALL {
            let t = task(owner, status);
            assert_eq!(check_start(&t, owner).is_ok(), can_transition(status, TaskStatus::InProgress));
            assert_eq!(
                check_complete(&t, owner).is_ok(),
                can_transition(status, TaskStatus::CompletedOntime)
            );
            assert_eq!(check_skip(&t, owner).is_ok(), can_transition(status, TaskStatus::Skipped));
        }
    }

    #[test]
    fn foreign_tasks_look_missing() {
        let t = task(Uuid::new_v4(), TaskStatus::Pending);
        assert!(matches!(check_start(&t, Uuid::new_v4()), Err(PortError::NotFound(_))));
        assert!(matches!(check_skip(&t, Uuid::new_v4()), Err(PortError::NotFound(_))));
    }

    #[test]
    fn sessions_must_reference_their_own_running_task() {
        let owner = Uuid::new_v4();
        let running = task(owner, TaskStatus::InProgress);
        let session = ActiveSession {
            user_id: owner,
            active_task_id: running.id,
            started_at: Utc::now(),
        };
        assert!(verify_session(&session, &running).is_ok());

        let finished = Task {
            status: TaskStatus::CompletedOntime,
            ..running.clone()
        };
        assert!(matches!(verify_session(&session, &finished), Err(PortError::Integrity(_))));

        let foreign = Task {
            user_id: Uuid::new_v4(),
            ..running
        };
        assert!(matches!(verify_session(&session, &foreign), Err(PortError::Integrity(_))));
    }

    #[test]
    fn elapsed_minutes_rounds_to_nearest_minute() {
        let start = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(29)), 0);
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(30)), 1);
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(30 * 60 + 29)), 30);
        assert_eq!(elapsed_minutes(start, start - Duration::minutes(5)), 0);
    }

    #[test]
    fn exact_estimate_is_on_time() {
        assert_eq!(completion_status(30, 30), TaskStatus::CompletedOntime);
        assert_eq!(completion_status(0, 30), TaskStatus::CompletedOntime);
        assert_eq!(completion_status(31, 30), TaskStatus::CompletedDelayed);
    }
}
