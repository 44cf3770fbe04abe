//! crates/study_tracker_core/src/domain.rs
//!
//! Defines the pure, core data structures for the study tracker.
//! These structs are independent of any database or wire format; the web layer
//! serializes some of them directly, so they derive `Serialize`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Users
//=========================================================================================

/// A registered user - used throughout the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_active_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub username: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Tasks
//=========================================================================================

/// The subject a task is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Subject {
    Maths,
    Physics,
    Chemistry,
    Other,
}

impl Subject {
    pub const ALL: [Subject; 4] = [
        Subject::Maths,
        Subject::Physics,
        Subject::Chemistry,
        Subject::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Maths => "Maths",
            Subject::Physics => "Physics",
            Subject::Chemistry => "Chemistry",
            Subject::Other => "Other",
        }
    }

    /// Parses a subject name, case-insensitively. Anything unknown becomes `Other`.
    pub fn coerce(raw: &str) -> Subject {
        let raw = raw.trim();
        Subject::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(raw))
            .unwrap_or(Subject::Other)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task. See `lifecycle` for the allowed transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    CompletedOntime,
    CompletedDelayed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::CompletedOntime => "completed_ontime",
            TaskStatus::CompletedDelayed => "completed_delayed",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::CompletedOntime | TaskStatus::CompletedDelayed | TaskStatus::Skipped
        )
    }

    pub fn is_completed(self) -> bool {
        matches!(self, TaskStatus::CompletedOntime | TaskStatus::CompletedDelayed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed_ontime" => Ok(TaskStatus::CompletedOntime),
            "completed_delayed" => Ok(TaskStatus::CompletedDelayed),
            "skipped" => Ok(TaskStatus::Skipped),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// A single planned study task. Tasks are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub task_name: String,
    pub subject: Subject,
    pub estimated_minutes: i64,
    pub task_date: NaiveDate,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_minutes: Option<i64>,
    /// Monotonic creation order; listings sort on it.
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

/// A task entry as submitted by the caller, before validation.
#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub task_name: String,
    pub subject: String,
    pub estimated_minutes: i64,
}

/// A validated task ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub task_name: String,
    pub subject: Subject,
    pub estimated_minutes: i64,
}

/// Optional filters for the task history listing. Date bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub subject: Option<Subject>,
}

//=========================================================================================
// Active sessions
//=========================================================================================

/// The single task a user is currently timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSession {
    pub user_id: Uuid,
    pub active_task_id: Uuid,
    pub started_at: DateTime<Utc>,
}

//=========================================================================================
// Daily summaries
//=========================================================================================

/// Self-reported problem counts, one per subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProblemCounts {
    pub maths: u32,
    pub physics: u32,
    pub chemistry: u32,
    pub other: u32,
}

/// What the user reports when ending their day.
#[derive(Debug, Clone)]
pub struct DayReport {
    pub problems: ProblemCounts,
    pub topics: String,
    pub notes: String,
    pub self_rating: i64,
}

/// The immutable record written once per user per day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub user_id: Uuid,
    pub summary_date: NaiveDate,
    pub problems: ProblemCounts,
    pub topics: String,
    pub notes: String,
    pub self_rating: i64,
    pub tasks_completed: u32,
    pub tasks_total: u32,
    pub success_rate: u32,
    pub total_study_hours: f64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_coercion_is_case_insensitive_and_falls_back_to_other() {
        assert_eq!(Subject::coerce("maths"), Subject::Maths);
        assert_eq!(Subject::coerce(" PHYSICS "), Subject::Physics);
        assert_eq!(Subject::coerce("Chemistry"), Subject::Chemistry);
        assert_eq!(Subject::coerce("Biology"), Subject::Other);
        assert_eq!(Subject::coerce(""), Subject::Other);
    }

    #[test]
    fn status_names_parse_back() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::CompletedOntime,
            TaskStatus::CompletedDelayed,
            TaskStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
        }
        assert!("paused".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(TaskStatus::CompletedOntime.is_terminal());
        assert!(TaskStatus::CompletedDelayed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
    }
}
