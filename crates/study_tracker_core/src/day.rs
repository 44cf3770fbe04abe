//! crates/study_tracker_core/src/day.rs
//!
//! Daily accounting: per-day task aggregates and the end-of-day closing that
//! turns a day's tasks into an immutable `DailySummary` plus a streak update.

use crate::domain::{DailySummary, DayReport, Task, TaskStatus, User};
use crate::ports::{PortError, PortResult};
use crate::streak::{self, Streak};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

pub const MIN_SELF_RATING: i64 = 1;
pub const MAX_SELF_RATING: i64 = 5;

//=========================================================================================
// Aggregation
//=========================================================================================

/// `round(part / whole * 100)`, or 0 for an empty whole.
pub fn percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    (f64::from(part) / f64::from(whole) * 100.0).round() as u32
}

/// Minutes to hours, rounded to one decimal.
pub fn study_hours(total_minutes: i64) -> f64 {
    (total_minutes as f64 / 60.0 * 10.0).round() / 10.0
}

/// Counts over one user's tasks for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DayStats {
    pub total: u32,
    pub pending: u32,
    pub in_progress: u32,
    pub ontime: u32,
    pub delayed: u32,
    pub skipped: u32,
    /// Sum of `actual_minutes`, missing values counted as 0.
    pub total_minutes: i64,
}

impl DayStats {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        tasks.into_iter().fold(Self::default(), |mut stats, task| {
            stats.total += 1;
            stats.total_minutes += task.actual_minutes.unwrap_or(0);
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::CompletedOntime => stats.ontime += 1,
                TaskStatus::CompletedDelayed => stats.delayed += 1,
                TaskStatus::Skipped => stats.skipped += 1,
            }
            stats
        })
    }

    pub fn completed(&self) -> u32 {
        self.ontime + self.delayed
    }

    /// On-time completions over total, the same rate profiles and the leaderboard report.
    pub fn success_rate(&self) -> u32 {
        percent(self.ontime, self.total)
    }

    pub fn study_hours(&self) -> f64 {
        study_hours(self.total_minutes)
    }
}

//=========================================================================================
// Closing a day
//=========================================================================================

/// Everything the closing needs, read inside the store's end-of-day transaction
/// after the open tasks were force-skipped.
#[derive(Debug, Clone)]
pub struct DayLedger {
    pub user: User,
    pub date: NaiveDate,
    pub tasks: Vec<Task>,
    pub yesterday: Option<DailySummary>,
}

/// What the store persists to finish the day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayClosing {
    pub summary: DailySummary,
    pub current_streak: u32,
    pub best_streak: u32,
}

pub fn validate_report(report: &DayReport) -> PortResult<()> {
    if !(MIN_SELF_RATING..=MAX_SELF_RATING).contains(&report.self_rating) {
        return Err(PortError::Validation(format!(
            "self_rating must be between {} and {}",
            MIN_SELF_RATING, MAX_SELF_RATING
        )));
    }
    Ok(())
}

/// Builds the summary and the streak update for a finished day.
pub fn close_day(ledger: &DayLedger, report: &DayReport, now: DateTime<Utc>) -> PortResult<DayClosing> {
    validate_report(report)?;

    if let Some(open) = ledger.tasks.iter().find(|t| !t.status.is_terminal()) {
        return Err(PortError::Integrity(format!(
            "task {} is still {} while closing {}",
            open.id, open.status, ledger.date
        )));
    }

    let stats = DayStats::from_tasks(&ledger.tasks);
    let tasks_completed = stats.completed();

    let streak = streak::advance(
        ledger.yesterday.as_ref().map(|s| s.tasks_completed),
        tasks_completed,
        Streak {
            current: ledger.user.current_streak,
            best: ledger.user.best_streak,
        },
    );

    let summary = DailySummary {
        user_id: ledger.user.id,
        summary_date: ledger.date,
        problems: report.problems,
        topics: report.topics.trim().to_string(),
        notes: report.notes.trim().to_string(),
        self_rating: report.self_rating,
        tasks_completed,
        tasks_total: stats.total,
        success_rate: stats.success_rate(),
        total_study_hours: stats.study_hours(),
        created_at: now,
    };

    Ok(DayClosing {
        summary,
        current_streak: streak.current,
        best_streak: streak.best,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProblemCounts, Subject};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
    }

    fn user(current: u32, best: u32) -> User {
        User {
            id: Uuid::new_v4(),
            username: "ada".to_string(),
            display_name: "Ada".to_string(),
            current_streak: current,
            best_streak: best,
            last_active_date: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn task(status: TaskStatus, actual: Option<i64>) -> Task {
        Task {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            task_name: "Stoichiometry".to_string(),
            subject: Subject::Chemistry,
            estimated_minutes: 30,
            task_date: date(),
            status,
            started_at: None,
            completed_at: None,
            actual_minutes: actual,
            sequence: 0,
            created_at: Utc.with_ymd_and_hms(2024, 5, 6, 7, 0, 0).unwrap(),
        }
    }

    fn report(rating: i64) -> DayReport {
        DayReport {
            problems: ProblemCounts {
                maths: 12,
                ..Default::default()
            },
            topics: " vectors ".to_string(),
            notes: String::new(),
            self_rating: rating,
        }
    }

    fn summary(completed: u32) -> DailySummary {
        DailySummary {
            user_id: Uuid::new_v4(),
            summary_date: date().pred_opt().unwrap(),
            problems: ProblemCounts::default(),
            topics: String::new(),
            notes: String::new(),
            self_rating: 3,
            tasks_completed: completed,
            tasks_total: completed,
            success_rate: 100,
            total_study_hours: 1.0,
            created_at: Utc.with_ymd_and_hms(2024, 5, 5, 22, 0, 0).unwrap(),
        }
    }

    #[test]
    fn percent_and_hours_round() {
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(1, 2), 50);
        assert_eq!(percent(0, 0), 0);
        assert_eq!(study_hours(0), 0.0);
        assert_eq!(study_hours(95), 1.6);
        assert_eq!(study_hours(3), 0.1);
    }

    #[test]
    fn stats_count_every_status_and_treat_missing_minutes_as_zero() {
        let tasks = vec![
            task(TaskStatus::CompletedOntime, Some(25)),
            task(TaskStatus::CompletedDelayed, Some(50)),
            task(TaskStatus::Skipped, None),
            task(TaskStatus::Pending, None),
            task(TaskStatus::InProgress, None),
        ];
        let stats = DayStats::from_tasks(&tasks);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.total_minutes, 75);
        assert_eq!(stats.success_rate(), 20);
        assert_eq!(stats.study_hours(), 1.3);
    }

    #[test]
    fn closing_a_first_day_starts_the_streak() {
        let ledger = DayLedger {
            user: user(0, 0),
            date: date(),
            tasks: vec![
                task(TaskStatus::CompletedOntime, Some(20)),
                task(TaskStatus::CompletedOntime, Some(40)),
                task(TaskStatus::Skipped, None),
            ],
            yesterday: None,
        };
        let closing = close_day(&ledger, &report(4), Utc::now()).unwrap();

        assert_eq!(closing.summary.tasks_completed, 2);
        assert_eq!(closing.summary.tasks_total, 3);
        assert_eq!(closing.summary.success_rate, 67);
        assert_eq!(closing.summary.total_study_hours, 1.0);
        assert_eq!(closing.summary.topics, "vectors");
        assert_eq!(closing.summary.problems.maths, 12);
        assert_eq!(closing.current_streak, 1);
        assert_eq!(closing.best_streak, 1);
    }

    #[test]
    fn closing_after_a_productive_yesterday_extends_the_streak() {
        let ledger = DayLedger {
            user: user(3, 3),
            date: date(),
            tasks: vec![task(TaskStatus::CompletedDelayed, Some(45))],
            yesterday: Some(summary(2)),
        };
        let closing = close_day(&ledger, &report(3), Utc::now()).unwrap();
        assert_eq!(closing.summary.tasks_completed, 1);
        assert_eq!(closing.summary.success_rate, 0);
        assert_eq!(closing.current_streak, 4);
        assert_eq!(closing.best_streak, 4);
    }

    #[test]
    fn late_completions_count_as_completed_but_not_as_success() {
        let ledger = DayLedger {
            user: user(0, 0),
            date: date(),
            tasks: vec![
                task(TaskStatus::CompletedOntime, Some(30)),
                task(TaskStatus::CompletedDelayed, Some(70)),
                task(TaskStatus::Skipped, None),
            ],
            yesterday: None,
        };
        let closing = close_day(&ledger, &report(4), Utc::now()).unwrap();
        assert_eq!(closing.summary.tasks_completed, 2);
        assert_eq!(closing.summary.success_rate, 33);
        assert_eq!(closing.summary.total_study_hours, 1.7);
        assert_eq!(closing.current_streak, 1);
    }

    #[test]
    fn empty_day_resets_the_streak_without_dividing_by_zero() {
        let ledger = DayLedger {
            user: user(5, 6),
            date: date(),
            tasks: vec![],
            yesterday: Some(summary(1)),
        };
        let closing = close_day(&ledger, &report(1), Utc::now()).unwrap();
        assert_eq!(closing.summary.success_rate, 0);
        assert_eq!(closing.current_streak, 0);
        assert_eq!(closing.best_streak, 6);
    }

    #[test]
    fn rating_must_be_one_to_five() {
        let ledger = DayLedger {
            user: user(0, 0),
            date: date(),
            tasks: vec![],
            yesterday: None,
        };
        assert!(matches!(close_day(&ledger, &report(0), Utc::now()), Err(PortError::Validation(_))));
        assert!(matches!(close_day(&ledger, &report(6), Utc::now()), Err(PortError::Validation(_))));
    }

    #[test]
    fn open_tasks_in_the_ledger_are_an_integrity_fault() {
        let ledger = DayLedger {
            user: user(0, 0),
            date: date(),
            tasks: vec![task(TaskStatus::Pending, None)],
            yesterday: None,
        };
        assert!(matches!(close_day(&ledger, &report(3), Utc::now()), Err(PortError::Integrity(_))));
    }
}
