//! crates/study_tracker_core/src/board.rs
//!
//! Read-only projections for the leaderboard, the peer activity feed and the
//! profile page. Everything here is recomputed from task rows on each call.

use crate::day::{percent, study_hours, DayStats};
use crate::domain::{ActiveSession, Subject, Task, User};
use crate::lifecycle::elapsed_minutes;
use crate::ports::PortError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Periods
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Period {
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "all-time")]
    AllTime,
}

impl Period {
    /// Inclusive `task_date` range ending today.
    pub fn range(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let from = match self {
            Period::Weekly => week_start(today),
            Period::Monthly => today.with_day(1).unwrap_or(today),
            Period::AllTime => all_time_start(),
        };
        (from, today)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::AllTime => "all-time",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            "all-time" | "alltime" | "all" => Ok(Period::AllTime),
            other => Err(PortError::Validation(format!(
                "unknown period '{}', expected weekly, monthly or all-time",
                other
            ))),
        }
    }
}

/// Monday of the week containing `day`.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - chrono::Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

pub fn all_time_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

//=========================================================================================
// Per-user totals
//=========================================================================================

/// Totals over a span of days. Unlike a day summary, the success rate here is
/// on-time completions over all tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TaskStats {
    pub total_tasks: u32,
    pub ontime: u32,
    pub delayed: u32,
    pub total_minutes: i64,
    pub study_hours: f64,
    pub success_rate: u32,
}

impl TaskStats {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        Self::from_day_stats(&DayStats::from_tasks(tasks))
    }

    fn from_day_stats(stats: &DayStats) -> Self {
        Self {
            total_tasks: stats.total,
            ontime: stats.ontime,
            delayed: stats.delayed,
            total_minutes: stats.total_minutes,
            study_hours: study_hours(stats.total_minutes),
            success_rate: percent(stats.ontime, stats.total),
        }
    }

    /// Orders by on-time share without rounding. Empty totals rank as 0.
    fn cmp_ontime_share(&self, other: &Self) -> Ordering {
        let lhs = u64::from(self.ontime) * u64::from(other.total_tasks.max(1));
        let rhs = u64::from(other.ontime) * u64::from(self.total_tasks.max(1));
        lhs.cmp(&rhs)
    }
}

//=========================================================================================
// Leaderboard
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: Uuid,
    pub display_name: String,
    pub current_streak: u32,
    pub best_streak: u32,
    #[serde(flatten)]
    pub stats: TaskStats,
}

/// Ranks every user, including those without tasks in `tasks`.
///
/// On-time count descending, then on-time share descending, then display name.
pub fn leaderboard(users: &[User], tasks: &[Task]) -> Vec<LeaderboardEntry> {
    let mut by_user: HashMap<Uuid, Vec<&Task>> = HashMap::new();
    for task in tasks {
        by_user.entry(task.user_id).or_default().push(task);
    }

    let mut rows: Vec<(&User, TaskStats)> = users
        .iter()
        .map(|u| {
            let stats = by_user
                .get(&u.id)
                .map(|ts| TaskStats::from_tasks(ts.iter().copied()))
                .unwrap_or_default();
            (u, stats)
        })
        .collect();

    rows.sort_by(|(ua, a), (ub, b)| {
        b.ontime
            .cmp(&a.ontime)
            .then_with(|| b.cmp_ontime_share(a))
            .then_with(|| ua.display_name.cmp(&ub.display_name))
    });

    rows.into_iter()
        .enumerate()
        .map(|(i, (user, stats))| LeaderboardEntry {
            rank: i as u32 + 1,
            user_id: user.id,
            display_name: user.display_name.clone(),
            current_streak: user.current_streak,
            best_streak: user.best_streak,
            stats,
        })
        .collect()
}

//=========================================================================================
// Activity feed
//=========================================================================================

/// What peers see of a running task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveTaskView {
    pub task_id: Uuid,
    pub task_name: String,
    pub subject: Subject,
    pub estimated_minutes: i64,
    pub started_at: DateTime<Utc>,
    pub elapsed_minutes: i64,
}

impl ActiveTaskView {
    pub fn new(session: &ActiveSession, task: &Task, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id,
            task_name: task.task_name.clone(),
            subject: task.subject,
            estimated_minutes: task.estimated_minutes,
            started_at: session.started_at,
            elapsed_minutes: elapsed_minutes(session.started_at, now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayStats {
    #[serde(flatten)]
    pub counts: DayStats,
    pub completed: u32,
    pub study_hours: f64,
    pub success_rate: u32,
}

impl TodayStats {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let counts = DayStats::from_tasks(tasks);
        Self {
            completed: counts.completed(),
            study_hours: counts.study_hours(),
            success_rate: counts.success_rate(),
            counts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntry {
    pub user_id: Uuid,
    pub display_name: String,
    pub current_streak: u32,
    pub active: Option<ActiveTaskView>,
    pub today: TodayStats,
    pub day_ended: bool,
}

/// Everything the feed is built from, read at one point in time.
pub struct FeedSources<'a> {
    pub users: &'a [User],
    pub today_tasks: &'a [Task],
    /// Active sessions paired with the task each one references.
    pub active: &'a [(ActiveSession, Task)],
    pub ended: &'a HashSet<Uuid>,
    pub now: DateTime<Utc>,
}

/// One entry per user except `viewer`. Users with a running task come first.
pub fn feed(viewer: Uuid, sources: &FeedSources<'_>) -> Vec<FeedEntry> {
    let active_by_user: HashMap<Uuid, &(ActiveSession, Task)> = sources
        .active
        .iter()
        .map(|pair| (pair.0.user_id, pair))
        .collect();

    let mut entries: Vec<FeedEntry> = sources
        .users
        .iter()
        .filter(|u| u.id != viewer)
        .map(|u| FeedEntry {
            user_id: u.id,
            display_name: u.display_name.clone(),
            current_streak: u.current_streak,
            active: active_by_user
                .get(&u.id)
                .map(|(session, task)| ActiveTaskView::new(session, task, sources.now)),
            today: TodayStats::from_tasks(sources.today_tasks.iter().filter(|t| t.user_id == u.id)),
            day_ended: sources.ended.contains(&u.id),
        })
        .collect();

    entries.sort_by(|a, b| {
        b.active
            .is_some()
            .cmp(&a.active.is_some())
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
    entries
}
