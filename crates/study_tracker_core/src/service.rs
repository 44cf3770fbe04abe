//! crates/study_tracker_core/src/service.rs
//!
//! The `Tracker` orchestrates every core operation. Callers resolve the user
//! once at the request boundary and pass the id explicitly; the tracker holds no
//! per-user state of its own.

use crate::board::{self, ActiveTaskView, FeedSources, LeaderboardEntry, Period, TaskStats, TodayStats};
use crate::day::{self, DayClosing, DayLedger};
use crate::domain::{
    ActiveSession, DailySummary, DayReport, HistoryFilter, PlannedTask, Task, User,
};
use crate::lifecycle;
use crate::planning;
use crate::ports::{Clock, PortError, PortResult, TrackerStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const HISTORY_LIMIT: usize = 200;
pub const PROFILE_SUMMARY_DAYS: usize = 7;
pub const MAX_USERNAME_CHARS: usize = 32;
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;

//=========================================================================================
// Views
//=========================================================================================

/// The caller's own day.
#[derive(Debug, Clone, Serialize)]
pub struct TodayView {
    pub date: NaiveDate,
    pub tasks: Vec<Task>,
    pub day_ended: bool,
    pub active: Option<ActiveTaskView>,
    pub stats: TodayStats,
}

/// Another user's day, as seen by a peer.
#[derive(Debug, Clone, Serialize)]
pub struct PeerDayView {
    pub user_id: Uuid,
    pub display_name: String,
    pub date: NaiveDate,
    pub tasks: Vec<Task>,
    pub day_ended: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub user: User,
    pub all_time: TaskStats,
    pub this_week: TaskStats,
    pub recent_summaries: Vec<DailySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardView {
    pub period: Period,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub entries: Vec<LeaderboardEntry>,
}

//=========================================================================================
// The Tracker
//=========================================================================================

#[derive(Clone)]
pub struct Tracker {
    store: Arc<dyn TrackerStore>,
    clock: Arc<dyn Clock>,
}

impl Tracker {
    pub fn new(store: Arc<dyn TrackerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn TrackerStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // --- Users ---

    /// Creates an account. The password must already be hashed by the caller.
    pub async fn register(
        &self,
        username: &str,
        display_name: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let username = username.trim();
        let display_name = display_name.trim();
        if username.is_empty() || username.chars().count() > MAX_USERNAME_CHARS {
            return Err(PortError::Validation(format!(
                "username must be 1 to {} characters",
                MAX_USERNAME_CHARS
            )));
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(PortError::Validation(
                "username may only contain letters, digits, '.', '_' and '-'".to_string(),
            ));
        }
        if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME_CHARS {
            return Err(PortError::Validation(format!(
                "display_name must be 1 to {} characters",
                MAX_DISPLAY_NAME_CHARS
            )));
        }

        let user = self
            .store
            .create_user(username, display_name, hashed_password, self.clock.now())
            .await?;
        info!(user_id = %user.id, username = %user.username, "Registered user");
        Ok(user)
    }

    pub async fn user(&self, user_id: Uuid) -> PortResult<User> {
        self.store.get_user(user_id).await
    }

    // --- Planning ---

    /// Adds a batch of tasks for today. All or nothing.
    pub async fn batch_add(&self, user_id: Uuid, planned: &[PlannedTask]) -> PortResult<Vec<Task>> {
        let tasks = planning::validate_batch(planned)?;
        let today = self.clock.today();
        self.ensure_day_open(user_id, today).await?;

        let created = self
            .store
            .insert_tasks(user_id, today, &tasks, self.clock.now())
            .await?;
        info!(user_id = %user_id, date = %today, count = created.len(), "Planned tasks");
        Ok(created)
    }

    // --- Lifecycle ---

    pub async fn start(&self, user_id: Uuid, task_id: Uuid) -> PortResult<ActiveSession> {
        let task = self.store.get_task(task_id).await?;
        lifecycle::check_start(&task, user_id)?;
        self.ensure_day_open(user_id, self.clock.today()).await?;

        if let Some(active) = self.store.get_active_session(user_id).await? {
            return Err(PortError::Conflict(format!(
                "Task {} is already in progress",
                active.active_task_id
            )));
        }

        let session = self
            .store
            .start_task(user_id, task_id, self.clock.now())
            .await?;
        info!(user_id = %user_id, task_id = %task_id, "Started task");
        Ok(session)
    }

    pub async fn complete(&self, user_id: Uuid, task_id: Uuid) -> PortResult<Task> {
        let task = self.store.get_task(task_id).await?;
        lifecycle::check_complete(&task, user_id)?;

        let session = self
            .store
            .get_active_session(user_id)
            .await?
            .ok_or_else(|| {
                PortError::Integrity(format!(
                    "task {} is in progress but user {} has no active session",
                    task_id, user_id
                ))
            })
            .and_then(|session| lifecycle::verify_session(&session, &task).map(|_| session))
            .inspect_err(|e| warn!(user_id = %user_id, task_id = %task_id, "{}", e))?;

        let now = self.clock.now();
        let started_at = task.started_at.unwrap_or(session.started_at);
        let actual_minutes = lifecycle::elapsed_minutes(started_at, now);
        let status = lifecycle::completion_status(actual_minutes, task.estimated_minutes);

        let completed = self
            .store
            .complete_task(user_id, task_id, status, actual_minutes, now)
            .await?;
        info!(
            user_id = %user_id,
            task_id = %task_id,
            status = %completed.status,
            actual_minutes,
            "Completed task"
        );
        Ok(completed)
    }

    pub async fn skip(&self, user_id: Uuid, task_id: Uuid) -> PortResult<Task> {
        let task = self.store.get_task(task_id).await?;
        lifecycle::check_skip(&task, user_id)?;

        let skipped = self.store.skip_task(user_id, task_id).await?;
        info!(user_id = %user_id, task_id = %task_id, "Skipped task");
        Ok(skipped)
    }

    // --- Listings ---

    pub async fn list_today(&self, user_id: Uuid) -> PortResult<TodayView> {
        let today = self.clock.today();
        let tasks = self.store.list_tasks_for_day(user_id, today).await?;
        let day_ended = self.store.get_summary(user_id, today).await?.is_some();
        let active = self
            .active_task(user_id)
            .await?
            .map(|(session, task)| ActiveTaskView::new(&session, &task, self.clock.now()));

        Ok(TodayView {
            date: today,
            stats: TodayStats::from_tasks(&tasks),
            tasks,
            day_ended,
            active,
        })
    }

    pub async fn list_for_user(&self, target_id: Uuid) -> PortResult<PeerDayView> {
        let target = self.store.get_user(target_id).await?;
        let today = self.clock.today();
        let tasks = self.store.list_tasks_for_day(target_id, today).await?;
        let day_ended = self.store.get_summary(target_id, today).await?.is_some();

        Ok(PeerDayView {
            user_id: target.id,
            display_name: target.display_name,
            date: today,
            tasks,
            day_ended,
        })
    }

    pub async fn history(&self, user_id: Uuid, filter: &HistoryFilter) -> PortResult<Vec<Task>> {
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(PortError::Validation(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }
        self.store.list_history(user_id, filter, HISTORY_LIMIT).await
    }

    // --- Peer views ---

    /// Everyone except the caller, with their running task and today's counts.
    pub async fn feed(&self, viewer: Uuid) -> PortResult<Vec<board::FeedEntry>> {
        let today = self.clock.today();
        let users = self.store.list_users().await?;
        let today_tasks = self.store.list_tasks_between(None, today, today).await?;

        let mut active = Vec::new();
        for session in self.store.list_active_sessions().await? {
            if session.user_id == viewer {
                continue;
            }
            let task = self.session_task(&session).await?;
            active.push((session, task));
        }

        let ended: HashSet<Uuid> = self
            .store
            .list_summaries_for_date(today)
            .await?
            .into_iter()
            .map(|s| s.user_id)
            .collect();

        Ok(board::feed(
            viewer,
            &FeedSources {
                users: &users,
                today_tasks: &today_tasks,
                active: &active,
                ended: &ended,
                now: self.clock.now(),
            },
        ))
    }

    pub async fn profile(&self, target_id: Uuid) -> PortResult<ProfileView> {
        let user = self.store.get_user(target_id).await?;
        let today = self.clock.today();

        let (from, to) = Period::AllTime.range(today);
        let all_tasks = self.store.list_tasks_between(Some(target_id), from, to).await?;
        let week_from = board::week_start(today);
        let this_week = TaskStats::from_tasks(all_tasks.iter().filter(|t| t.task_date >= week_from));
        let recent_summaries = self
            .store
            .list_recent_summaries(target_id, PROFILE_SUMMARY_DAYS)
            .await?;

        Ok(ProfileView {
            user,
            all_time: TaskStats::from_tasks(&all_tasks),
            this_week,
            recent_summaries,
        })
    }

    pub async fn leaderboard(&self, period: Period) -> PortResult<LeaderboardView> {
        let (from, to) = period.range(self.clock.today());
        let users = self.store.list_users().await?;
        let tasks = self.store.list_tasks_between(None, from, to).await?;

        Ok(LeaderboardView {
            period,
            from,
            to,
            entries: board::leaderboard(&users, &tasks),
        })
    }

    // --- Day lifecycle ---

    /// Ends the caller's day: skips what is left, records the summary and
    /// updates the streak, all in one store transaction.
    pub async fn end_day(&self, user_id: Uuid, report: &DayReport) -> PortResult<DayClosing> {
        let today = self.clock.today();
        self.ensure_day_open(user_id, today).await?;
        day::validate_report(report)?;

        let now = self.clock.now();
        let close = |ledger: DayLedger| day::close_day(&ledger, report, now);
        let closing = self.store.end_day(user_id, today, &close).await?;

        info!(
            user_id = %user_id,
            date = %today,
            tasks_completed = closing.summary.tasks_completed,
            tasks_total = closing.summary.tasks_total,
            success_rate = closing.summary.success_rate,
            current_streak = closing.current_streak,
            "Ended day"
        );
        Ok(closing)
    }

    // --- Helpers ---

    async fn ensure_day_open(&self, user_id: Uuid, date: NaiveDate) -> PortResult<()> {
        if self.store.get_summary(user_id, date).await?.is_some() {
            return Err(PortError::Conflict(format!(
                "Day {} has already been ended",
                date
            )));
        }
        Ok(())
    }

    /// The caller's active session and its task, checked for consistency.
    async fn active_task(&self, user_id: Uuid) -> PortResult<Option<(ActiveSession, Task)>> {
        match self.store.get_active_session(user_id).await? {
            Some(session) => {
                let task = self.session_task(&session).await?;
                Ok(Some((session, task)))
            }
            None => Ok(None),
        }
    }

    async fn session_task(&self, session: &ActiveSession) -> PortResult<Task> {
        let task = match self.store.get_task(session.active_task_id).await {
            Ok(task) => task,
            Err(PortError::NotFound(_)) => {
                let fault = PortError::Integrity(format!(
                    "active session of user {} points at missing task {}",
                    session.user_id, session.active_task_id
                ));
                warn!("{}", fault);
                return Err(fault);
            }
            Err(e) => return Err(e),
        };
        lifecycle::verify_session(session, &task).inspect_err(|e| warn!("{}", e))?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::domain::{ProblemCounts, Subject, TaskStatus};
    use crate::memory::InMemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    struct Harness {
        tracker: Tracker,
        store: Arc<InMemoryStore>,
        clock: Arc<FixedClock>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        // 2024-05-08 is a Wednesday.
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 5, 8, 9, 0, 0).unwrap(),
        ));
        Harness {
            tracker: Tracker::new(store.clone(), clock.clone()),
            store,
            clock,
        }
    }

    async fn user(h: &Harness, name: &str) -> User {
        h.tracker.register(name, name, "hash").await.unwrap()
    }

    fn planned(name: &str, minutes: i64) -> PlannedTask {
        PlannedTask {
            task_name: name.to_string(),
            subject: "Maths".to_string(),
            estimated_minutes: minutes,
        }
    }

    fn report(rating: i64) -> DayReport {
        DayReport {
            problems: ProblemCounts {
                physics: 4,
                ..Default::default()
            },
            topics: "limits".to_string(),
            notes: "good focus".to_string(),
            self_rating: rating,
        }
    }

    /// Starts and completes a task after `minutes` of work.
    async fn work(h: &Harness, user_id: Uuid, task_id: Uuid, minutes: i64) -> Task {
        h.tracker.start(user_id, task_id).await.unwrap();
        h.clock.advance(Duration::minutes(minutes));
        h.tracker.complete(user_id, task_id).await.unwrap()
    }

    #[tokio::test]
    async fn batch_add_creates_pending_tasks_in_order() {
        let h = harness();
        let ada = user(&h, "ada").await;

        let created = h
            .tracker
            .batch_add(ada.id, &[planned("Limits", 30), planned("Series", 45)])
            .await
            .unwrap();
        assert_eq!(created.len(), 2);

        let today = h.tracker.list_today(ada.id).await.unwrap();
        let names: Vec<_> = today.tasks.iter().map(|t| t.task_name.as_str()).collect();
        assert_eq!(names, vec!["Limits", "Series"]);
        assert!(today.tasks.iter().all(|t| t.status == TaskStatus::Pending));
        assert!(today.tasks.iter().all(|t| t.task_date == h.clock.today()));
        assert!(!today.day_ended);
        assert!(today.active.is_none());
    }

    #[tokio::test]
    async fn oversized_batch_persists_nothing() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let batch: Vec<_> = (0..21).map(|i| planned(&format!("t{}", i), 30)).collect();

        let err = h.tracker.batch_add(ada.id, &batch).await.unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        assert!(h.tracker.list_today(ada.id).await.unwrap().tasks.is_empty());
    }

    #[tokio::test]
    async fn invalid_entry_persists_nothing() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let err = h
            .tracker
            .batch_add(ada.id, &[planned("ok", 30), planned("too long", 721)])
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        assert!(h.tracker.list_today(ada.id).await.unwrap().tasks.is_empty());
    }

    #[tokio::test]
    async fn only_one_task_runs_at_a_time() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let tasks = h
            .tracker
            .batch_add(ada.id, &[planned("A", 30), planned("B", 30)])
            .await
            .unwrap();
        let (a, b) = (tasks[0].id, tasks[1].id);

        let session = h.tracker.start(ada.id, a).await.unwrap();
        assert_eq!(session.active_task_id, a);

        let err = h.tracker.start(ada.id, b).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));

        h.clock.advance(Duration::minutes(20));
        h.tracker.complete(ada.id, a).await.unwrap();
        let session = h.tracker.start(ada.id, b).await.unwrap();
        assert_eq!(session.active_task_id, b);

        let today = h.tracker.list_today(ada.id).await.unwrap();
        assert_eq!(today.active.unwrap().task_id, b);
    }

    #[tokio::test]
    async fn completion_compares_actual_against_estimate() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let tasks = h
            .tracker
            .batch_add(ada.id, &[planned("exact", 30), planned("late", 30)])
            .await
            .unwrap();

        let exact = work(&h, ada.id, tasks[0].id, 30).await;
        assert_eq!(exact.status, TaskStatus::CompletedOntime);
        assert_eq!(exact.actual_minutes, Some(30));

        let late = work(&h, ada.id, tasks[1].id, 31).await;
        assert_eq!(late.status, TaskStatus::CompletedDelayed);
        assert_eq!(late.actual_minutes, Some(31));

        assert!(h.store.get_active_session(ada.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transitions_reject_wrong_states_and_foreign_tasks() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let bo = user(&h, "bo").await;
        let tasks = h
            .tracker
            .batch_add(ada.id, &[planned("A", 30), planned("B", 30)])
            .await
            .unwrap();
        let a = tasks[0].id;

        assert!(matches!(h.tracker.complete(ada.id, a).await, Err(PortError::Conflict(_))));
        assert!(matches!(h.tracker.start(bo.id, a).await, Err(PortError::NotFound(_))));
        assert!(matches!(h.tracker.skip(bo.id, a).await, Err(PortError::NotFound(_))));
        assert!(matches!(
            h.tracker.start(ada.id, Uuid::new_v4()).await,
            Err(PortError::NotFound(_))
        ));

        work(&h, ada.id, a, 10).await;
        assert!(matches!(h.tracker.start(ada.id, a).await, Err(PortError::Conflict(_))));
        assert!(matches!(h.tracker.skip(ada.id, a).await, Err(PortError::Conflict(_))));
        assert!(matches!(h.tracker.complete(ada.id, a).await, Err(PortError::Conflict(_))));

        let b = tasks[1].id;
        h.tracker.skip(ada.id, b).await.unwrap();
        assert!(matches!(h.tracker.skip(ada.id, b).await, Err(PortError::Conflict(_))));
        assert!(matches!(h.tracker.start(ada.id, b).await, Err(PortError::Conflict(_))));
    }

    #[tokio::test]
    async fn skipping_the_running_task_clears_the_session() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let tasks = h
            .tracker
            .batch_add(ada.id, &[planned("A", 30), planned("B", 30)])
            .await
            .unwrap();

        h.tracker.start(ada.id, tasks[0].id).await.unwrap();
        h.tracker.skip(ada.id, tasks[1].id).await.unwrap();
        assert!(h.store.get_active_session(ada.id).await.unwrap().is_some());

        let skipped = h.tracker.skip(ada.id, tasks[0].id).await.unwrap();
        assert_eq!(skipped.status, TaskStatus::Skipped);
        assert!(h.store.get_active_session(ada.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn end_day_summarizes_and_starts_a_streak() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let tasks = h
            .tracker
            .batch_add(
                ada.id,
                &[planned("A", 30), planned("B", 30), planned("C", 30)],
            )
            .await
            .unwrap();
        work(&h, ada.id, tasks[0].id, 25).await;
        work(&h, ada.id, tasks[1].id, 20).await;
        h.tracker.skip(ada.id, tasks[2].id).await.unwrap();

        let closing = h.tracker.end_day(ada.id, &report(4)).await.unwrap();
        assert_eq!(closing.summary.tasks_completed, 2);
        assert_eq!(closing.summary.tasks_total, 3);
        assert_eq!(closing.summary.success_rate, 67);
        assert_eq!(closing.summary.total_study_hours, 0.8);
        assert_eq!(closing.current_streak, 1);

        let stored = h.tracker.user(ada.id).await.unwrap();
        assert_eq!(stored.current_streak, 1);
        assert_eq!(stored.best_streak, 1);
        assert_eq!(stored.last_active_date, Some(h.clock.today()));
        assert!(h.tracker.list_today(ada.id).await.unwrap().day_ended);
    }

    #[tokio::test]
    async fn end_day_force_skips_open_tasks_and_clears_the_session() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let tasks = h
            .tracker
            .batch_add(ada.id, &[planned("running", 30), planned("waiting", 30)])
            .await
            .unwrap();
        h.tracker.start(ada.id, tasks[0].id).await.unwrap();

        let closing = h.tracker.end_day(ada.id, &report(2)).await.unwrap();
        assert_eq!(closing.summary.tasks_completed, 0);
        assert_eq!(closing.summary.success_rate, 0);
        assert_eq!(closing.current_streak, 0);

        let today = h.tracker.list_today(ada.id).await.unwrap();
        assert!(today.tasks.iter().all(|t| t.status == TaskStatus::Skipped));
        assert!(h.store.get_active_session(ada.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ending_a_day_twice_conflicts_and_blocks_planning() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let tasks = h.tracker.batch_add(ada.id, &[planned("A", 30)]).await.unwrap();

        h.tracker.end_day(ada.id, &report(3)).await.unwrap();
        assert!(matches!(
            h.tracker.end_day(ada.id, &report(3)).await,
            Err(PortError::Conflict(_))
        ));
        assert_eq!(h.store.list_recent_summaries(ada.id, 10).await.unwrap().len(), 1);

        assert!(matches!(
            h.tracker.batch_add(ada.id, &[planned("late idea", 30)]).await,
            Err(PortError::Conflict(_))
        ));
        assert!(matches!(
            h.tracker.start(ada.id, tasks[0].id).await,
            Err(PortError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn invalid_rating_leaves_the_day_open() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let tasks = h.tracker.batch_add(ada.id, &[planned("A", 30)]).await.unwrap();
        h.tracker.start(ada.id, tasks[0].id).await.unwrap();

        assert!(matches!(
            h.tracker.end_day(ada.id, &report(6)).await,
            Err(PortError::Validation(_))
        ));
        let today = h.tracker.list_today(ada.id).await.unwrap();
        assert!(!today.day_ended);
        assert_eq!(today.tasks[0].status, TaskStatus::InProgress);
        assert!(today.active.is_some());
    }

    #[tokio::test]
    async fn streak_grows_across_consecutive_productive_days() {
        let h = harness();
        let ada = user(&h, "ada").await;

        for day in 1..=4u32 {
            let tasks = h.tracker.batch_add(ada.id, &[planned("daily", 30)]).await.unwrap();
            work(&h, ada.id, tasks[0].id, 15).await;
            let closing = h.tracker.end_day(ada.id, &report(5)).await.unwrap();
            assert_eq!(closing.current_streak, day);
            assert!(closing.best_streak >= closing.current_streak);
            h.clock.advance(Duration::days(1));
        }

        // An idle day resets, the next productive one restarts at 1.
        h.tracker.end_day(ada.id, &report(1)).await.unwrap();
        h.clock.advance(Duration::days(1));
        let tasks = h.tracker.batch_add(ada.id, &[planned("back", 30)]).await.unwrap();
        work(&h, ada.id, tasks[0].id, 15).await;
        let closing = h.tracker.end_day(ada.id, &report(4)).await.unwrap();
        assert_eq!(closing.current_streak, 1);
        assert_eq!(closing.best_streak, 4);
    }

    #[tokio::test]
    async fn broken_active_session_is_an_integrity_fault() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let tasks = h.tracker.batch_add(ada.id, &[planned("A", 30)]).await.unwrap();
        h.store
            .force_active_session(ActiveSession {
                user_id: ada.id,
                active_task_id: tasks[0].id,
                started_at: h.clock.now(),
            })
            .await;

        assert!(matches!(h.tracker.list_today(ada.id).await, Err(PortError::Integrity(_))));
        let bo = user(&h, "bo").await;
        assert!(matches!(h.tracker.feed(bo.id).await, Err(PortError::Integrity(_))));
    }

    #[tokio::test]
    async fn feed_shows_peers_with_live_elapsed_time() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let bo = user(&h, "bo").await;
        let tasks = h.tracker.batch_add(bo.id, &[planned("Vectors", 60)]).await.unwrap();
        h.tracker.start(bo.id, tasks[0].id).await.unwrap();
        h.clock.advance(Duration::minutes(7));

        let feed = h.tracker.feed(ada.id).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].user_id, bo.id);
        let active = feed[0].active.as_ref().unwrap();
        assert_eq!(active.task_name, "Vectors");
        assert_eq!(active.elapsed_minutes, 7);
        assert_eq!(active.subject, Subject::Maths);
        assert!(!feed[0].day_ended);

        let peer = h.tracker.list_for_user(bo.id).await.unwrap();
        assert_eq!(peer.display_name, "bo");
        assert_eq!(peer.tasks.len(), 1);
        assert!(matches!(
            h.tracker.list_for_user(Uuid::new_v4()).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn leaderboard_and_profile_use_ontime_share() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let bo = user(&h, "bo").await;
        let _idle = user(&h, "idle").await;

        let a = h
            .tracker
            .batch_add(ada.id, &[planned("a1", 30), planned("a2", 30), planned("a3", 30)])
            .await
            .unwrap();
        work(&h, ada.id, a[0].id, 10).await;
        work(&h, ada.id, a[1].id, 45).await;

        let b = h.tracker.batch_add(bo.id, &[planned("b1", 30)]).await.unwrap();
        work(&h, bo.id, b[0].id, 10).await;

        // Both have one on-time task; Bo's share (100%) beats Ada's (33%).
        let board = h.tracker.leaderboard(Period::Weekly).await.unwrap();
        let order: Vec<_> = board.entries.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(order, vec!["bo", "ada", "idle"]);
        assert_eq!(board.entries[1].stats.success_rate, 33);
        assert_eq!(board.entries[2].stats.total_tasks, 0);

        let profile = h.tracker.profile(ada.id).await.unwrap();
        assert_eq!(profile.all_time.total_tasks, 3);
        assert_eq!(profile.all_time.success_rate, 33);
        assert_eq!(profile.this_week, profile.all_time);
        assert!(profile.recent_summaries.is_empty());
    }

    #[tokio::test]
    async fn history_is_newest_first_and_filterable() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let day_one = h.clock.today();

        h.tracker
            .batch_add(ada.id, &[planned("first", 30), planned("second", 30)])
            .await
            .unwrap();
        h.clock.advance(Duration::days(1));
        h.tracker
            .batch_add(
                ada.id,
                &[PlannedTask {
                    task_name: "titration".to_string(),
                    subject: "Chemistry".to_string(),
                    estimated_minutes: 40,
                }],
            )
            .await
            .unwrap();

        let all = h.tracker.history(ada.id, &HistoryFilter::default()).await.unwrap();
        let names: Vec<_> = all.iter().map(|t| t.task_name.as_str()).collect();
        assert_eq!(names, vec!["titration", "first", "second"]);

        let chem = h
            .tracker
            .history(
                ada.id,
                &HistoryFilter {
                    subject: Some(Subject::Chemistry),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(chem.len(), 1);

        let first_day = h
            .tracker
            .history(
                ada.id,
                &HistoryFilter {
                    start_date: Some(day_one),
                    end_date: Some(day_one),
                    subject: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(first_day.len(), 2);

        let backwards = HistoryFilter {
            start_date: Some(h.clock.today()),
            end_date: Some(day_one),
            subject: None,
        };
        assert!(matches!(
            h.tracker.history(ada.id, &backwards).await,
            Err(PortError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn registration_validates_and_rejects_duplicates() {
        let h = harness();
        user(&h, "ada").await;
        assert!(matches!(
            h.tracker.register("ADA", "Other Ada", "hash").await,
            Err(PortError::Conflict(_))
        ));
        assert!(matches!(
            h.tracker.register("  ", "Nobody", "hash").await,
            Err(PortError::Validation(_))
        ));
        assert!(matches!(
            h.tracker.register("has space", "Nobody", "hash").await,
            Err(PortError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn registration_uses_the_injected_clock() {
        let h = harness();
        let ada = user(&h, "ada").await;
        assert_eq!(ada.created_at, h.clock.now());
    }

    #[tokio::test]
    async fn summary_success_rate_counts_only_on_time_work() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let tasks = h
            .tracker
            .batch_add(ada.id, &[planned("quick", 30), planned("slow", 30)])
            .await
            .unwrap();
        work(&h, ada.id, tasks[0].id, 30).await;
        let late = work(&h, ada.id, tasks[1].id, 31).await;
        assert_eq!(late.status, TaskStatus::CompletedDelayed);

        let closing = h.tracker.end_day(ada.id, &report(3)).await.unwrap();
        assert_eq!(closing.summary.tasks_completed, 2);
        assert_eq!(closing.summary.success_rate, 50);

        let profile = h.tracker.profile(ada.id).await.unwrap();
        assert_eq!(profile.all_time.success_rate, closing.summary.success_rate);
        let board = h.tracker.leaderboard(Period::Weekly).await.unwrap();
        assert_eq!(board.entries[0].stats.success_rate, closing.summary.success_rate);
    }

    #[tokio::test]
    async fn a_timer_left_running_past_midnight_is_closed_with_the_next_day() {
        let h = harness();
        let ada = user(&h, "ada").await;
        h.clock.set(Utc.with_ymd_and_hms(2024, 5, 8, 22, 0, 0).unwrap());
        let tasks = h.tracker.batch_add(ada.id, &[planned("late night", 60)]).await.unwrap();
        h.tracker.start(ada.id, tasks[0].id).await.unwrap();

        h.clock.advance(Duration::hours(3));
        let closing = h.tracker.end_day(ada.id, &report(2)).await.unwrap();
        assert_eq!(closing.summary.summary_date, NaiveDate::from_ymd_opt(2024, 5, 9).unwrap());
        assert_eq!(closing.summary.tasks_total, 0);

        let stale = h.store.get_task(tasks[0].id).await.unwrap();
        assert_eq!(stale.status, TaskStatus::Skipped);
        assert!(h.store.get_active_session(ada.id).await.unwrap().is_none());
        assert!(matches!(
            h.tracker.complete(ada.id, tasks[0].id).await,
            Err(PortError::Conflict(_))
        ));
        assert!(h.tracker.feed(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_starts_leave_exactly_one_timer() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let tasks = h
            .tracker
            .batch_add(ada.id, &[planned("A", 30), planned("B", 30)])
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            h.tracker.start(ada.id, tasks[0].id),
            h.tracker.start(ada.id, tasks[1].id),
        );
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(PortError::Conflict(_))))
                .count(),
            1
        );

        let session = h.store.get_active_session(ada.id).await.unwrap().unwrap();
        let today = h.tracker.list_today(ada.id).await.unwrap();
        let running: Vec<_> = today
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .collect();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, session.active_task_id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_end_days_write_one_summary() {
        let h = harness();
        let ada = user(&h, "ada").await;
        let tasks = h.tracker.batch_add(ada.id, &[planned("A", 30)]).await.unwrap();
        work(&h, ada.id, tasks[0].id, 20).await;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = h.tracker.clone();
                tokio::spawn(async move { tracker.end_day(ada.id, &report(4)).await })
            })
            .collect();
        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(PortError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }
        assert_eq!(ok, 1);

        let summaries = h.store.list_summaries_for_date(h.clock.today()).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(h.tracker.user(ada.id).await.unwrap().current_streak, 1);
    }
}
