//! crates/study_tracker_core/src/memory.rs
//!
//! An in-memory `TrackerStore`. All tables live behind one async mutex, so every
//! port method runs as if it were a serializable transaction. Used by the test
//! suites and by the service's `memory` backend.

use crate::day::{DayClosing, DayLedger};
use crate::domain::{
    ActiveSession, AuthSession, DailySummary, HistoryFilter, NewTask, Task, TaskStatus, User,
    UserCredentials,
};
use crate::ports::{DayCloser, PortError, PortResult, TrackerStore};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

//=========================================================================================
// Tables
//=========================================================================================

#[derive(Clone)]
struct UserRow {
    user: User,
    hashed_password: String,
}

#[derive(Default)]
struct Tables {
    users: Vec<UserRow>,
    auth_sessions: HashMap<String, AuthSession>,
    /// Kept in insertion order; `Task::sequence` mirrors the index.
    tasks: Vec<Task>,
    active_sessions: HashMap<Uuid, ActiveSession>,
    summaries: Vec<DailySummary>,
}

impl Tables {
    fn user_mut(&mut self, user_id: Uuid) -> PortResult<&mut UserRow> {
        self.users
            .iter_mut()
            .find(|row| row.user.id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    fn task_index(&self, user_id: Uuid, task_id: Uuid) -> PortResult<usize> {
        self.tasks
            .iter()
            .position(|t| t.id == task_id && t.user_id == user_id)
            .ok_or_else(|| PortError::NotFound(format!("Task {} not found", task_id)))
    }

    fn has_summary(&self, user_id: Uuid, date: NaiveDate) -> bool {
        self.summaries
            .iter()
            .any(|s| s.user_id == user_id && s.summary_date == date)
    }
}

//=========================================================================================
// The Store
//=========================================================================================

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a user's active session without any checks. Only meant for
    /// tests that need to fabricate inconsistent state.
    pub async fn force_active_session(&self, session: ActiveSession) {
        let mut tables = self.tables.lock().await;
        tables.active_sessions.insert(session.user_id, session);
    }
}

#[async_trait]
impl TrackerStore for InMemoryStore {
    async fn create_user(
        &self,
        username: &str,
        display_name: &str,
        hashed_password: &str,
        created_at: DateTime<Utc>,
    ) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        if tables
            .users
            .iter()
            .any(|row| row.user.username.eq_ignore_ascii_case(username))
        {
            return Err(PortError::Conflict(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            display_name: display_name.to_string(),
            current_streak: 0,
            best_streak: 0,
            last_active_date: None,
            created_at,
        };
        tables.users.push(UserRow {
            user: user.clone(),
            hashed_password: hashed_password.to_string(),
        });
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        Ok(tables.user_mut(user_id)?.user.clone())
    }

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials> {
        let tables = self.tables.lock().await;
        tables
            .users
            .iter()
            .find(|row| row.user.username.eq_ignore_ascii_case(username))
            .map(|row| UserCredentials {
                user_id: row.user.id,
                username: row.user.username.clone(),
                hashed_password: row.hashed_password.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("User '{}' not found", username)))
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().map(|row| row.user.clone()).collect())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        tables.user_mut(user_id)?;
        tables.auth_sessions.insert(
            session_id.to_string(),
            AuthSession {
                id: session_id.to_string(),
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn validate_auth_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Uuid> {
        let tables = self.tables.lock().await;
        match tables.auth_sessions.get(session_id) {
            Some(session) if session.expires_at > now => Ok(session.user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        tables.auth_sessions.remove(session_id);
        Ok(())
    }

    async fn insert_tasks(
        &self,
        user_id: Uuid,
        task_date: NaiveDate,
        tasks: &[NewTask],
        created_at: DateTime<Utc>,
    ) -> PortResult<Vec<Task>> {
        let mut tables = self.tables.lock().await;
        tables.user_mut(user_id)?;
        if tables.has_summary(user_id, task_date) {
            return Err(PortError::Conflict(format!(
                "Day {} has already been ended",
                task_date
            )));
        }

        let first_sequence = tables.tasks.len() as i64 + 1;
        let created: Vec<Task> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| Task {
                id: Uuid::new_v4(),
                user_id,
                task_name: t.task_name.clone(),
                subject: t.subject,
                estimated_minutes: t.estimated_minutes,
                task_date,
                status: TaskStatus::Pending,
                started_at: None,
                completed_at: None,
                actual_minutes: None,
                sequence: first_sequence + i as i64,
                created_at,
            })
            .collect();
        tables.tasks.extend(created.iter().cloned());
        Ok(created)
    }

    async fn get_task(&self, task_id: Uuid) -> PortResult<Task> {
        let tables = self.tables.lock().await;
        tables
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Task {} not found", task_id)))
    }

    async fn list_tasks_for_day(&self, user_id: Uuid, date: NaiveDate) -> PortResult<Vec<Task>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tasks
            .iter()
            .filter(|t| t.user_id == user_id && t.task_date == date)
            .cloned()
            .collect())
    }

    async fn list_tasks_between(
        &self,
        user_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> PortResult<Vec<Task>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .tasks
            .iter()
            .filter(|t| user_id.map_or(true, |id| t.user_id == id))
            .filter(|t| t.task_date >= from && t.task_date <= to)
            .cloned()
            .collect())
    }

    async fn list_history(
        &self,
        user_id: Uuid,
        filter: &HistoryFilter,
        limit: usize,
    ) -> PortResult<Vec<Task>> {
        let tables = self.tables.lock().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .iter()
            .filter(|t| t.user_id == user_id)
            .filter(|t| filter.start_date.map_or(true, |d| t.task_date >= d))
            .filter(|t| filter.end_date.map_or(true, |d| t.task_date <= d))
            .filter(|t| filter.subject.map_or(true, |s| t.subject == s))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            b.task_date
                .cmp(&a.task_date)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn start_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> PortResult<ActiveSession> {
        let mut tables = self.tables.lock().await;
        if tables.active_sessions.contains_key(&user_id) {
            return Err(PortError::Conflict(
                "Another task is already in progress".to_string(),
            ));
        }
        let idx = tables.task_index(user_id, task_id)?;
        let task = &mut tables.tasks[idx];
        if task.status != TaskStatus::Pending {
            return Err(PortError::Conflict(format!(
                "Task {} is no longer pending",
                task_id
            )));
        }
        task.status = TaskStatus::InProgress;
        task.started_at = Some(started_at);

        let session = ActiveSession {
            user_id,
            active_task_id: task_id,
            started_at,
        };
        tables.active_sessions.insert(user_id, session.clone());
        Ok(session)
    }

    async fn complete_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        status: TaskStatus,
        actual_minutes: i64,
        completed_at: DateTime<Utc>,
    ) -> PortResult<Task> {
        let mut tables = self.tables.lock().await;
        let idx = tables.task_index(user_id, task_id)?;
        let task = &mut tables.tasks[idx];
        if task.status != TaskStatus::InProgress {
            return Err(PortError::Conflict(format!(
                "Task {} is no longer in progress",
                task_id
            )));
        }
        task.status = status;
        task.actual_minutes = Some(actual_minutes);
        task.completed_at = Some(completed_at);
        let task = task.clone();

        tables.active_sessions.remove(&user_id);
        Ok(task)
    }

    async fn skip_task(&self, user_id: Uuid, task_id: Uuid) -> PortResult<Task> {
        let mut tables = self.tables.lock().await;
        let idx = tables.task_index(user_id, task_id)?;
        let task = &mut tables.tasks[idx];
        if task.status.is_terminal() {
            return Err(PortError::Conflict(format!(
                "Task {} is already {}",
                task_id, task.status
            )));
        }
        task.status = TaskStatus::Skipped;
        let task = task.clone();

        if tables
            .active_sessions
            .get(&user_id)
            .is_some_and(|s| s.active_task_id == task_id)
        {
            tables.active_sessions.remove(&user_id);
        }
        Ok(task)
    }

    async fn get_active_session(&self, user_id: Uuid) -> PortResult<Option<ActiveSession>> {
        let tables = self.tables.lock().await;
        Ok(tables.active_sessions.get(&user_id).cloned())
    }

    async fn list_active_sessions(&self) -> PortResult<Vec<ActiveSession>> {
        let tables = self.tables.lock().await;
        Ok(tables.active_sessions.values().cloned().collect())
    }

    async fn get_summary(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Option<DailySummary>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .summaries
            .iter()
            .find(|s| s.user_id == user_id && s.summary_date == date)
            .cloned())
    }

    async fn list_summaries_for_date(&self, date: NaiveDate) -> PortResult<Vec<DailySummary>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .summaries
            .iter()
            .filter(|s| s.summary_date == date)
            .cloned()
            .collect())
    }

    async fn list_recent_summaries(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<DailySummary>> {
        let tables = self.tables.lock().await;
        let mut summaries: Vec<DailySummary> = tables
            .summaries
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        summaries.sort_by(|a, b| b.summary_date.cmp(&a.summary_date));
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn end_day(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        close: DayCloser<'_>,
    ) -> PortResult<DayClosing> {
        let mut tables = self.tables.lock().await;
        let user = tables.user_mut(user_id)?.user.clone();
        if tables.has_summary(user_id, date) {
            return Err(PortError::Conflict(format!(
                "Day {} has already been ended",
                date
            )));
        }

        // Stage the force-skip so a failing close leaves every table untouched.
        let day_tasks: Vec<Task> = tables
            .tasks
            .iter()
            .filter(|t| t.user_id == user_id && t.task_date == date)
            .map(|t| {
                let mut t = t.clone();
                if !t.status.is_terminal() {
                    t.status = TaskStatus::Skipped;
                }
                t
            })
            .collect();

        let yesterday = date.pred_opt().and_then(|y| {
            tables
                .summaries
                .iter()
                .find(|s| s.user_id == user_id && s.summary_date == y)
                .cloned()
        });

        let closing = close(DayLedger {
            user,
            date,
            tasks: day_tasks,
            yesterday,
        })?;

        // A timer left running from an earlier date is closed with the session.
        let running = tables.active_sessions.remove(&user_id).map(|s| s.active_task_id);
        for task in tables.tasks.iter_mut().filter(|t| {
            t.user_id == user_id && (t.task_date == date || Some(t.id) == running)
        }) {
            if !task.status.is_terminal() {
                task.status = TaskStatus::Skipped;
            }
        }
        tables.summaries.push(closing.summary.clone());

        let row = tables.user_mut(user_id)?;
        row.user.current_streak = closing.current_streak;
        row.user.best_streak = closing.best_streak;
        row.user.last_active_date = Some(date);

        Ok(closing)
    }
}
