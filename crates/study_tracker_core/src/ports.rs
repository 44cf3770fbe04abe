//! crates/study_tracker_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the tracker's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of a specific database or wall clock.

use crate::day::{DayClosing, DayLedger};
use crate::domain::{
    ActiveSession, DailySummary, HistoryFilter, NewTask, Task, TaskStatus, User, UserCredentials,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// The error taxonomy shared by every core operation and port.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Malformed input: a field constraint was violated.
    #[error("Invalid input: {0}")]
    Validation(String),
    /// The referenced task or user is absent, or not owned by the caller.
    #[error("Item not found: {0}")]
    NotFound(String),
    /// An invariant would be violated: day already ended, session already active,
    /// task in the wrong state, duplicate summary.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Persisted state contradicts itself. Should never happen.
    #[error("Data integrity fault: {0}")]
    Integrity(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Closes a day from the ledger the store assembled inside its transaction.
pub type DayCloser<'a> = &'a (dyn Fn(DayLedger) -> PortResult<DayClosing> + Send + Sync);

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The source of "now" and of the canonical calendar day.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn today(&self) -> NaiveDate;
}

/// Transactional persistence for users, tasks, active sessions and summaries.
///
/// Every mutating method is atomic: it either applies completely or returns an
/// error having changed nothing. Guards (expected prior status, session absence,
/// summary absence) are re-checked inside the transaction and reported as
/// `PortError::Conflict` when they no longer hold.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    // --- Users ---
    async fn create_user(
        &self,
        username: &str,
        display_name: &str,
        hashed_password: &str,
        created_at: DateTime<Utc>,
    ) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials>;

    async fn list_users(&self) -> PortResult<Vec<User>>;

    // --- Auth sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Resolves a cookie session to its user, or `Unauthorized` when missing or expired.
    async fn validate_auth_session(&self, session_id: &str, now: DateTime<Utc>)
        -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Tasks ---
    /// Inserts the whole batch, or nothing. Fails with `Conflict` when the user
    /// already has a summary for `task_date`.
    async fn insert_tasks(
        &self,
        user_id: Uuid,
        task_date: NaiveDate,
        tasks: &[NewTask],
        created_at: DateTime<Utc>,
    ) -> PortResult<Vec<Task>>;

    async fn get_task(&self, task_id: Uuid) -> PortResult<Task>;

    /// Tasks for one user and day, in creation order.
    async fn list_tasks_for_day(&self, user_id: Uuid, date: NaiveDate) -> PortResult<Vec<Task>>;

    /// Tasks dated within `[from, to]`, for one user or for everyone.
    async fn list_tasks_between(
        &self,
        user_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> PortResult<Vec<Task>>;

    /// Newest date first, creation order within a date, at most `limit` rows.
    async fn list_history(
        &self,
        user_id: Uuid,
        filter: &HistoryFilter,
        limit: usize,
    ) -> PortResult<Vec<Task>>;

    // --- Lifecycle transitions ---
    /// `pending -> in_progress` plus creation of the user's active session.
    async fn start_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> PortResult<ActiveSession>;

    /// `in_progress -> completed_*` plus removal of the user's active session.
    async fn complete_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        status: TaskStatus,
        actual_minutes: i64,
        completed_at: DateTime<Utc>,
    ) -> PortResult<Task>;

    /// `pending | in_progress -> skipped`, clearing the session if it pointed here.
    async fn skip_task(&self, user_id: Uuid, task_id: Uuid) -> PortResult<Task>;

    async fn get_active_session(&self, user_id: Uuid) -> PortResult<Option<ActiveSession>>;

    async fn list_active_sessions(&self) -> PortResult<Vec<ActiveSession>>;

    // --- Daily summaries ---
    async fn get_summary(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Option<DailySummary>>;

    async fn list_summaries_for_date(&self, date: NaiveDate) -> PortResult<Vec<DailySummary>>;

    /// Most recent first.
    async fn list_recent_summaries(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<DailySummary>>;

    /// Runs the end-of-day transaction: force-skips the day's open tasks, clears
    /// the active session, hands the resulting ledger to `close`, then stores the
    /// summary and streak it returns. Nothing persists if any step fails.
    async fn end_day(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        close: DayCloser<'_>,
    ) -> PortResult<DayClosing>;
}
