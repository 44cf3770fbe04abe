//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `TrackerStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Every multi-statement operation runs in one transaction. Per-user ordering
//! comes from `SELECT ... FOR UPDATE` on the user row plus the primary keys of
//! `active_sessions` and `daily_summaries`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use study_tracker_core::day::{DayClosing, DayLedger};
use study_tracker_core::domain::{
    ActiveSession, DailySummary, HistoryFilter, NewTask, ProblemCounts, Subject, Task, TaskStatus,
    User, UserCredentials,
};
use study_tracker_core::ports::{DayCloser, PortError, PortResult, TrackerStore};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `TrackerStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn begin(&self) -> PortResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(unexpected)
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn to_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn to_u32(n: i32) -> u32 {
    u32::try_from(n).unwrap_or(0)
}

/// Takes the row lock that serializes all writes of one user.
async fn lock_user(tx: &mut Transaction<'static, Postgres>, user_id: Uuid) -> PortResult<UserRecord> {
    sqlx::query_as::<_, UserRecord>(&format!(
        "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(unexpected)?
    .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
}

async fn summary_exists(
    tx: &mut Transaction<'static, Postgres>,
    user_id: Uuid,
    date: NaiveDate,
) -> PortResult<bool> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT 1 FROM daily_summaries WHERE user_id = $1 AND summary_date = $2")
            .bind(user_id)
            .bind(date)
            .fetch_optional(&mut **tx)
            .await
            .map_err(unexpected)?;
    Ok(row.is_some())
}

/// Explains why a status-guarded update touched no row.
async fn guard_miss(
    tx: &mut Transaction<'static, Postgres>,
    user_id: Uuid,
    task_id: Uuid,
    expected: &str,
) -> PortError {
    let row: Result<Option<(String,)>, _> =
        sqlx::query_as("SELECT status FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(task_id)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await;
    match row {
        Ok(Some((status,))) => PortError::Conflict(format!(
            "Task {} is {}, expected {}",
            task_id, status, expected
        )),
        Ok(None) => PortError::NotFound(format!("Task {} not found", task_id)),
        Err(e) => unexpected(e),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str =
    "id, username, display_name, current_streak, best_streak, last_active_date, created_at";

const TASK_COLUMNS: &str = "id, seq, user_id, task_name, subject, estimated_minutes, task_date, \
     status, started_at, completed_at, actual_minutes, created_at";

const SUMMARY_COLUMNS: &str = "user_id, summary_date, maths_problems, physics_problems, \
     chemistry_problems, other_problems, topics, notes, self_rating, tasks_completed, \
     tasks_total, success_rate, total_study_hours, created_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    display_name: String,
    current_streak: i32,
    best_streak: i32,
    last_active_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            display_name: self.display_name,
            current_streak: to_u32(self.current_streak),
            best_streak: to_u32(self.best_streak),
            last_active_date: self.last_active_date,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    username: String,
    hashed_password: String,
}

#[derive(FromRow)]
struct TaskRecord {
    id: Uuid,
    seq: i64,
    user_id: Uuid,
    task_name: String,
    subject: String,
    estimated_minutes: i32,
    task_date: NaiveDate,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    actual_minutes: Option<i32>,
    created_at: DateTime<Utc>,
}
impl TaskRecord {
    fn to_domain(self) -> PortResult<Task> {
        let status = self
            .status
            .parse::<TaskStatus>()
            .map_err(|e| PortError::Integrity(format!("task {}: {}", self.id, e)))?;
        Ok(Task {
            id: self.id,
            user_id: self.user_id,
            task_name: self.task_name,
            subject: Subject::coerce(&self.subject),
            estimated_minutes: i64::from(self.estimated_minutes),
            task_date: self.task_date,
            status,
            started_at: self.started_at,
            completed_at: self.completed_at,
            actual_minutes: self.actual_minutes.map(i64::from),
            sequence: self.seq,
            created_at: self.created_at,
        })
    }
}

fn tasks_to_domain(records: Vec<TaskRecord>) -> PortResult<Vec<Task>> {
    records.into_iter().map(TaskRecord::to_domain).collect()
}

#[derive(FromRow)]
struct ActiveSessionRecord {
    user_id: Uuid,
    active_task_id: Uuid,
    started_at: DateTime<Utc>,
}
impl ActiveSessionRecord {
    fn to_domain(self) -> ActiveSession {
        ActiveSession {
            user_id: self.user_id,
            active_task_id: self.active_task_id,
            started_at: self.started_at,
        }
    }
}

#[derive(FromRow)]
struct SummaryRecord {
    user_id: Uuid,
    summary_date: NaiveDate,
    maths_problems: i32,
    physics_problems: i32,
    chemistry_problems: i32,
    other_problems: i32,
    topics: String,
    notes: String,
    self_rating: i32,
    tasks_completed: i32,
    tasks_total: i32,
    success_rate: i32,
    total_study_hours: f64,
    created_at: DateTime<Utc>,
}
impl SummaryRecord {
    fn to_domain(self) -> DailySummary {
        DailySummary {
            user_id: self.user_id,
            summary_date: self.summary_date,
            problems: ProblemCounts {
                maths: to_u32(self.maths_problems),
                physics: to_u32(self.physics_problems),
                chemistry: to_u32(self.chemistry_problems),
                other: to_u32(self.other_problems),
            },
            topics: self.topics,
            notes: self.notes,
            self_rating: i64::from(self.self_rating),
            tasks_completed: to_u32(self.tasks_completed),
            tasks_total: to_u32(self.tasks_total),
            success_rate: to_u32(self.success_rate),
            total_study_hours: self.total_study_hours,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `TrackerStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl TrackerStore for DbAdapter {
    async fn create_user(
        &self,
        username: &str,
        display_name: &str,
        hashed_password: &str,
        created_at: DateTime<Utc>,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, username, display_name, hashed_password, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(display_name)
        .bind(hashed_password)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict(format!("Username '{}' is already taken", username))
            } else {
                unexpected(e)
            }
        })?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_credentials(&self, username: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, username, hashed_password FROM users WHERE LOWER(username) = LOWER($1)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("User '{}' not found", username))
            }
            _ => unexpected(e),
        })?;
        Ok(UserCredentials {
            user_id: record.id,
            username: record.username,
            hashed_password: record.hashed_password,
        })
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users ORDER BY created_at ASC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(UserRecord::to_domain).collect())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> PortResult<Uuid> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > $2")
                .bind(session_id)
                .bind(now)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;
        row.map(|(user_id,)| user_id).ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn insert_tasks(
        &self,
        user_id: Uuid,
        task_date: NaiveDate,
        tasks: &[NewTask],
        created_at: DateTime<Utc>,
    ) -> PortResult<Vec<Task>> {
        let mut tx = self.begin().await?;
        lock_user(&mut tx, user_id).await?;
        if summary_exists(&mut tx, user_id, task_date).await? {
            return Err(PortError::Conflict(format!(
                "Day {} has already been ended",
                task_date
            )));
        }

        let insert = format!(
            "INSERT INTO tasks (id, user_id, task_name, subject, estimated_minutes, task_date, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            TASK_COLUMNS
        );
        let mut created = Vec::with_capacity(tasks.len());
        for task in tasks {
            let record = sqlx::query_as::<_, TaskRecord>(&insert)
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(&task.task_name)
                .bind(task.subject.as_str())
                .bind(i32::try_from(task.estimated_minutes).unwrap_or(i32::MAX))
                .bind(task_date)
                .bind(created_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(unexpected)?;
            created.push(record.to_domain()?);
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(created)
    }

    async fn get_task(&self, task_id: Uuid) -> PortResult<Task> {
        let record = sqlx::query_as::<_, TaskRecord>(&format!(
            "SELECT {} FROM tasks WHERE id = $1",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Task {} not found", task_id)),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn list_tasks_for_day(&self, user_id: Uuid, date: NaiveDate) -> PortResult<Vec<Task>> {
        let records = sqlx::query_as::<_, TaskRecord>(&format!(
            "SELECT {} FROM tasks WHERE user_id = $1 AND task_date = $2 ORDER BY seq ASC",
            TASK_COLUMNS
        ))
        .bind(user_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        tasks_to_domain(records)
    }

    async fn list_tasks_between(
        &self,
        user_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> PortResult<Vec<Task>> {
        let records = sqlx::query_as::<_, TaskRecord>(&format!(
            "SELECT {} FROM tasks \
             WHERE ($1::uuid IS NULL OR user_id = $1) AND task_date BETWEEN $2 AND $3 \
             ORDER BY task_date ASC, seq ASC",
            TASK_COLUMNS
        ))
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        tasks_to_domain(records)
    }

    async fn list_history(
        &self,
        user_id: Uuid,
        filter: &HistoryFilter,
        limit: usize,
    ) -> PortResult<Vec<Task>> {
        let records = sqlx::query_as::<_, TaskRecord>(&format!(
            "SELECT {} FROM tasks \
             WHERE user_id = $1 \
               AND ($2::date IS NULL OR task_date >= $2) \
               AND ($3::date IS NULL OR task_date <= $3) \
               AND ($4::text IS NULL OR subject = $4) \
             ORDER BY task_date DESC, seq ASC \
             LIMIT $5",
            TASK_COLUMNS
        ))
        .bind(user_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.subject.map(Subject::as_str))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        tasks_to_domain(records)
    }

    async fn start_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> PortResult<ActiveSession> {
        let mut tx = self.begin().await?;
        lock_user(&mut tx, user_id).await?;

        let updated = sqlx::query(
            "UPDATE tasks SET status = 'in_progress', started_at = $3 \
             WHERE id = $1 AND user_id = $2 AND status = 'pending'",
        )
        .bind(task_id)
        .bind(user_id)
        .bind(started_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        if updated.rows_affected() == 0 {
            return Err(guard_miss(&mut tx, user_id, task_id, "pending").await);
        }

        let inserted = sqlx::query(
            "INSERT INTO active_sessions (user_id, active_task_id, started_at) \
             VALUES ($1, $2, $3) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(task_id)
        .bind(started_at)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        if inserted.rows_affected() == 0 {
            return Err(PortError::Conflict(
                "Another task is already in progress".to_string(),
            ));
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(ActiveSession {
            user_id,
            active_task_id: task_id,
            started_at,
        })
    }

    async fn complete_task(
        &self,
        user_id: Uuid,
        task_id: Uuid,
        status: TaskStatus,
        actual_minutes: i64,
        completed_at: DateTime<Utc>,
    ) -> PortResult<Task> {
        let mut tx = self.begin().await?;

        let record = sqlx::query_as::<_, TaskRecord>(&format!(
            "UPDATE tasks SET status = $3, actual_minutes = $4, completed_at = $5 \
             WHERE id = $1 AND user_id = $2 AND status = 'in_progress' RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(user_id)
        .bind(status.as_str())
        .bind(i32::try_from(actual_minutes).unwrap_or(i32::MAX))
        .bind(completed_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;
        let Some(record) = record else {
            return Err(guard_miss(&mut tx, user_id, task_id, "in_progress").await);
        };

        sqlx::query("DELETE FROM active_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        record.to_domain()
    }

    async fn skip_task(&self, user_id: Uuid, task_id: Uuid) -> PortResult<Task> {
        let mut tx = self.begin().await?;

        let record = sqlx::query_as::<_, TaskRecord>(&format!(
            "UPDATE tasks SET status = 'skipped' \
             WHERE id = $1 AND user_id = $2 AND status IN ('pending', 'in_progress') RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?;
        let Some(record) = record else {
            return Err(guard_miss(&mut tx, user_id, task_id, "pending or in_progress").await);
        };

        sqlx::query("DELETE FROM active_sessions WHERE user_id = $1 AND active_task_id = $2")
            .bind(user_id)
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_active_session(&self, user_id: Uuid) -> PortResult<Option<ActiveSession>> {
        let record = sqlx::query_as::<_, ActiveSessionRecord>(
            "SELECT user_id, active_task_id, started_at FROM active_sessions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ActiveSessionRecord::to_domain))
    }

    async fn list_active_sessions(&self) -> PortResult<Vec<ActiveSession>> {
        let records = sqlx::query_as::<_, ActiveSessionRecord>(
            "SELECT user_id, active_task_id, started_at FROM active_sessions",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(ActiveSessionRecord::to_domain).collect())
    }

    async fn get_summary(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Option<DailySummary>> {
        let record = sqlx::query_as::<_, SummaryRecord>(&format!(
            "SELECT {} FROM daily_summaries WHERE user_id = $1 AND summary_date = $2",
            SUMMARY_COLUMNS
        ))
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(SummaryRecord::to_domain))
    }

    async fn list_summaries_for_date(&self, date: NaiveDate) -> PortResult<Vec<DailySummary>> {
        let records = sqlx::query_as::<_, SummaryRecord>(&format!(
            "SELECT {} FROM daily_summaries WHERE summary_date = $1",
            SUMMARY_COLUMNS
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(SummaryRecord::to_domain).collect())
    }

    async fn list_recent_summaries(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> PortResult<Vec<DailySummary>> {
        let records = sqlx::query_as::<_, SummaryRecord>(&format!(
            "SELECT {} FROM daily_summaries WHERE user_id = $1 ORDER BY summary_date DESC LIMIT $2",
            SUMMARY_COLUMNS
        ))
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(SummaryRecord::to_domain).collect())
    }

    async fn end_day(
        &self,
        user_id: Uuid,
        date: NaiveDate,
        close: DayCloser<'_>,
    ) -> PortResult<DayClosing> {
        let mut tx = self.begin().await?;
        let user = lock_user(&mut tx, user_id).await?.to_domain();
        if summary_exists(&mut tx, user_id, date).await? {
            return Err(PortError::Conflict(format!(
                "Day {} has already been ended",
                date
            )));
        }

        // 1-2. Force-skip whatever is still open and drop the session.
        sqlx::query(
            "UPDATE tasks SET status = 'skipped' \
             WHERE user_id = $1 AND task_date = $2 AND status IN ('pending', 'in_progress')",
        )
        .bind(user_id)
        .bind(date)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        // A timer left running from an earlier date is closed with the session.
        sqlx::query(
            "UPDATE tasks SET status = 'skipped' \
             WHERE status = 'in_progress' AND user_id = $1 \
             AND id IN (SELECT active_task_id FROM active_sessions WHERE user_id = $1)",
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        sqlx::query("DELETE FROM active_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        // 3-4. Build the ledger and let the core close the day.
        let tasks = sqlx::query_as::<_, TaskRecord>(&format!(
            "SELECT {} FROM tasks WHERE user_id = $1 AND task_date = $2 ORDER BY seq ASC",
            TASK_COLUMNS
        ))
        .bind(user_id)
        .bind(date)
        .fetch_all(&mut *tx)
        .await
        .map_err(unexpected)?;

        let yesterday = match date.pred_opt() {
            Some(y) => sqlx::query_as::<_, SummaryRecord>(&format!(
                "SELECT {} FROM daily_summaries WHERE user_id = $1 AND summary_date = $2",
                SUMMARY_COLUMNS
            ))
            .bind(user_id)
            .bind(y)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?
            .map(SummaryRecord::to_domain),
            None => None,
        };

        let closing = close(DayLedger {
            user,
            date,
            tasks: tasks_to_domain(tasks)?,
            yesterday,
        })?;

        // 5. The summary; the primary key rejects a concurrent duplicate.
        let s = &closing.summary;
        sqlx::query(&format!(
            "INSERT INTO daily_summaries ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            SUMMARY_COLUMNS
        ))
        .bind(s.user_id)
        .bind(s.summary_date)
        .bind(to_i32(s.problems.maths))
        .bind(to_i32(s.problems.physics))
        .bind(to_i32(s.problems.chemistry))
        .bind(to_i32(s.problems.other))
        .bind(&s.topics)
        .bind(&s.notes)
        .bind(i32::try_from(s.self_rating).unwrap_or(0))
        .bind(to_i32(s.tasks_completed))
        .bind(to_i32(s.tasks_total))
        .bind(to_i32(s.success_rate))
        .bind(s.total_study_hours)
        .bind(s.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict(format!("Day {} has already been ended", date))
            } else {
                unexpected(e)
            }
        })?;

        // 6. Streak.
        sqlx::query(
            "UPDATE users SET current_streak = $2, best_streak = $3, last_active_date = $4 \
             WHERE id = $1",
        )
        .bind(user_id)
        .bind(to_i32(closing.current_streak))
        .bind(to_i32(closing.best_streak))
        .bind(date)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(closing)
    }
}
