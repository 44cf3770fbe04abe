//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::auth::{self, AuthResponse, LoginRequest, SignupRequest};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use study_tracker_core::board::Period;
use study_tracker_core::{
    DayReport, HistoryFilter, PlannedTask, PortError, ProblemCounts, Subject, Task, TaskStatus,
};
use tracing::info;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        batch_add_handler,
        start_task_handler,
        complete_task_handler,
        skip_task_handler,
        today_handler,
        user_tasks_handler,
        feed_handler,
        profile_handler,
        history_handler,
        end_day_handler,
        leaderboard_handler,
    ),
    components(
        schemas(
            SignupRequest, LoginRequest, AuthResponse, HealthResponse,
            PlannedTaskInput, BatchAddRequest, BatchAddResponse,
            StartTaskResponse, CompleteTaskResponse, SkipTaskResponse,
            EndDayRequest, EndDayResponse,
        )
    ),
    tags(
        (name = "Study Tracker API", description = "Daily study planning, timing, streaks and the shared leaderboard.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
}

/// One entry of a day plan as it arrives over the wire.
#[derive(Deserialize, ToSchema)]
pub struct PlannedTaskInput {
    task_name: String,
    #[serde(default)]
    subject: String,
    /// Whole minutes; numeric strings such as `"45"` are accepted.
    #[schema(value_type = i64)]
    estimated_minutes: Value,
}

#[derive(Deserialize, ToSchema)]
pub struct BatchAddRequest {
    tasks: Vec<PlannedTaskInput>,
}

#[derive(Serialize, ToSchema)]
pub struct BatchAddResponse {
    created: usize,
    #[schema(value_type = Vec<Object>)]
    tasks: Vec<Task>,
}

#[derive(Serialize, ToSchema)]
pub struct StartTaskResponse {
    task_id: Uuid,
    started_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct CompleteTaskResponse {
    task_id: Uuid,
    #[schema(value_type = String)]
    status: TaskStatus,
    actual_minutes: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct SkipTaskResponse {
    ok: bool,
    task_id: Uuid,
    #[schema(value_type = String)]
    status: TaskStatus,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    start_date: Option<String>,
    end_date: Option<String>,
    subject: Option<String>,
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    period: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct EndDayRequest {
    #[serde(default)]
    maths_problems: u32,
    #[serde(default)]
    physics_problems: u32,
    #[serde(default)]
    chemistry_problems: u32,
    #[serde(default)]
    other_problems: u32,
    #[serde(default)]
    topics: String,
    #[serde(default)]
    notes: String,
    self_rating: i64,
}

#[derive(Serialize, ToSchema)]
pub struct EndDayResponse {
    summary_date: NaiveDate,
    tasks_completed: u32,
    tasks_total: u32,
    success_rate: u32,
    total_study_hours: f64,
    current_streak: u32,
    best_streak: u32,
}

//=========================================================================================
// Request Parsing
//=========================================================================================

fn whole_minutes(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn planned_tasks(inputs: Vec<PlannedTaskInput>) -> Result<Vec<PlannedTask>, ApiError> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(i, input)| -> Result<PlannedTask, ApiError> {
            let estimated_minutes = whole_minutes(&input.estimated_minutes).ok_or_else(|| {
                PortError::Validation(format!(
                    "task {}: estimated_minutes must be a whole number",
                    i + 1
                ))
            })?;
            Ok(PlannedTask {
                task_name: input.task_name,
                subject: input.subject,
                estimated_minutes,
            })
        })
        .collect()
}

/// Empty query values count as absent.
fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_date(field: &str, raw: Option<String>) -> Result<Option<NaiveDate>, ApiError> {
    non_empty(raw)
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| {
                ApiError::BadRequest(format!("{} must be a YYYY-MM-DD date, got '{}'", field, s))
            })
        })
        .transpose()
}

fn history_filter(query: HistoryQuery) -> Result<HistoryFilter, ApiError> {
    Ok(HistoryFilter {
        start_date: parse_date("start_date", query.start_date)?,
        end_date: parse_date("end_date", query.end_date)?,
        subject: non_empty(query.subject).map(|s| Subject::coerce(&s)),
    })
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Plan today: add up to 20 tasks in one all-or-nothing batch.
#[utoipa::path(
    post,
    path = "/api/tasks/batch",
    request_body = BatchAddRequest,
    responses(
        (status = 201, description = "Tasks created", body = BatchAddResponse),
        (status = 400, description = "Invalid batch; nothing was stored"),
        (status = 409, description = "The day has already been ended")
    )
)]
pub async fn batch_add_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<BatchAddRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let planned = planned_tasks(req.tasks)?;
    let tasks = state.tracker.batch_add(user_id, &planned).await?;
    Ok((
        StatusCode::CREATED,
        Json(BatchAddResponse {
            created: tasks.len(),
            tasks,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/api/tasks/{task_id}/start",
    params(("task_id" = Uuid, Path, description = "The task to start")),
    responses(
        (status = 200, description = "Timer started", body = StartTaskResponse),
        (status = 404, description = "No such task for this user"),
        (status = 409, description = "Task not pending, another task active, or day ended")
    )
)]
pub async fn start_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.tracker.start(user_id, task_id).await?;
    Ok(Json(StartTaskResponse {
        task_id: session.active_task_id,
        started_at: session.started_at,
    }))
}

#[utoipa::path(
    post,
    path = "/api/tasks/{task_id}/complete",
    params(("task_id" = Uuid, Path, description = "The active task")),
    responses(
        (status = 200, description = "Task completed", body = CompleteTaskResponse),
        (status = 404, description = "No such task for this user"),
        (status = 409, description = "Task is not in progress"),
        (status = 500, description = "Active session is missing or inconsistent")
    )
)]
pub async fn complete_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.tracker.complete(user_id, task_id).await?;
    Ok(Json(CompleteTaskResponse {
        task_id: task.id,
        status: task.status,
        actual_minutes: task.actual_minutes,
    }))
}

#[utoipa::path(
    post,
    path = "/api/tasks/{task_id}/skip",
    params(("task_id" = Uuid, Path, description = "The pending task")),
    responses(
        (status = 200, description = "Task skipped", body = SkipTaskResponse),
        (status = 404, description = "No such task for this user"),
        (status = 409, description = "Task is not pending")
    )
)]
pub async fn skip_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.tracker.skip(user_id, task_id).await?;
    Ok(Json(SkipTaskResponse {
        ok: true,
        task_id: task.id,
        status: task.status,
    }))
}

/// The caller's tasks for today, the running timer and today's counters.
#[utoipa::path(
    get,
    path = "/api/tasks/today",
    responses((status = 200, description = "Today's plan"))
)]
pub async fn today_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tracker.list_today(user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/tasks",
    params(("user_id" = Uuid, Path, description = "Whose day to show")),
    responses(
        (status = 200, description = "Another user's plan for today"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn user_tasks_handler(
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tracker.list_for_user(target_id).await?))
}

/// What everyone else is doing right now.
#[utoipa::path(
    get,
    path = "/api/feed",
    responses((status = 200, description = "One entry per other user"))
)]
pub async fn feed_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tracker.feed(user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/profile",
    params(("user_id" = Uuid, Path, description = "Whose profile to show")),
    responses(
        (status = 200, description = "Streaks, all-time and weekly stats, recent summaries"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn profile_handler(
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tracker.profile(target_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/history",
    params(
        ("start_date" = Option<String>, Query, description = "Inclusive lower bound, YYYY-MM-DD"),
        ("end_date" = Option<String>, Query, description = "Inclusive upper bound, YYYY-MM-DD"),
        ("subject" = Option<String>, Query, description = "Maths, Physics, Chemistry or Other")
    ),
    responses(
        (status = 200, description = "Up to 200 tasks, newest day first"),
        (status = 400, description = "Malformed date or inverted range")
    )
)]
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = history_filter(query)?;
    Ok(Json(state.tracker.history(user_id, &filter).await?))
}

/// Close today: skip what's left, write the summary, move the streak.
#[utoipa::path(
    post,
    path = "/api/day/end",
    request_body = EndDayRequest,
    responses(
        (status = 200, description = "Day closed", body = EndDayResponse),
        (status = 400, description = "Invalid report"),
        (status = 409, description = "Day already ended")
    )
)]
pub async fn end_day_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<EndDayRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report = DayReport {
        problems: ProblemCounts {
            maths: req.maths_problems,
            physics: req.physics_problems,
            chemistry: req.chemistry_problems,
            other: req.other_problems,
        },
        topics: req.topics,
        notes: req.notes,
        self_rating: req.self_rating,
    };
    let closing = state.tracker.end_day(user_id, &report).await?;
    info!(%user_id, streak = closing.current_streak, "Day ended");

    Ok(Json(EndDayResponse {
        summary_date: closing.summary.summary_date,
        tasks_completed: closing.summary.tasks_completed,
        tasks_total: closing.summary.tasks_total,
        success_rate: closing.summary.success_rate,
        total_study_hours: closing.summary.total_study_hours,
        current_streak: closing.current_streak,
        best_streak: closing.best_streak,
    }))
}

#[utoipa::path(
    get,
    path = "/api/leaderboard",
    params(("period" = Option<String>, Query, description = "weekly (default), monthly or all-time")),
    responses(
        (status = 200, description = "Users ranked by on-time completions"),
        (status = 400, description = "Unknown period")
    )
)]
pub async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let period = match non_empty(query.period) {
        Some(raw) => raw.parse::<Period>()?,
        None => Period::Weekly,
    };
    Ok(Json(state.tracker.leaderboard(period).await?))
}
