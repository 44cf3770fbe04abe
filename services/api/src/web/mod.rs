pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_auth;

use crate::web::{
    auth::{login_handler, logout_handler, me_handler, signup_handler},
    rest::{
        batch_add_handler, complete_task_handler, end_day_handler, feed_handler, health_handler,
        history_handler, leaderboard_handler, profile_handler, skip_task_handler,
        start_task_handler, today_handler, user_tasks_handler,
    },
    state::AppState,
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Builds the API router. The binary layers CORS, tracing and Swagger UI on top.
pub fn router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/me", get(me_handler))
        .route("/api/tasks/batch", post(batch_add_handler))
        .route("/api/tasks/today", get(today_handler))
        .route("/api/tasks/{task_id}/start", post(start_task_handler))
        .route("/api/tasks/{task_id}/complete", post(complete_task_handler))
        .route("/api/tasks/{task_id}/skip", post(skip_task_handler))
        .route("/api/users/{user_id}/tasks", get(user_tasks_handler))
        .route("/api/users/{user_id}/profile", get(profile_handler))
        .route("/api/feed", get(feed_handler))
        .route("/api/history", get(history_handler))
        .route("/api/day/end", post(end_day_handler))
        .route("/api/leaderboard", get(leaderboard_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
