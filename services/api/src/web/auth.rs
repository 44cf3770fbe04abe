//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use crate::error::ApiError;
use crate::web::middleware::{session_cookie, SESSION_COOKIE};
use crate::web::state::AppState;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_tracker_core::ports::PortError;
use study_tracker_core::User;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

pub const MIN_PASSWORD_CHARS: usize = 8;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
}

impl From<User> for AuthResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            username: user.username,
            display_name: user.display_name,
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Creates an auth session for `user_id` and returns the `Set-Cookie` value.
async fn open_session(state: &AppState, user_id: Uuid) -> Result<String, ApiError> {
    let auth_session_id = Uuid::new_v4().to_string();
    let ttl = Duration::days(state.config.session_ttl_days);
    let expires_at = state.tracker.clock().now() + ttl;

    state
        .tracker
        .store()
        .create_auth_session(&auth_session_id, user_id, expires_at)
        .await?;

    Ok(format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        auth_session_id,
        ttl.num_seconds()
    ))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Username already taken"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(PortError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_CHARS
        ))
        .into());
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    let user = state
        .tracker
        .register(&req.username, &req.display_name, &password_hash)
        .await?;
    let cookie = open_session(&state, user.id).await?;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse::from(user)),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_creds = state
        .tracker
        .store()
        .get_user_credentials(req.username.trim())
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => ApiError::Port(PortError::Unauthorized),
            other => ApiError::Port(other),
        })?;

    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;

    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(PortError::Unauthorized.into());
    }

    let user = state.tracker.user(user_creds.user_id).await?;
    let cookie = open_session(&state, user.id).await?;
    info!(user_id = %user.id, "User logged in");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse::from(user)),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let auth_session_id = session_cookie(&headers).ok_or(PortError::Unauthorized)?;

    state
        .tracker
        .store()
        .delete_auth_session(auth_session_id)
        .await?;

    let cookie = format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    );
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]))
}

/// GET /api/me - The signed-in user, streaks included
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "The current user"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.tracker.user(user_id).await?))
}
