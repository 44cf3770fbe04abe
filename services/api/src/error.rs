//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use study_tracker_core::ports::PortError;
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the tracker core or its ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying database migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request could not be understood (bad path, query or body shape).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Port(PortError::Validation(_)) | ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, "validation")
            }
            ApiError::Port(PortError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Port(PortError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Port(PortError::Unauthorized) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Port(PortError::Integrity(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "integrity")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        // Caller mistakes carry their message; faults stay opaque.
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "An internal error occurred".to_string()
        } else {
            match &self {
                ApiError::Port(PortError::Validation(m))
                | ApiError::Port(PortError::NotFound(m))
                | ApiError::Port(PortError::Conflict(m))
                | ApiError::BadRequest(m) => m.clone(),
                other => other.to_string(),
            }
        };

        (status, Json(json!({ "error": message, "kind": kind }))).into_response()
    }
}
