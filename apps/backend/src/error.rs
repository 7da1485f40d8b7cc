//! Error handling for the backend API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gramoteka_core::TaskError;
use serde::Serialize;
use thiserror::Error;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Task(task) => match task {
                // Infeasible selection reads as "nothing to practise here".
                TaskError::NoContent { .. } => (StatusCode::NOT_FOUND, "no_content"),
                TaskError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_session"),
                TaskError::UnknownArchetype(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "unsupported_archetype")
                }
                TaskError::Provider(_) => (StatusCode::INTERNAL_SERVER_ERROR, "provider_error"),
            },
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            ApiError::Migration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "migration_error"),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
