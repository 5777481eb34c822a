//! Error types for the counter server.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use counter_core::{ErrorBody, StoreError, ValidationError};
use database::DatabaseError;
use thiserror::Error;

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unknown counter, image, or color.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint, e.g. a color held by another user.
    #[error("{entity} already taken: {id}")]
    Conflict { entity: &'static str, id: String },

    /// Body that could not be read or decoded.
    #[error("Invalid request body: {0}")]
    BadRequest(String),

    /// Upload larger than the configured limit.
    #[error("payload too large (max {max} bytes)")]
    TooLarge { max: usize },

    /// Database error.
    #[error("Database error: {0}")]
    Database(DatabaseError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn counter_not_found(id: &str) -> Self {
        ApiError::NotFound {
            entity: "Counter",
            id: id.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Validation(e) => ApiError::Validation(e),
            DatabaseError::NotFound { entity, id } => ApiError::NotFound { entity, id },
            DatabaseError::AlreadyExists { entity, id } => ApiError::Conflict { entity, id },
            other => ApiError::Database(other),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => ApiError::Validation(e),
            StoreError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!(status = %status, "Request rejected: {}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
