//! API error types and JSON error response formatting.
//!
//! Every endpoint fails with the same `{error, message}` body. Context
//! errors are mapped to status codes here; storage internals are not
//! echoed back to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use colloquy_context::ContextError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid input.
    #[error("{0}")]
    BadRequest(String),
    /// 404 Not Found - no live conversation with that id.
    #[error("{0}")]
    NotFound(String),
    /// 409 Conflict - the conversation is in a state that forbids the request.
    #[error("{0}")]
    Conflict(String),
    /// 422 Unprocessable Entity - well-formed but rejected input.
    #[error("{0}")]
    UnprocessableEntity(String),
    /// 500 Internal Server Error.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::UnprocessableEntity(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::ContextNotFound(_) => ApiError::NotFound(err.to_string()),
            ContextError::InvalidTransition { .. } | ContextError::InvalidState(_) => {
                ApiError::Conflict(err.to_string())
            }
            ContextError::MessageTooLong(_) => ApiError::UnprocessableEntity(err.to_string()),
            ContextError::ParameterExtractionFailed(_) | ContextError::Serialization(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ContextError::ToolExecutionFailed { tool, .. } => {
                ApiError::Internal(format!("Tool {} failed", tool))
            }
            ContextError::Storage(msg) => {
                tracing::error!(error = %msg, "Context storage failure");
                ApiError::Internal("Internal storage error".to_string())
            }
        }
    }
}
