//! HTTP error mapping
//!
//! Every failure is local to its request. Bodies have the shape
//! `{"error": {"code": "...", "message": "..."}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::pipeline::JobError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a stems path that is already catalogued
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Separation tool failed or could not be launched (500)
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    /// Separation tool succeeded but left no output directory (500)
    #[error("Output missing: {0}")]
    OutputMissing(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<stemdeck_common::Error> for ApiError {
    fn from(err: stemdeck_common::Error) -> Self {
        match err {
            stemdeck_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            stemdeck_common::Error::DuplicatePath(path) => {
                ApiError::Conflict(format!("Stems path already catalogued: {}", path))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::InvalidFilename(_) | JobError::InvalidModel(_) => {
                ApiError::BadRequest(err.to_string())
            }
            JobError::ProcessingFailed(e) => {
                ApiError::ProcessingFailed(format!("Separation processing failed: {}", e))
            }
            JobError::OutputMissing(_) => ApiError::OutputMissing(
                "Could not find processed stems directory.".to_string(),
            ),
            JobError::DuplicatePath(path) => {
                ApiError::Conflict(format!("Stems path already catalogued: {}", path))
            }
            JobError::Catalog(e) => e.into(),
            JobError::Io(e) => ApiError::Io(e),
            JobError::Upload(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::ProcessingFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PROCESSING_FAILED",
                msg,
            ),
            ApiError::OutputMissing(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "OUTPUT_MISSING", msg)
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
