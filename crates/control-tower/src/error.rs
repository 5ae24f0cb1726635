//! Error types for the ingestion service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ingestion service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upload larger than the configured limit
    #[error("Upload exceeds the maximum size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// Upload is not a recognized tabular format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Malformed request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown job
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Chunk not committed (yet)
    #[error("Chunk {index} of job {job_id} not found")]
    ChunkNotFound { job_id: Uuid, index: u64 },

    /// Operation not allowed in the job's current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Job left the processing state; no further writes are accepted
    #[error("Job {0} is no longer processing")]
    JobClosed(Uuid),

    /// Chunk index does not follow the last committed chunk
    #[error("Chunk index {got} out of order for job {job_id} (expected {expected})")]
    ChunkOutOfOrder { job_id: Uuid, expected: u64, got: u64 },

    /// Unrecoverable failure while processing a job
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Service temporarily unable to accept work
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error with context
    pub fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{}: {}", context, err))
    }

    /// Create a job failure
    pub fn job_failed(message: impl Into<String>) -> Self {
        Self::JobFailed(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            Error::UnsupportedFormat(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format")
            }
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::JobNotFound(_) | Error::ChunkNotFound { .. } => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            Error::Conflict(_) | Error::JobClosed(_) => (StatusCode::CONFLICT, "conflict"),
            Error::ChunkOutOfOrder { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            Error::JobFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "job_failed"),
            Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            Error::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
