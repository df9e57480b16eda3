//! API error handling.
//!
//! Provides consistent error responses for the API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    /// Create a 502 Bad Gateway error for engine failures.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "ENGINE_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(_)
            | Error::NotADescriptorFile(_)
            | Error::RemoteNotFound { .. }
            | Error::RemoteTimeout { .. }
            | Error::RemoteHttpError { .. } => ApiError::bad_request(err.to_string()),
            Error::BlockedByHost {
                ref remediation, ..
            } => {
                let mut api = ApiError::bad_request(err.to_string());
                if let Some(magnet) = remediation {
                    api = api.with_details(serde_json::json!({ "magnet": magnet }));
                }
                api
            }
            Error::InvalidPath(_) => ApiError::bad_request(err.to_string()),
            Error::NotFound { .. } | Error::NoFilesOnDisk { .. } | Error::FileNotFound { .. } => {
                ApiError::not_found(err.to_string())
            }
            Error::ArchiveBuild(_) => {
                tracing::error!("Archive error: {}", err);
                ApiError::internal(err.to_string())
            }
            Error::Engine(_) => ApiError::engine(err.to_string()),
            Error::Io(e) => {
                tracing::error!("IO error: {}", e);
                ApiError::internal("IO error occurred")
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                ApiError::internal("Serialization error occurred")
            }
            Error::Configuration(msg) => ApiError::bad_request(msg),
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
