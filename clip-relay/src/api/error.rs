//! API error handling.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;
use crate::orchestrator::FailureReason;
use crate::platforms::PlatformError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Stable code for programmatic handling.
    pub code: String,
    pub message: String,
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
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad-request", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal-error", message)
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

/// Status for an upstream failure.
fn platform_status(err: &PlatformError) -> StatusCode {
    match err {
        PlatformError::NotFound(_) | PlatformError::RoomNotFound(_) => StatusCode::NOT_FOUND,
        PlatformError::InvalidDuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PlatformError::ExternalUnavailable(_)
        | PlatformError::QuotaExceeded(_)
        | PlatformError::NotConfigured(_)
        | PlatformError::Chat(_) => StatusCode::SERVICE_UNAVAILABLE,
        PlatformError::Unauthorized(_) | PlatformError::InvalidResponse(_) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

impl From<FailureReason> for ApiError {
    fn from(reason: FailureReason) -> Self {
        let status = match &reason {
            FailureReason::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FailureReason::NotLive | FailureReason::Duplicate(_) => StatusCode::CONFLICT,
            FailureReason::Platform(e) => platform_status(e),
        };
        ApiError::new(status, reason.code(), reason.to_string())
    }
}

impl From<PlatformError> for ApiError {
    fn from(err: PlatformError) -> Self {
        ApiError::new(platform_status(&err), err.code(), err.to_string())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Configuration(msg) => ApiError::bad_request(msg),
            Error::Platform(e) => e.into(),
            Error::Chat(e) => ApiError::new(StatusCode::SERVICE_UNAVAILABLE, e.code(), e.to_string()),
            Error::Serialization(e) => ApiError::bad_request(e.to_string()),
            other => {
                tracing::error!(error = %other, "Unexpected API error");
                ApiError::internal("An unexpected error occurred")
            }
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
