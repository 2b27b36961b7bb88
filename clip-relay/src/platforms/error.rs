//! Adapter error type.
//!
//! Every external-call outcome is normalized into a [`PlatformError`] before
//! it leaves an adapter.

use chat_link::ChatError;
use thiserror::Error;

use super::PlatformTag;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid clip duration {0}s (must be between 5 and 60)")]
    InvalidDuration(u32),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("chat room not found: {0}")]
    RoomNotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("platform not configured: {0}")]
    NotConfigured(PlatformTag),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl PlatformError {
    /// Stable identifier for observers and API clients.
    pub fn code(&self) -> &'static str {
        match self {
            PlatformError::NotFound(_) => "not-found",
            PlatformError::InvalidDuration(_) => "invalid-duration",
            PlatformError::Unauthorized(_) => "unauthorized",
            PlatformError::ExternalUnavailable(_) => "external-unavailable",
            PlatformError::QuotaExceeded(_) => "quota-exceeded",
            PlatformError::RoomNotFound(_) => "room-not-found",
            PlatformError::InvalidResponse(_) => "invalid-response",
            PlatformError::NotConfigured(_) => "not-configured",
            PlatformError::Chat(e) => e.code(),
        }
    }

    /// Map an unsuccessful HTTP status to an error.
    pub fn from_status(status: u16, context: impl Into<String>) -> Self {
        let context = context.into();
        match status {
            401 | 403 => PlatformError::Unauthorized(context),
            404 => PlatformError::NotFound(context),
            429 | 500..=599 => PlatformError::ExternalUnavailable(format!("HTTP {status}: {context}")),
            _ => PlatformError::InvalidResponse(format!("HTTP {status}: {context}")),
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            PlatformError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            PlatformError::from_status(status.as_u16(), err.to_string())
        } else {
            PlatformError::ExternalUnavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            PlatformError::from_status(401, "bad token"),
            PlatformError::Unauthorized(_)
        ));
        assert!(matches!(
            PlatformError::from_status(404, "gone"),
            PlatformError::NotFound(_)
        ));
        assert!(matches!(
            PlatformError::from_status(429, "slow down"),
            PlatformError::ExternalUnavailable(_)
        ));
        assert!(matches!(
            PlatformError::from_status(503, "down"),
            PlatformError::ExternalUnavailable(_)
        ));
        assert!(matches!(
            PlatformError::from_status(400, "bad"),
            PlatformError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_chat_errors_keep_their_code() {
        let err: PlatformError = ChatError::NotConnected.into();
        assert_eq!(err.code(), "not-connected");
        assert_eq!(
            PlatformError::NotConfigured(PlatformTag::YouTube).to_string(),
            "platform not configured: youtube"
        );
    }
}
