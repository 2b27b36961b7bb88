//! Chat connection error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors surfaced by the chat connection manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The connection is not in the `Connected` state.
    #[error("chat connection is not connected")]
    NotConnected,

    /// The server did not acknowledge a JOIN within the configured bound.
    #[error("timed out joining {room}")]
    JoinTimeout { room: String },

    /// The server (or local validation) refused the message.
    #[error("message rejected: {reason}")]
    SendRejected { reason: String },

    /// Credentials were rejected. Fatal for the connection.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Transport-level failure (socket closed, handshake timeout, write error).
    #[error("transport error: {0}")]
    Transport(String),
}

impl ChatError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a send rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::SendRejected {
            reason: reason.into(),
        }
    }

    /// Stable identifier for presentation layers.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::NotConnected => "not-connected",
            ChatError::JoinTimeout { .. } => "join-timeout",
            ChatError::SendRejected { .. } => "send-rejected",
            ChatError::Authentication(_) => "unauthorized",
            ChatError::Transport(_) => "transport-disconnected",
        }
    }

    /// Whether a reconnect may fix this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChatError::Transport(_))
    }
}
