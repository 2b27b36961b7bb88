//! Connection configuration, lifecycle state and events.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;

/// Settings for one managed chat connection.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Network name, used as the rate limiter key suffix (`chat:<network>`).
    pub network: String,
    /// Bot account login.
    pub username: String,
    /// Chat OAuth token, with or without the `oauth:` prefix.
    pub oauth_token: String,
    /// Consecutive failed reconnects before giving up.
    pub max_reconnect_attempts: u32,
    /// First backoff interval.
    pub reconnect_interval: Duration,
    /// Backoff ceiling.
    pub max_reconnect_interval: Duration,
    /// Backoff multiplier applied after each failed attempt.
    pub reconnect_decay: f64,
    /// Bound on waiting for a JOIN acknowledgement.
    pub join_timeout: Duration,
    /// Bound on the PASS/NICK exchange.
    pub handshake_timeout: Duration,
    /// Window in which a send can still be acknowledged or rejected.
    pub send_ack_timeout: Duration,
    /// Capacity of the command queue feeding the driver task.
    pub command_buffer: usize,
}

impl ChatConfig {
    pub fn new(
        network: impl Into<String>,
        username: impl Into<String>,
        oauth_token: impl Into<String>,
    ) -> Self {
        Self {
            network: network.into(),
            username: username.into(),
            oauth_token: oauth_token.into(),
            ..Self::default()
        }
    }

    /// Rate limiter key for outbound messages on this network.
    pub fn gate_key(&self) -> String {
        format!("chat:{}", self.network)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            network: "twitch".to_string(),
            username: String::new(),
            oauth_token: String::new(),
            max_reconnect_attempts: 10,
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_interval: Duration::from_secs(30),
            reconnect_decay: 1.5,
            join_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            send_ack_timeout: Duration::from_secs(2),
            command_buffer: 64,
        }
    }
}

/// Lifecycle of a managed connection.
///
/// `Failed` and `Disconnected` (after an explicit disconnect) are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting { .. } => "reconnecting",
            ConnectionState::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            ConnectionState::Failed { reason } => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Read-only copy of a connection's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub network: String,
    pub state: ConnectionState,
    pub joined_rooms: BTreeSet<String>,
    pub reconnect_attempt: u32,
    pub current_backoff_ms: u64,
}

impl ConnectionSnapshot {
    pub(crate) fn initial(config: &ChatConfig) -> Self {
        Self {
            network: config.network.clone(),
            state: ConnectionState::Disconnected,
            joined_rooms: BTreeSet::new(),
            reconnect_attempt: 0,
            current_backoff_ms: config.reconnect_interval.as_millis() as u64,
        }
    }
}

/// Asynchronous notifications from the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    StateChanged(ConnectionState),
    Joined { room: String },
    Parted { room: String },
    Notice {
        room: Option<String>,
        msg_id: Option<String>,
        text: String,
    },
}

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub room: String,
    /// `false` when the server neither confirmed nor rejected within the ack window.
    pub acknowledged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_and_predicates() {
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 2 }.to_string(),
            "reconnecting (attempt 2)"
        );
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Failed { reason: "auth".into() }.is_terminal());
        assert!(!ConnectionState::Disconnected.is_terminal());
    }

    #[test]
    fn test_gate_key() {
        let config = ChatConfig::new("twitch", "clipbot", "token");
        assert_eq!(config.gate_key(), "chat:twitch");
        assert_eq!(config.max_reconnect_attempts, 10);
    }
}
