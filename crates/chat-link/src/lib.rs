//! Chat-link: a persistent, self-healing Twitch chat connection.
//!
//! ## Core Types
//!
//! - [`ChatManager`] - Owns one connection; join, leave and send through it
//! - [`ChatConfig`] - Credentials, backoff and timeout settings
//! - [`ConnectionState`] / [`ConnectionSnapshot`] - Lifecycle observation
//! - [`ChatEvent`] - Asynchronous notifications (state, joins, notices)
//!
//! ## Seams
//!
//! - [`ChatTransport`] - Opens links; [`WebSocketTransport`] in production
//! - [`SendGate`] - Outbound throttling, called once per message
//!
//! With the `test-util` feature, `testing::MockIrcServer` provides a
//! scriptable in-process server.

pub mod error;
pub mod gate;
pub mod irc;
pub mod manager;
pub mod state;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{ChatError, Result};
pub use gate::{SendGate, Ungated};
pub use manager::ChatManager;
pub use state::{ChatConfig, ChatEvent, ConnectionSnapshot, ConnectionState, SendReceipt};
pub use transport::{ChatLink, ChatTransport, TWITCH_WS_URL, WebSocketTransport};
