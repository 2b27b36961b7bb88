//! Outbound throttling seam.

use async_trait::async_trait;

/// Something that can hold a sender back until it may transmit again.
///
/// The service's rate limiter implements this; the chat driver calls it once
/// per outbound PRIVMSG with the key from [`ChatConfig::gate_key`](crate::ChatConfig::gate_key).
#[async_trait]
pub trait SendGate: Send + Sync {
    async fn reserve(&self, key: &str);
}

/// Gate that never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ungated;

#[async_trait]
impl SendGate for Ungated {
    async fn reserve(&self, _key: &str) {}
}
