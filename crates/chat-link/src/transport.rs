//! Transport seam between the connection driver and the network.
//!
//! The driver speaks IRC lines; a [`ChatTransport`] only has to move text
//! frames. [`WebSocketTransport`] is the production implementation.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};
use tracing::{debug, info, trace};

use crate::error::{ChatError, Result};

/// Twitch WebSocket IRC endpoint.
pub const TWITCH_WS_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Factory for fresh links. Called once per (re)connect attempt.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    async fn open(&self) -> Result<Box<dyn ChatLink>>;
}

/// One established duplex link.
#[async_trait]
pub trait ChatLink: Send {
    /// Write one IRC line (without CRLF).
    async fn send(&mut self, line: &str) -> Result<()>;

    /// Next text frame. `None` means the peer closed the link.
    /// A frame may contain several CRLF separated lines.
    async fn recv(&mut self) -> Option<Result<String>>;

    async fn close(&mut self);
}

/// IRC over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(TWITCH_WS_URL)
    }
}

#[async_trait]
impl ChatTransport for WebSocketTransport {
    async fn open(&self) -> Result<Box<dyn ChatLink>> {
        info!("Connecting to chat WebSocket: {}", self.url);
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChatError::transport(format!("connect failed: {e}")))?;
        Ok(Box::new(WebSocketLink { stream }))
    }
}

struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ChatLink for WebSocketLink {
    async fn send(&mut self, line: &str) -> Result<()> {
        trace!("> {}", redact(line));
        self.stream
            .send(Message::Text(line.to_string().into()))
            .await
            .map_err(|e| ChatError::transport(format!("write failed: {e}")))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_string())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!("Ignoring non UTF-8 binary frame"),
                },
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return Some(Err(ChatError::transport(format!("pong failed: {e}"))));
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Chat WebSocket closed by peer");
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(ChatError::transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Keep tokens out of trace output.
fn redact(line: &str) -> &str {
    if line.starts_with("PASS ") {
        "PASS ***"
    } else {
        line
    }
}
