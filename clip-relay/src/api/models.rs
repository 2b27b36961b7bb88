//! API request and response models.

use chat_link::ConnectionSnapshot;
use serde::{Deserialize, Serialize};

use crate::orchestrator::ClipRequestFields;
use crate::platforms::PlatformTag;

/// Body of `POST /api/connection-test` and payload of `test-connection`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestRequest {
    #[serde(default, alias = "channelIdentifier")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `healthy`, or `degraded` while a configured chat connection is down.
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub chat: Option<ConnectionSnapshot>,
    pub observers: usize,
    pub in_flight_requests: usize,
    pub platforms: Vec<PlatformTag>,
}

/// Body of `PUT /api/logging`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfigResponse {
    pub filter: String,
    pub log_dir: String,
}

/// A message sent by an observer over the WebSocket.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    CreateClip(ClipRequestFields),
    TestConnection(ConnectionTestRequest),
    Ping,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl InboundMessage {
    /// Parse `{ "type": ..., "payload": ... }`. A missing payload means all defaults.
    pub fn parse(text: &str) -> Result<Self, String> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| format!("malformed message: {e}"))?;

        let payload = match envelope.payload {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };

        match envelope.kind.as_str() {
            "create-clip" => serde_json::from_value(payload)
                .map(InboundMessage::CreateClip)
                .map_err(|e| format!("invalid create-clip payload: {e}")),
            "test-connection" => serde_json::from_value(payload)
                .map(InboundMessage::TestConnection)
                .map_err(|e| format!("invalid test-connection payload: {e}")),
            "ping" => Ok(InboundMessage::Ping),
            other => Err(format!("unknown message type '{other}'")),
        }
    }
}
