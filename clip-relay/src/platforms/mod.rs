//! Platform adapters.
//!
//! Adapters are thin request/response wrappers around external services.
//! They check the shared cache, pass through the rate limiter, and return
//! every failure as a [`PlatformError`] rather than letting it escape.
//!
//! - [`ClipSource`] - channel lookup, liveness and clip creation (Twitch)
//! - [`ChatPoster`] - posting a message into a platform's live chat

mod error;
pub mod twitch;
pub mod youtube;

pub use error::PlatformError;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A chat platform a clip can be announced on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformTag {
    /// Twitch chat, the primary network.
    #[serde(alias = "primary")]
    Twitch,
    /// YouTube live chat, the secondary platform.
    #[serde(alias = "secondary")]
    YouTube,
}

impl PlatformTag {
    pub const ALL: [PlatformTag; 2] = [PlatformTag::Twitch, PlatformTag::YouTube];

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformTag::Twitch => "twitch",
            PlatformTag::YouTube => "youtube",
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitch" | "primary" => Ok(PlatformTag::Twitch),
            "youtube" | "secondary" => Ok(PlatformTag::YouTube),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// Which platforms have credentials, computed once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformAvailability {
    pub twitch: bool,
    pub youtube: bool,
}

impl PlatformAvailability {
    pub fn is_available(&self, tag: PlatformTag) -> bool {
        match tag {
            PlatformTag::Twitch => self.twitch,
            PlatformTag::YouTube => self.youtube,
        }
    }

    /// Configured platforms, in tag order.
    pub fn available(&self) -> Vec<PlatformTag> {
        PlatformTag::ALL
            .into_iter()
            .filter(|tag| self.is_available(*tag))
            .collect()
    }
}

/// A resolved broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelIdentity {
    /// Platform user id.
    pub id: String,
    pub login: String,
    pub display_name: String,
}

/// A clip returned by [`ClipSource::create_clip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedClip {
    pub clip_id: String,
    pub clip_url: String,
    pub edit_url: Option<String>,
    /// Whether the clip was confirmed to exist after the processing delay.
    pub verified: bool,
}

/// Clip-source operations used by the orchestrator.
#[async_trait]
pub trait ClipSource: Send + Sync {
    /// Resolve a channel name to its identity. Cached.
    async fn resolve_channel_identity(&self, name: &str) -> Result<ChannelIdentity, PlatformError>;

    /// Whether the channel is live. Errors count as not live.
    async fn is_live(&self, name: &str) -> bool;

    /// Create a clip of the last `duration_secs` seconds.
    async fn create_clip(
        &self,
        identity: &ChannelIdentity,
        duration_secs: u32,
        title: Option<&str>,
    ) -> Result<CreatedClip, PlatformError>;
}

/// Posts a message into one platform's live chat.
#[async_trait]
pub trait ChatPoster: Send + Sync {
    fn platform(&self) -> PlatformTag;

    /// Post `text` for `channel`. Returns a short delivery detail.
    async fn post_message(&self, channel: &str, text: &str) -> Result<String, PlatformError>;
}
