//! Connection self-test.

use std::sync::Arc;

use chat_link::{ChatManager, ConnectionSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::platforms::{ChannelIdentity, ClipSource, PlatformAvailability};
use crate::rate_limit::{QuotaStatus, RateLimiter, keys};

/// What the service can currently reach.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    /// `None` when chat credentials are not configured.
    pub chat: Option<ConnectionSnapshot>,
    pub platforms: PlatformAvailability,
    pub channel: Option<String>,
    pub identity: Option<ChannelIdentity>,
    pub live: Option<bool>,
    pub youtube_quota: QuotaStatus,
    /// Failures encountered while probing, as `code: message`.
    pub errors: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl ConnectionReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
            && self
                .chat
                .as_ref()
                .is_none_or(|snapshot| snapshot.state.is_connected())
    }
}

pub struct ConnectionTester {
    chat: Option<Arc<ChatManager>>,
    clips: Arc<dyn ClipSource>,
    limiter: RateLimiter,
    availability: PlatformAvailability,
    default_channel: Option<String>,
}

impl ConnectionTester {
    pub fn new(
        chat: Option<Arc<ChatManager>>,
        clips: Arc<dyn ClipSource>,
        limiter: RateLimiter,
        availability: PlatformAvailability,
        default_channel: Option<String>,
    ) -> Self {
        Self {
            chat,
            clips,
            limiter,
            availability,
            default_channel,
        }
    }

    /// Check chat, channel identity and liveness.
    #[instrument(skip(self))]
    pub async fn run(&self, channel: Option<&str>) -> ConnectionReport {
        let chat = self.chat.as_ref().map(|chat| chat.snapshot());
        let channel = channel
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .or_else(|| self.default_channel.clone());

        let mut errors = Vec::new();
        if let Some(snapshot) = &chat
            && !snapshot.state.is_connected()
        {
            errors.push(format!("chat: connection is {}", snapshot.state.label()));
        }

        let mut identity = None;
        let mut live = None;
        if let Some(name) = &channel {
            match self.clips.resolve_channel_identity(name).await {
                Ok(resolved) => {
                    live = Some(self.clips.is_live(name).await);
                    identity = Some(resolved);
                }
                Err(e) => errors.push(format!("{}: {e}", e.code())),
            }
        }

        debug!(errors = errors.len(), "Connection test finished");

        ConnectionReport {
            chat,
            platforms: self.availability,
            channel,
            identity,
            live,
            youtube_quota: self.limiter.quota_status(keys::YOUTUBE_API),
            errors,
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::{CreatedClip, PlatformError};
    use async_trait::async_trait;

    struct OnlyAlice;

    #[async_trait]
    impl ClipSource for OnlyAlice {
        async fn resolve_channel_identity(&self, name: &str) -> Result<ChannelIdentity, PlatformError> {
            if name == "alice" {
                Ok(ChannelIdentity {
                    id: "1".into(),
                    login: "alice".into(),
                    display_name: "Alice".into(),
                })
            } else {
                Err(PlatformError::NotFound(name.to_string()))
            }
        }

        async fn is_live(&self, name: &str) -> bool {
            name == "alice"
        }

        async fn create_clip(
            &self,
            _identity: &ChannelIdentity,
            _duration_secs: u32,
            _title: Option<&str>,
        ) -> Result<CreatedClip, PlatformError> {
            Err(PlatformError::ExternalUnavailable("unused".into()))
        }
    }

    fn tester(default_channel: Option<&str>) -> ConnectionTester {
        ConnectionTester::new(
            None,
            Arc::new(OnlyAlice),
            RateLimiter::default(),
            PlatformAvailability::default(),
            default_channel.map(str::to_string),
        )
    }

    #[tokio::test]
    async fn test_uses_default_channel() {
        let report = tester(Some("alice")).run(None).await;
        assert_eq!(report.channel.as_deref(), Some("alice"));
        assert_eq!(report.live, Some(true));
        assert!(report.is_healthy());
        assert_eq!(report.youtube_quota, QuotaStatus::Untracked);
    }

    #[tokio::test]
    async fn test_unknown_channel_reported() {
        let report = tester(None).run(Some("nobody")).await;
        assert!(report.identity.is_none());
        assert!(report.live.is_none());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("not-found"));
        assert!(!report.is_healthy());
    }

    #[tokio::test]
    async fn test_no_channel_skips_lookup() {
        let report = tester(None).run(Some("  ")).await;
        assert!(report.channel.is_none());
        assert!(report.errors.is_empty());
    }
}
