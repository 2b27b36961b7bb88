//! Twitch clip source: cached lookups, rate limiting and clip creation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::helix::HelixApi;
use crate::cache::LookupCache;
use crate::platforms::{ChannelIdentity, ClipSource, CreatedClip, PlatformError};
use crate::rate_limit::{RateLimiter, keys};

/// Public clip links are `<base>/<clip id>`.
pub const CLIP_BASE_URL: &str = "https://clips.twitch.tv";

pub const MIN_CLIP_DURATION: u32 = 5;
pub const MAX_CLIP_DURATION: u32 = 60;

/// Behavior after the create call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipTiming {
    /// Wait before the clip is considered ready.
    pub processing_delay: Duration,
    /// Look the clip up after the delay.
    pub verify: bool,
}

impl Default for ClipTiming {
    fn default() -> Self {
        Self {
            processing_delay: Duration::from_secs(5),
            verify: true,
        }
    }
}

pub fn clip_url(clip_id: &str) -> String {
    format!("{CLIP_BASE_URL}/{clip_id}")
}

pub fn validate_duration(duration_secs: u32) -> Result<(), PlatformError> {
    if (MIN_CLIP_DURATION..=MAX_CLIP_DURATION).contains(&duration_secs) {
        Ok(())
    } else {
        Err(PlatformError::InvalidDuration(duration_secs))
    }
}

/// [`ClipSource`] backed by the Helix API.
pub struct TwitchClipSource {
    api: Arc<dyn HelixApi>,
    cache: LookupCache,
    limiter: RateLimiter,
    timing: ClipTiming,
}

impl TwitchClipSource {
    pub fn new(
        api: Arc<dyn HelixApi>,
        cache: LookupCache,
        limiter: RateLimiter,
        timing: ClipTiming,
    ) -> Self {
        Self {
            api,
            cache,
            limiter,
            timing,
        }
    }

    async fn verify(&self, clip_id: &str) -> bool {
        self.limiter.reserve(keys::TWITCH_API).await;
        match self.api.clip_exists(clip_id).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(clip_id = %clip_id, "Clip not visible yet after processing delay");
                false
            }
            Err(e) => {
                warn!(clip_id = %clip_id, error = %e, "Clip verification failed");
                false
            }
        }
    }
}

fn normalize_login(name: &str) -> String {
    name.trim().trim_start_matches('#').to_lowercase()
}

#[async_trait]
impl ClipSource for TwitchClipSource {
    async fn resolve_channel_identity(&self, name: &str) -> Result<ChannelIdentity, PlatformError> {
        let login = normalize_login(name);
        if let Some(identity) = self.cache.identity(&login) {
            return Ok(identity);
        }

        self.limiter.reserve(keys::TWITCH_API).await;
        let identity = self
            .api
            .find_user(&login)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("channel '{login}'")))?;

        debug!(login = %login, id = %identity.id, "Resolved channel identity");
        self.cache.store_identity(&login, identity.clone());
        Ok(identity)
    }

    async fn is_live(&self, name: &str) -> bool {
        let identity = match self.resolve_channel_identity(name).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(channel = %name, error = %e, "Could not resolve channel for liveness check");
                return false;
            }
        };

        if let Some(live) = self.cache.liveness(&identity.id) {
            return live;
        }

        self.limiter.reserve(keys::TWITCH_API).await;
        match self.api.stream_is_live(&identity.id).await {
            Ok(live) => {
                self.cache.store_liveness(&identity.id, live);
                live
            }
            Err(e) => {
                warn!(channel = %identity.login, error = %e, "Liveness check failed, treating as offline");
                false
            }
        }
    }

    async fn create_clip(
        &self,
        identity: &ChannelIdentity,
        duration_secs: u32,
        title: Option<&str>,
    ) -> Result<CreatedClip, PlatformError> {
        validate_duration(duration_secs)?;

        self.limiter.reserve(keys::TWITCH_API).await;
        let handle = self
            .api
            .create_clip(&identity.id, duration_secs, title)
            .await?;
        info!(channel = %identity.login, clip_id = %handle.id, "Clip created");

        if !self.timing.processing_delay.is_zero() {
            tokio::time::sleep(self.timing.processing_delay).await;
        }

        let verified = self.timing.verify && self.verify(&handle.id).await;

        Ok(CreatedClip {
            clip_url: clip_url(&handle.id),
            clip_id: handle.id,
            edit_url: handle.edit_url,
            verified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheTtls;
    use crate::platforms::twitch::helix::ClipHandle;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeHelix {
        live: bool,
        fail_live: bool,
        clip_visible: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HelixApi for FakeHelix {
        async fn find_user(&self, login: &str) -> Result<Option<ChannelIdentity>, PlatformError> {
            self.calls.lock().push(format!("find_user:{login}"));
            if login == "ghost" {
                return Ok(None);
            }
            Ok(Some(ChannelIdentity {
                id: format!("id-{login}"),
                login: login.to_string(),
                display_name: login.to_uppercase(),
            }))
        }

        async fn stream_is_live(&self, broadcaster_id: &str) -> Result<bool, PlatformError> {
            self.calls.lock().push(format!("stream_is_live:{broadcaster_id}"));
            if self.fail_live {
                return Err(PlatformError::ExternalUnavailable("HTTP 503".into()));
            }
            Ok(self.live)
        }

        async fn create_clip(
            &self,
            broadcaster_id: &str,
            duration_secs: u32,
            _title: Option<&str>,
        ) -> Result<ClipHandle, PlatformError> {
            self.calls
                .lock()
                .push(format!("create_clip:{broadcaster_id}:{duration_secs}"));
            Ok(ClipHandle {
                id: "abc123".into(),
                edit_url: Some("https://clips.twitch.tv/abc123/edit".into()),
            })
        }

        async fn clip_exists(&self, clip_id: &str) -> Result<bool, PlatformError> {
            self.calls.lock().push(format!("clip_exists:{clip_id}"));
            Ok(self.clip_visible)
        }
    }

    fn source(api: Arc<FakeHelix>) -> TwitchClipSource {
        TwitchClipSource::new(
            api,
            LookupCache::new(CacheTtls::default()),
            RateLimiter::default(),
            ClipTiming {
                processing_delay: Duration::from_secs(5),
                verify: true,
            },
        )
    }

    fn count(api: &FakeHelix, prefix: &str) -> usize {
        api.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_is_cached() {
        let api = Arc::new(FakeHelix::default());
        let source = source(api.clone());

        let first = source.resolve_channel_identity("#Alice").await.unwrap();
        let second = source.resolve_channel_identity("alice").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.id, "id-alice");
        assert_eq!(count(&api, "find_user"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_channel_is_not_found() {
        let source = source(Arc::new(FakeHelix::default()));
        let err = source.resolve_channel_identity("ghost").await.unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_cached_for_short_ttl() {
        let api = Arc::new(FakeHelix {
            live: true,
            ..Default::default()
        });
        let source = source(api.clone());

        assert!(source.is_live("alice").await);
        assert!(source.is_live("alice").await);
        assert_eq!(count(&api, "stream_is_live"), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(source.is_live("alice").await);
        assert_eq!(count(&api, "stream_is_live"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_fails_closed() {
        let api = Arc::new(FakeHelix {
            live: true,
            fail_live: true,
            ..Default::default()
        });
        let source = source(api.clone());

        assert!(!source.is_live("alice").await);
        assert!(!source.is_live("ghost").await);
        // Failures are not cached.
        assert!(!source.is_live("alice").await);
        assert_eq!(count(&api, "stream_is_live"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_duration_makes_no_call() {
        let api = Arc::new(FakeHelix::default());
        let source = source(api.clone());
        let identity = source.resolve_channel_identity("alice").await.unwrap();

        for duration in [0, 4, 61, 300] {
            let err = source.create_clip(&identity, duration, None).await.unwrap_err();
            assert_eq!(err, PlatformError::InvalidDuration(duration));
        }
        assert_eq!(count(&api, "create_clip"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_clip_waits_and_verifies() {
        let api = Arc::new(FakeHelix {
            clip_visible: true,
            ..Default::default()
        });
        let source = source(api.clone());
        let identity = source.resolve_channel_identity("alice").await.unwrap();

        let start = tokio::time::Instant::now();
        let clip = source.create_clip(&identity, 30, Some("nice")).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(clip.clip_url, "https://clips.twitch.tv/abc123");
        assert!(clip.verified);
        assert_eq!(count(&api, "create_clip:id-alice:30"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unverified_clip_still_succeeds() {
        let api = Arc::new(FakeHelix {
            clip_visible: false,
            ..Default::default()
        });
        let source = source(api.clone());
        let identity = source.resolve_channel_identity("alice").await.unwrap();

        let clip = source.create_clip(&identity, 30, None).await.unwrap();
        assert!(!clip.verified);
        assert_eq!(clip.clip_id, "abc123");
    }
}
