//! YouTube live chat poster.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::api::{YouTubeApi, cost};
use crate::cache::{CacheClass, LookupCache};
use crate::platforms::{ChatPoster, PlatformError, PlatformTag};
use crate::rate_limit::{QuotaStatus, RateLimiter, keys};

/// Where to find the broadcast whose chat we post into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YouTubeTarget {
    /// Explicit broadcast (video) id. Preferred when set.
    pub video_id: Option<String>,
    /// Channel whose current live broadcast is used otherwise.
    pub channel_id: Option<String>,
}

impl YouTubeTarget {
    fn cache_key(&self) -> Option<String> {
        match (&self.video_id, &self.channel_id) {
            (Some(video), _) => Some(format!("youtube:video:{video}")),
            (None, Some(channel)) => Some(format!("youtube:channel:{channel}")),
            (None, None) => None,
        }
    }
}

/// [`ChatPoster`] for YouTube live chat.
///
/// The live chat id is resolved once per session and cached; a
/// room-not-found failure drops the cached id so the next post re-resolves.
pub struct YouTubeChatPoster {
    api: Arc<dyn YouTubeApi>,
    cache: LookupCache,
    limiter: RateLimiter,
    target: YouTubeTarget,
}

impl YouTubeChatPoster {
    pub fn new(
        api: Arc<dyn YouTubeApi>,
        cache: LookupCache,
        limiter: RateLimiter,
        target: YouTubeTarget,
    ) -> Self {
        Self {
            api,
            cache,
            limiter,
            target,
        }
    }

    fn check_quota(&self) -> Result<(), PlatformError> {
        match self.limiter.quota_status(keys::YOUTUBE_API) {
            QuotaStatus::Exceeded { used, limit } => Err(PlatformError::QuotaExceeded(format!(
                "{used} of {limit} daily units used"
            ))),
            _ => Ok(()),
        }
    }

    async fn resolve_live_chat(&self, cache_key: &str) -> Result<String, PlatformError> {
        if let Some(chat_id) = self.cache.chat_room(cache_key) {
            return Ok(chat_id);
        }

        self.check_quota()?;
        self.limiter.reserve(keys::YOUTUBE_API).await;

        let chat_id = match (&self.target.video_id, &self.target.channel_id) {
            (Some(video_id), _) => {
                let result = self.api.live_chat_for_video(video_id).await;
                self.limiter.record_usage(keys::YOUTUBE_API, cost::VIDEOS_LIST);
                result?
            }
            (None, Some(channel_id)) => {
                let result = self.api.live_chat_for_channel(channel_id).await;
                self.limiter
                    .record_usage(keys::YOUTUBE_API, cost::SEARCH_LIST + cost::VIDEOS_LIST);
                result?
            }
            (None, None) => return Err(PlatformError::NotConfigured(PlatformTag::YouTube)),
        };

        let chat_id = chat_id
            .ok_or_else(|| PlatformError::RoomNotFound("no active live chat for broadcast".into()))?;

        debug!(live_chat_id = %chat_id, "Resolved YouTube live chat");
        self.cache.store_chat_room(cache_key, chat_id.clone());
        Ok(chat_id)
    }
}

#[async_trait]
impl ChatPoster for YouTubeChatPoster {
    fn platform(&self) -> PlatformTag {
        PlatformTag::YouTube
    }

    async fn post_message(&self, _channel: &str, text: &str) -> Result<String, PlatformError> {
        let cache_key = self
            .target
            .cache_key()
            .ok_or(PlatformError::NotConfigured(PlatformTag::YouTube))?;

        let chat_id = self.resolve_live_chat(&cache_key).await?;

        self.check_quota()?;
        self.limiter.reserve(keys::YOUTUBE_API).await;
        let result = self.api.insert_message(&chat_id, text).await;
        let quota = self
            .limiter
            .record_usage(keys::YOUTUBE_API, cost::MESSAGE_INSERT);

        match result {
            Ok(message_id) => {
                if quota.is_warning() {
                    warn!(quota = ?quota, "YouTube quota running low");
                }
                info!(live_chat_id = %chat_id, message_id = %message_id, "Posted to YouTube chat");
                Ok(format!("message {message_id}"))
            }
            Err(PlatformError::RoomNotFound(reason)) => {
                warn!(live_chat_id = %chat_id, reason = %reason, "YouTube live chat gone, dropping cached id");
                self.cache.invalidate(CacheClass::ChatRoom, &cache_key);
                Err(PlatformError::RoomNotFound(reason))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheTtls;
    use crate::rate_limit::QuotaConfig;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeYouTube {
        chat_ids: Mutex<Vec<String>>,
        room_gone: Mutex<bool>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl YouTubeApi for FakeYouTube {
        async fn live_chat_for_video(&self, video_id: &str) -> Result<Option<String>, PlatformError> {
            self.calls.lock().push(format!("video:{video_id}"));
            let mut ids = self.chat_ids.lock();
            Ok(if ids.is_empty() { None } else { Some(ids.remove(0)) })
        }

        async fn live_chat_for_channel(&self, channel_id: &str) -> Result<Option<String>, PlatformError> {
            self.calls.lock().push(format!("channel:{channel_id}"));
            let mut ids = self.chat_ids.lock();
            Ok(if ids.is_empty() { None } else { Some(ids.remove(0)) })
        }

        async fn insert_message(&self, live_chat_id: &str, _text: &str) -> Result<String, PlatformError> {
            self.calls.lock().push(format!("insert:{live_chat_id}"));
            if *self.room_gone.lock() {
                return Err(PlatformError::RoomNotFound("liveChatEnded".into()));
            }
            Ok("msg-1".into())
        }
    }

    fn poster(api: Arc<FakeYouTube>, limiter: RateLimiter, target: YouTubeTarget) -> YouTubeChatPoster {
        YouTubeChatPoster::new(api, LookupCache::new(CacheTtls::default()), limiter, target)
    }

    fn video_target() -> YouTubeTarget {
        YouTubeTarget {
            video_id: Some("vid".into()),
            channel_id: None,
        }
    }

    #[tokio::test]
    async fn test_resolves_once_and_posts() {
        let api = Arc::new(FakeYouTube {
            chat_ids: Mutex::new(vec!["chat-1".into()]),
            ..Default::default()
        });
        let poster = poster(api.clone(), RateLimiter::default(), video_target());

        assert_eq!(poster.post_message("alice", "hi").await.unwrap(), "message msg-1");
        poster.post_message("alice", "again").await.unwrap();

        assert_eq!(
            *api.calls.lock(),
            vec!["video:vid", "insert:chat-1", "insert:chat-1"]
        );
    }

    #[tokio::test]
    async fn test_room_not_found_invalidates_cached_chat() {
        let api = Arc::new(FakeYouTube {
            chat_ids: Mutex::new(vec!["chat-1".into(), "chat-2".into()]),
            ..Default::default()
        });
        let poster = poster(api.clone(), RateLimiter::default(), video_target());

        poster.post_message("alice", "first").await.unwrap();

        *api.room_gone.lock() = true;
        let err = poster.post_message("alice", "second").await.unwrap_err();
        assert!(matches!(err, PlatformError::RoomNotFound(_)));

        *api.room_gone.lock() = false;
        poster.post_message("alice", "third").await.unwrap();

        let calls = api.calls.lock().clone();
        assert_eq!(calls.iter().filter(|c| c.starts_with("video:")).count(), 2);
        assert_eq!(calls.last().map(String::as_str), Some("insert:chat-2"));
    }

    #[tokio::test]
    async fn test_no_live_broadcast() {
        let api = Arc::new(FakeYouTube::default());
        let poster = poster(
            api,
            RateLimiter::default(),
            YouTubeTarget {
                video_id: None,
                channel_id: Some("UC123".into()),
            },
        );

        let err = poster.post_message("alice", "hi").await.unwrap_err();
        assert!(matches!(err, PlatformError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_target() {
        let poster = poster(
            Arc::new(FakeYouTube::default()),
            RateLimiter::default(),
            YouTubeTarget::default(),
        );
        let err = poster.post_message("alice", "hi").await.unwrap_err();
        assert_eq!(err, PlatformError::NotConfigured(PlatformTag::YouTube));
    }

    #[tokio::test]
    async fn test_quota_usage_recorded_and_enforced() {
        let api = Arc::new(FakeYouTube {
            chat_ids: Mutex::new(vec!["chat-1".into()]),
            ..Default::default()
        });
        let limiter = RateLimiter::default();
        limiter.set_quota(keys::YOUTUBE_API, QuotaConfig::daily(120));
        let poster = poster(api.clone(), limiter.clone(), video_target());

        poster.post_message("alice", "one").await.unwrap();
        assert_eq!(
            limiter.quota_status(keys::YOUTUBE_API),
            QuotaStatus::Within { used: 51, limit: 120 }
        );

        poster.post_message("alice", "two").await.unwrap();
        poster.post_message("alice", "three").await.unwrap();
        assert!(matches!(
            limiter.quota_status(keys::YOUTUBE_API),
            QuotaStatus::Exceeded { .. }
        ));

        let err = poster.post_message("alice", "four").await.unwrap_err();
        assert!(matches!(err, PlatformError::QuotaExceeded(_)));
        assert_eq!(
            api.calls.lock().iter().filter(|c| c.starts_with("insert:")).count(),
            3
        );
    }
}
