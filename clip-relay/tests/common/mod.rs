//! Fakes for the external services, shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_link::testing::MockIrcServer;
use clip_relay::config::AppConfig;
use clip_relay::platforms::twitch::{ClipHandle, HelixApi};
use clip_relay::platforms::youtube::YouTubeApi;
use clip_relay::platforms::{ChannelIdentity, PlatformError};
use clip_relay::services::{Backends, ServiceContainer};
use parking_lot::Mutex;

/// Helix stand-in. Every login except `nobody` exists; ids are `id-<login>`.
#[derive(Default)]
pub struct FakeHelix {
    live: Mutex<HashSet<String>>,
    clip_ids: Mutex<VecDeque<String>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeHelix {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_live(&self, login: &str, live: bool) {
        let id = format!("id-{login}");
        let mut set = self.live.lock();
        if live {
            set.insert(id);
        } else {
            set.remove(&id);
        }
    }

    pub fn queue_clip_id(&self, id: &str) {
        self.clip_ids.lock().push_back(id.to_string());
    }

    pub fn create_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with("create:"))
            .count()
    }
}

#[async_trait]
impl HelixApi for FakeHelix {
    async fn find_user(&self, login: &str) -> Result<Option<ChannelIdentity>, PlatformError> {
        self.calls.lock().push(format!("user:{login}"));
        if login == "nobody" {
            return Ok(None);
        }
        Ok(Some(ChannelIdentity {
            id: format!("id-{login}"),
            login: login.to_string(),
            display_name: login.to_string(),
        }))
    }

    async fn stream_is_live(&self, broadcaster_id: &str) -> Result<bool, PlatformError> {
        self.calls.lock().push(format!("live:{broadcaster_id}"));
        Ok(self.live.lock().contains(broadcaster_id))
    }

    async fn create_clip(
        &self,
        broadcaster_id: &str,
        _duration_secs: u32,
        _title: Option<&str>,
    ) -> Result<ClipHandle, PlatformError> {
        let n = {
            let mut calls = self.calls.lock();
            calls.push(format!("create:{broadcaster_id}"));
            calls.len()
        };
        let id = self
            .clip_ids
            .lock()
            .pop_front()
            .unwrap_or_else(|| format!("clip-{n}"));
        Ok(ClipHandle {
            edit_url: Some(format!("https://clips.twitch.tv/{id}/edit")),
            id,
        })
    }

    async fn clip_exists(&self, _clip_id: &str) -> Result<bool, PlatformError> {
        Ok(true)
    }
}

/// YouTube stand-in with one live chat.
#[derive(Default)]
pub struct FakeYouTube {
    pub fail_inserts: Mutex<Option<PlatformError>>,
    pub inserted: Mutex<Vec<String>>,
}

#[async_trait]
impl YouTubeApi for FakeYouTube {
    async fn live_chat_for_video(&self, _video_id: &str) -> Result<Option<String>, PlatformError> {
        Ok(Some("live-chat-1".into()))
    }

    async fn live_chat_for_channel(&self, _channel_id: &str) -> Result<Option<String>, PlatformError> {
        Ok(Some("live-chat-1".into()))
    }

    async fn insert_message(&self, _live_chat_id: &str, text: &str) -> Result<String, PlatformError> {
        if let Some(e) = self.fail_inserts.lock().clone() {
            return Err(e);
        }
        let mut inserted = self.inserted.lock();
        inserted.push(text.to_string());
        Ok(format!("msg-{}", inserted.len()))
    }
}

/// Configuration with Twitch chat credentials and, optionally, YouTube.
pub fn test_config(youtube: bool) -> AppConfig {
    let mut config = AppConfig::default();
    config.twitch.client_id = Some("client".into());
    config.twitch.access_token = Some("token".into());
    config.twitch.bot_username = Some("clipbot".into());
    config.twitch.bot_token = Some("oauth:bot".into());
    config.clips.processing_delay = Duration::from_secs(5);
    if youtube {
        config.youtube.access_token = Some("ya29".into());
        config.youtube.video_id = Some("video-1".into());
    }
    config
}

pub struct Harness {
    pub services: Arc<ServiceContainer>,
    pub helix: Arc<FakeHelix>,
    pub youtube: Arc<FakeYouTube>,
    pub chat_server: MockIrcServer,
}

/// Build and start a container wired to fakes.
pub async fn start(config: AppConfig) -> Harness {
    let helix = FakeHelix::new();
    let youtube = Arc::new(FakeYouTube::default());
    let chat_server = MockIrcServer::new();

    let services = Arc::new(ServiceContainer::with_backends(
        config,
        Backends {
            helix: helix.clone(),
            youtube: youtube.clone(),
            chat_transport: Arc::new(chat_server.clone()),
        },
    ));
    services.start().await;

    Harness {
        services,
        helix,
        youtube,
        chat_server,
    }
}
