//! Service container.
//!
//! Builds every long-lived component from [`AppConfig`] and owns the
//! background tasks that keep them running.

use std::sync::Arc;
use std::time::Duration;

use chat_link::{ChatError, ChatManager, ChatTransport, WebSocketTransport};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::LookupCache;
use crate::config::AppConfig;
use crate::hub::{BroadcastMessage, StatusHub};
use crate::orchestrator::ClipOrchestrator;
use crate::platforms::twitch::{HelixApi, HelixClient, TwitchChatPoster, TwitchClipSource};
use crate::platforms::youtube::{YouTubeApi, YouTubeChatPoster, YouTubeClient, YouTubeTarget};
use crate::platforms::{ChatPoster, ClipSource, PlatformAvailability};
use crate::rate_limit::{QuotaConfig, RateLimiter, keys};
use crate::services::ConnectionTester;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_http_client, install_rustls_provider};

/// How often expired cache entries are swept.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// External endpoints the service talks to.
pub struct Backends {
    pub helix: Arc<dyn HelixApi>,
    pub youtube: Arc<dyn YouTubeApi>,
    pub chat_transport: Arc<dyn ChatTransport>,
}

impl Backends {
    /// Real Helix, YouTube and Twitch chat endpoints.
    pub fn live(config: &AppConfig) -> Self {
        install_rustls_provider();
        let http = build_http_client(DEFAULT_REQUEST_TIMEOUT);

        Self {
            helix: Arc::new(HelixClient::new(
                http.clone(),
                config.twitch.client_id.clone().unwrap_or_default(),
                config.twitch.access_token.clone().unwrap_or_default(),
            )),
            youtube: Arc::new(YouTubeClient::new(
                http,
                config.youtube.access_token.clone().unwrap_or_default(),
            )),
            chat_transport: Arc::new(WebSocketTransport::new(config.twitch.chat_url.clone())),
        }
    }
}

/// Service container holding all application services.
pub struct ServiceContainer {
    pub config: Arc<AppConfig>,
    pub cache: LookupCache,
    pub limiter: RateLimiter,
    pub hub: Arc<StatusHub>,
    /// Present when chat credentials are configured.
    pub chat: Option<Arc<ChatManager>>,
    pub orchestrator: Arc<ClipOrchestrator>,
    pub tester: Arc<ConnectionTester>,
    pub availability: PlatformAvailability,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    pub fn new(config: AppConfig) -> Self {
        let backends = Backends::live(&config);
        Self::with_backends(config, backends)
    }

    /// Wire the services against the given backends.
    pub fn with_backends(config: AppConfig, backends: Backends) -> Self {
        info!("Initializing service container");

        let availability = config.availability();
        if !config.twitch.api_configured() {
            warn!("TWITCH_CLIENT_ID / TWITCH_ACCESS_TOKEN not set; clip creation will fail");
        }

        let cache = LookupCache::new(config.cache);
        let limiter = RateLimiter::default()
            .with_interval(keys::TWITCH_API, config.limits.twitch_api)
            .with_interval(keys::TWITCH_CHAT, config.limits.chat)
            .with_interval(keys::YOUTUBE_API, config.limits.youtube_api);
        limiter.set_quota(keys::YOUTUBE_API, QuotaConfig::daily(config.youtube.daily_quota));

        let hub = StatusHub::new(config.observer_capacity);

        let chat = availability.twitch.then(|| {
            Arc::new(ChatManager::new(
                config.chat_config(),
                backends.chat_transport.clone(),
                Arc::new(limiter.clone()),
            ))
        });

        let clips: Arc<dyn ClipSource> = Arc::new(TwitchClipSource::new(
            backends.helix,
            cache.clone(),
            limiter.clone(),
            config.clips.timing(),
        ));

        let mut posters: Vec<Arc<dyn ChatPoster>> = Vec::new();
        if let Some(chat) = &chat {
            posters.push(Arc::new(TwitchChatPoster::new(chat.clone())));
        }
        if availability.youtube {
            posters.push(Arc::new(YouTubeChatPoster::new(
                backends.youtube,
                cache.clone(),
                limiter.clone(),
                YouTubeTarget {
                    video_id: config.youtube.video_id.clone(),
                    channel_id: config.youtube.channel_id.clone(),
                },
            )));
        }

        let orchestrator = Arc::new(ClipOrchestrator::new(
            clips.clone(),
            posters,
            availability,
            hub.clone(),
        ));

        let tester = Arc::new(ConnectionTester::new(
            chat.clone(),
            clips,
            limiter.clone(),
            availability,
            config.twitch.default_channel.clone(),
        ));

        info!(platforms = ?availability.available(), "Service container initialized");

        Self {
            config: Arc::new(config),
            cache,
            limiter,
            hub,
            chat,
            orchestrator,
            tester,
            availability,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start background tasks and bring up the chat connection.
    ///
    /// Chat failures are logged, not returned: the service keeps running and
    /// reports the connection state through the hub and health endpoint.
    pub async fn start(&self) {
        self.cache
            .raw()
            .spawn_sweeper(CACHE_SWEEP_INTERVAL, self.cancellation_token.child_token());

        let Some(chat) = &self.chat else {
            info!("Chat credentials not configured; Twitch posting disabled");
            return;
        };

        self.spawn_chat_forwarder(chat.clone());

        match chat.connect().await {
            Ok(()) => info!(user = %chat.config().username, "Chat connected"),
            Err(ChatError::Authentication(reason)) => {
                warn!(reason = %reason, "Chat login rejected; check TWITCH_BOT_TOKEN");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Chat connection failed; retrying in the background");
                return;
            }
        }

        if let Some(channel) = &self.config.twitch.default_channel
            && let Err(e) = chat.join(channel).await
        {
            warn!(channel = %channel, error = %e, "Failed to join default channel");
        }
    }

    /// Republish chat connection changes to observers.
    fn spawn_chat_forwarder(&self, chat: Arc<ChatManager>) {
        let hub = self.hub.clone();
        let cancel = self.cancellation_token.child_token();
        let mut state_rx = chat.watch_state();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = state_rx.borrow_and_update().clone();
                        debug!(state = %snapshot.state, "Chat state changed");
                        hub.publish(BroadcastMessage::chat_status(snapshot));
                    }
                }
            }
            debug!("Chat state forwarder stopped");
        });
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Stop background tasks and close the chat connection.
    pub async fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
        if let Some(chat) = &self.chat {
            chat.disconnect().await;
        }
    }
}
