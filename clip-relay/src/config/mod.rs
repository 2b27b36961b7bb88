//! Application configuration.
//!
//! Everything is read from environment variables (optionally seeded from a
//! `.env` file by the binary). Unset variables fall back to defaults; a set
//! but unparsable value is a configuration error rather than silently ignored.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chat_link::{ChatConfig, TWITCH_WS_URL};

use crate::api::server::ApiServerConfig;
use crate::cache::CacheTtls;
use crate::error::{Error, Result};
use crate::hub::DEFAULT_OBSERVER_CAPACITY;
use crate::orchestrator::{DEFAULT_MESSAGE_TEMPLATE, RequestDefaults};
use crate::platforms::PlatformAvailability;
use crate::platforms::twitch::{ClipTiming, validate_duration};

/// Twitch API and chat credentials.
#[derive(Debug, Clone, Default)]
pub struct TwitchConfig {
    pub client_id: Option<String>,
    pub access_token: Option<String>,
    pub bot_username: Option<String>,
    pub bot_token: Option<String>,
    pub chat_url: String,
    /// Channel used when a request or connection test names none.
    pub default_channel: Option<String>,
}

impl TwitchConfig {
    /// Helix calls need both a client id and a user access token.
    pub fn api_configured(&self) -> bool {
        self.client_id.is_some() && self.access_token.is_some()
    }

    pub fn chat_configured(&self) -> bool {
        self.bot_username.is_some() && self.bot_token.is_some()
    }
}

/// YouTube live chat settings.
#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub access_token: Option<String>,
    pub channel_id: Option<String>,
    pub video_id: Option<String>,
    /// Daily Data API quota in units.
    pub daily_quota: u64,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            channel_id: None,
            video_id: None,
            daily_quota: 10_000,
        }
    }
}

impl YouTubeConfig {
    pub fn configured(&self) -> bool {
        self.access_token.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ClipsConfig {
    pub default_duration: u32,
    pub processing_delay: Duration,
    pub verify: bool,
    pub message_template: String,
}

impl Default for ClipsConfig {
    fn default() -> Self {
        Self {
            default_duration: 30,
            processing_delay: Duration::from_secs(5),
            verify: true,
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
        }
    }
}

impl ClipsConfig {
    pub fn timing(&self) -> ClipTiming {
        ClipTiming {
            processing_delay: self.processing_delay,
            verify: self.verify,
        }
    }
}

/// Reconnect behavior of the chat connection.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub max_reconnect_attempts: u32,
    pub reconnect_interval: Duration,
    pub max_reconnect_interval: Duration,
    pub reconnect_decay: f64,
    pub join_timeout: Duration,
}

impl Default for ChatSettings {
    fn default() -> Self {
        let defaults = ChatConfig::default();
        Self {
            max_reconnect_attempts: defaults.max_reconnect_attempts,
            reconnect_interval: defaults.reconnect_interval,
            max_reconnect_interval: defaults.max_reconnect_interval,
            reconnect_decay: defaults.reconnect_decay,
            join_timeout: defaults.join_timeout,
        }
    }
}

/// Minimum spacing per rate-limited target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitsConfig {
    pub twitch_api: Duration,
    pub chat: Duration,
    pub youtube_api: Duration,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            twitch_api: Duration::from_millis(100),
            // 20 messages per 30 seconds for a non-moderator bot.
            chat: Duration::from_millis(1500),
            youtube_api: Duration::from_millis(1000),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiServerConfig,
    pub log_dir: PathBuf,
    pub twitch: TwitchConfig,
    pub youtube: YouTubeConfig,
    pub clips: ClipsConfig,
    pub chat: ChatSettings,
    pub limits: LimitsConfig,
    pub cache: CacheTtls,
    pub observer_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiServerConfig::default(),
            log_dir: PathBuf::from("logs"),
            twitch: TwitchConfig {
                chat_url: TWITCH_WS_URL.to_string(),
                ..Default::default()
            },
            youtube: YouTubeConfig::default(),
            clips: ClipsConfig::default(),
            chat: ChatSettings::default(),
            limits: LimitsConfig::default(),
            cache: CacheTtls::default(),
            observer_capacity: DEFAULT_OBSERVER_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let mut config = Self::default();

        if let Some(address) = env.string("API_BIND_ADDRESS") {
            config.api.bind_address = address;
        }
        if let Some(port) = env.parse::<u16>("API_PORT")? {
            config.api.port = port;
        }
        if let Some(dir) = env.string("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        config.twitch.client_id = env.string("TWITCH_CLIENT_ID");
        config.twitch.access_token = env.string("TWITCH_ACCESS_TOKEN");
        config.twitch.bot_username = env.string("TWITCH_BOT_USERNAME");
        config.twitch.bot_token = env.string("TWITCH_BOT_TOKEN");
        config.twitch.default_channel = env.string("DEFAULT_CHANNEL");
        if let Some(url) = env.string("TWITCH_CHAT_URL") {
            config.twitch.chat_url = url;
        }

        config.youtube.access_token = env.string("YOUTUBE_ACCESS_TOKEN");
        config.youtube.channel_id = env.string("YOUTUBE_CHANNEL_ID");
        config.youtube.video_id = env.string("YOUTUBE_VIDEO_ID");
        if let Some(quota) = env.parse("YOUTUBE_DAILY_QUOTA")? {
            config.youtube.daily_quota = quota;
        }

        if let Some(duration) = env.parse::<u32>("CLIP_DEFAULT_DURATION")? {
            validate_duration(duration)
                .map_err(|e| Error::config(format!("CLIP_DEFAULT_DURATION: {e}")))?;
            config.clips.default_duration = duration;
        }
        if let Some(delay) = env.secs("CLIP_PROCESSING_DELAY_SECS")? {
            config.clips.processing_delay = delay;
        }
        if let Some(verify) = env.flag("CLIP_VERIFY")? {
            config.clips.verify = verify;
        }
        if let Some(template) = env.string("CLIP_MESSAGE_TEMPLATE") {
            if !template.contains("{url}") {
                return Err(Error::config("CLIP_MESSAGE_TEMPLATE must contain {url}"));
            }
            config.clips.message_template = template;
        }

        if let Some(attempts) = env.parse("CHAT_MAX_RECONNECT_ATTEMPTS")? {
            config.chat.max_reconnect_attempts = attempts;
        }
        if let Some(interval) = env.millis("CHAT_RECONNECT_INTERVAL_MS")? {
            config.chat.reconnect_interval = interval;
        }
        if let Some(interval) = env.millis("CHAT_MAX_RECONNECT_INTERVAL_MS")? {
            config.chat.max_reconnect_interval = interval;
        }
        if let Some(decay) = env.parse::<f64>("CHAT_RECONNECT_DECAY")? {
            if !decay.is_finite() || decay < 1.0 {
                return Err(Error::config("CHAT_RECONNECT_DECAY must be at least 1.0"));
            }
            config.chat.reconnect_decay = decay;
        }
        if let Some(timeout) = env.millis("CHAT_JOIN_TIMEOUT_MS")? {
            config.chat.join_timeout = timeout;
        }

        if let Some(interval) = env.millis("TWITCH_API_MIN_INTERVAL_MS")? {
            config.limits.twitch_api = interval;
        }
        if let Some(interval) = env.millis("CHAT_MIN_INTERVAL_MS")? {
            config.limits.chat = interval;
        }
        if let Some(interval) = env.millis("YOUTUBE_MIN_INTERVAL_MS")? {
            config.limits.youtube_api = interval;
        }

        if let Some(ttl) = env.secs("CACHE_IDENTITY_TTL_SECS")? {
            config.cache.identity = ttl;
        }
        if let Some(ttl) = env.secs("CACHE_LIVENESS_TTL_SECS")? {
            config.cache.liveness = ttl;
        }
        if let Some(ttl) = env.secs("CACHE_CHAT_ROOM_TTL_SECS")? {
            config.cache.chat_room = ttl;
        }

        if let Some(capacity) = env.parse::<usize>("OBSERVER_QUEUE_CAPACITY")? {
            config.observer_capacity = capacity.max(1);
        }

        Ok(config)
    }

    /// Which platforms can be posted to with the configured credentials.
    pub fn availability(&self) -> PlatformAvailability {
        PlatformAvailability {
            twitch: self.twitch.chat_configured(),
            youtube: self.youtube.configured(),
        }
    }

    pub fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            channel: self.twitch.default_channel.clone(),
            duration_secs: self.clips.default_duration,
            message_template: self.clips.message_template.clone(),
        }
    }

    /// Chat connection settings for the bot account.
    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            max_reconnect_attempts: self.chat.max_reconnect_attempts,
            reconnect_interval: self.chat.reconnect_interval,
            max_reconnect_interval: self.chat.max_reconnect_interval,
            reconnect_decay: self.chat.reconnect_decay,
            join_timeout: self.chat.join_timeout,
            ..ChatConfig::new(
                "twitch",
                self.twitch.bot_username.clone().unwrap_or_default(),
                self.twitch.bot_token.clone().unwrap_or_default(),
            )
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; empty counts as unset.
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| Error::config(format!("{key}={raw}: {e}")))
            })
            .transpose()
    }

    fn millis(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_millis))
    }

    fn secs(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_secs))
    }

    fn flag(&self, key: &str) -> Result<Option<bool>> {
        self.string(key)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(Error::config(format!("{key}={raw}: expected a boolean"))),
            })
            .transpose()
    }
}
