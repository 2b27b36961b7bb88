//! YouTube Data API v3 client for live chat.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::platforms::PlatformError;

pub const YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Quota cost of each call, in API units.
pub mod cost {
    pub const VIDEOS_LIST: u64 = 1;
    pub const SEARCH_LIST: u64 = 100;
    pub const MESSAGE_INSERT: u64 = 50;
}

/// The YouTube calls the relay makes.
#[async_trait]
pub trait YouTubeApi: Send + Sync {
    /// Active live chat id of a broadcast, if it is live.
    async fn live_chat_for_video(&self, video_id: &str) -> Result<Option<String>, PlatformError>;

    /// Active live chat id of the channel's current broadcast, if any.
    async fn live_chat_for_channel(&self, channel_id: &str) -> Result<Option<String>, PlatformError>;

    /// Post a text message. Returns the new message id.
    async fn insert_message(&self, live_chat_id: &str, text: &str) -> Result<String, PlatformError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStreamingDetails {
    active_live_chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsertedMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}

/// Map a failed response to an error, honoring YouTube's `reason` codes.
pub(crate) fn classify_error(status: u16, body: &str) -> PlatformError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return PlatformError::from_status(status, body.chars().take(200).collect::<String>());
    };

    let message = envelope.error.message;
    let reason = envelope
        .error
        .errors
        .first()
        .map(|e| e.reason.as_str())
        .unwrap_or_default();

    match reason {
        "quotaExceeded" | "dailyLimitExceeded" | "rateLimitExceeded" => {
            PlatformError::QuotaExceeded(message)
        }
        "liveChatNotFound" | "liveChatEnded" | "liveChatDisabled" => {
            PlatformError::RoomNotFound(message)
        }
        _ => PlatformError::from_status(status, message),
    }
}

/// reqwest-backed [`YouTubeApi`].
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl YouTubeClient {
    pub fn new(http: Client, access_token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: YOUTUBE_BASE_URL.to_string(),
            access_token: access_token.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PlatformError> {
        let response = request.bearer_auth(&self.access_token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %body, "YouTube request failed");
            return Err(classify_error(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl YouTubeApi for YouTubeClient {
    async fn live_chat_for_video(&self, video_id: &str) -> Result<Option<String>, PlatformError> {
        let videos: ListResponse<VideoItem> = self
            .call(
                self.http
                    .get(self.url("videos"))
                    .query(&[("part", "liveStreamingDetails"), ("id", video_id)]),
            )
            .await?;

        Ok(videos
            .items
            .into_iter()
            .find_map(|v| v.live_streaming_details?.active_live_chat_id))
    }

    async fn live_chat_for_channel(&self, channel_id: &str) -> Result<Option<String>, PlatformError> {
        let results: ListResponse<SearchItem> = self
            .call(self.http.get(self.url("search")).query(&[
                ("part", "id"),
                ("channelId", channel_id),
                ("eventType", "live"),
                ("type", "video"),
            ]))
            .await?;

        match results.items.into_iter().find_map(|item| item.id.video_id) {
            Some(video_id) => self.live_chat_for_video(&video_id).await,
            None => Ok(None),
        }
    }

    async fn insert_message(&self, live_chat_id: &str, text: &str) -> Result<String, PlatformError> {
        let body = json!({
            "snippet": {
                "liveChatId": live_chat_id,
                "type": "textMessageEvent",
                "textMessageDetails": { "messageText": text },
            }
        });

        let message: InsertedMessage = self
            .call(
                self.http
                    .post(self.url("liveChat/messages"))
                    .query(&[("part", "snippet")])
                    .json(&body),
            )
            .await?;
        Ok(message.id)
    }
}
