//! Twitch Helix REST client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::platforms::{ChannelIdentity, PlatformError};

pub const HELIX_BASE_URL: &str = "https://api.twitch.tv/helix";

/// Identifier and editor link of a freshly created clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipHandle {
    pub id: String,
    pub edit_url: Option<String>,
}

/// The Helix calls the relay makes.
#[async_trait]
pub trait HelixApi: Send + Sync {
    /// Look up a user by login. `None` if no such user.
    async fn find_user(&self, login: &str) -> Result<Option<ChannelIdentity>, PlatformError>;

    async fn stream_is_live(&self, broadcaster_id: &str) -> Result<bool, PlatformError>;

    async fn create_clip(
        &self,
        broadcaster_id: &str,
        duration_secs: u32,
        title: Option<&str>,
    ) -> Result<ClipHandle, PlatformError>;

    async fn clip_exists(&self, clip_id: &str) -> Result<bool, PlatformError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct HelixUser {
    id: String,
    login: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct HelixStream {
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct HelixCreatedClip {
    id: String,
    #[serde(default)]
    edit_url: Option<String>,
}

/// reqwest-backed [`HelixApi`].
#[derive(Debug, Clone)]
pub struct HelixClient {
    http: Client,
    base_url: String,
    client_id: String,
    access_token: String,
}

impl HelixClient {
    pub fn new(http: Client, client_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: HELIX_BASE_URL.to_string(),
            client_id: client_id.into(),
            access_token: access_token.into(),
        }
    }

    /// Point the client at another base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>, PlatformError> {
        let response = request
            .header("Client-Id", &self.client_id)
            .bearer_auth(self.access_token.trim_start_matches("oauth:"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %body, "Helix request failed");
            return Err(PlatformError::from_status(status.as_u16(), helix_message(&body)));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl HelixApi for HelixClient {
    async fn find_user(&self, login: &str) -> Result<Option<ChannelIdentity>, PlatformError> {
        let users: Vec<HelixUser> = self
            .fetch(self.http.get(self.url("users")).query(&[("login", login)]))
            .await?;

        Ok(users.into_iter().next().map(|user| ChannelIdentity {
            id: user.id,
            login: user.login,
            display_name: user.display_name,
        }))
    }

    async fn stream_is_live(&self, broadcaster_id: &str) -> Result<bool, PlatformError> {
        let streams: Vec<HelixStream> = self
            .fetch(
                self.http
                    .get(self.url("streams"))
                    .query(&[("user_id", broadcaster_id)]),
            )
            .await?;

        Ok(streams.iter().any(|stream| stream.kind == "live"))
    }

    async fn create_clip(
        &self,
        broadcaster_id: &str,
        duration_secs: u32,
        title: Option<&str>,
    ) -> Result<ClipHandle, PlatformError> {
        let duration = duration_secs.to_string();
        let mut query = vec![("broadcaster_id", broadcaster_id), ("duration", duration.as_str())];
        if let Some(title) = title {
            query.push(("title", title));
        }

        let clips: Vec<HelixCreatedClip> = self
            .fetch(self.http.post(self.url("clips")).query(&query))
            .await?;

        clips
            .into_iter()
            .next()
            .map(|clip| ClipHandle {
                id: clip.id,
                edit_url: clip.edit_url,
            })
            .ok_or_else(|| PlatformError::InvalidResponse("create clip returned no data".into()))
    }

    async fn clip_exists(&self, clip_id: &str) -> Result<bool, PlatformError> {
        let clips: Vec<serde_json::Value> = self
            .fetch(self.http.get(self.url("clips")).query(&[("id", clip_id)]))
            .await?;
        Ok(!clips.is_empty())
    }
}

/// Pull `message` out of a Helix error body, falling back to the raw body.
fn helix_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct HelixErrorBody {
        message: String,
    }

    serde_json::from_str::<HelixErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}
