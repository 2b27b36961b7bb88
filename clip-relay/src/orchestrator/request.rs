//! Clip requests: wire fields, defaults, validation and message rendering.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::platforms::PlatformTag;
use crate::platforms::twitch::{MAX_CLIP_DURATION, MIN_CLIP_DURATION};

/// Longest clip title Twitch accepts.
pub const MAX_TITLE_CHARS: usize = 100;

pub const DEFAULT_MESSAGE_TEMPLATE: &str = "New clip: {url}";

/// Request fields as submitted by an observer or API client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRequestFields {
    /// Caller-chosen id; lets a client resubmit without running the flow twice.
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default, alias = "channel")]
    pub channel_identifier: Option<String>,
    #[serde(default, alias = "duration")]
    pub requested_duration_seconds: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub target_platforms: Option<Vec<PlatformTag>>,
    #[serde(default)]
    pub message_template: Option<String>,
}

/// Values used when a request leaves a field out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDefaults {
    pub channel: Option<String>,
    pub duration_secs: u32,
    pub message_template: String,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            channel: None,
            duration_secs: 30,
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
        }
    }
}

/// One orchestration attempt. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRequest {
    pub request_id: String,
    pub channel: String,
    pub duration_secs: i64,
    pub title: Option<String>,
    /// `None` means every configured platform.
    pub target_platforms: Option<BTreeSet<PlatformTag>>,
    pub message_template: String,
}

impl ClipRequest {
    /// Fill missing fields from `defaults` and assign a request id.
    pub fn new(fields: ClipRequestFields, defaults: &RequestDefaults) -> Self {
        let request_id = fields
            .request_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let channel = fields
            .channel_identifier
            .or_else(|| defaults.channel.clone())
            .unwrap_or_default()
            .trim()
            .trim_start_matches('#')
            .to_string();

        Self {
            request_id,
            channel,
            duration_secs: fields
                .requested_duration_seconds
                .unwrap_or(i64::from(defaults.duration_secs)),
            title: fields
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            target_platforms: fields.target_platforms.map(|tags| tags.into_iter().collect()),
            message_template: fields
                .message_template
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| defaults.message_template.clone()),
        }
    }

    /// Structural checks. No external calls.
    pub fn validate(&self) -> Result<(), String> {
        if self.channel.is_empty() {
            return Err("channel identifier is required".into());
        }
        if self.channel.chars().any(char::is_whitespace) {
            return Err(format!("channel identifier '{}' contains whitespace", self.channel));
        }

        let range = i64::from(MIN_CLIP_DURATION)..=i64::from(MAX_CLIP_DURATION);
        if !range.contains(&self.duration_secs) {
            return Err(format!(
                "duration must be between {MIN_CLIP_DURATION} and {MAX_CLIP_DURATION} seconds, got {}",
                self.duration_secs
            ));
        }

        if let Some(title) = &self.title
            && title.chars().count() > MAX_TITLE_CHARS
        {
            return Err(format!("title exceeds {MAX_TITLE_CHARS} characters"));
        }

        if !self.message_template.contains("{url}") {
            return Err("message template must contain {url}".into());
        }

        if self.target_platforms.as_ref().is_some_and(BTreeSet::is_empty) {
            return Err("at least one target platform is required".into());
        }

        Ok(())
    }

    /// Duration as passed to the clip source. Only meaningful after `validate`.
    pub fn duration(&self) -> u32 {
        u32::try_from(self.duration_secs).unwrap_or(0)
    }

    /// Substitute `{url}`, `{channel}` and `{title}` into the template.
    pub fn render_message(&self, clip_url: &str) -> String {
        self.message_template
            .replace("{url}", clip_url)
            .replace("{channel}", &self.channel)
            .replace("{title}", self.title.as_deref().unwrap_or_default())
    }
}
