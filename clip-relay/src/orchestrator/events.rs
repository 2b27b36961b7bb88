//! Stage vocabulary and request outcomes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platforms::{PlatformError, PlatformTag};

/// Where a request is in the clip flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Validating,
    CheckingLive,
    CreatingClip,
    PostingToPlatforms,
    Completed,
    Failed,
}

impl Stage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::CheckingLive => "checking-live",
            Stage::CreatingClip => "creating-clip",
            Stage::PostingToPlatforms => "posting-to-platforms",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

/// Progress within a stage: one message on entry, one with the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Progress {
    Entered,
    Succeeded,
    Failed,
}

/// Why a request ended in [`Stage::Failed`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("channel is not live")]
    NotLive,

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("request {0} is already in progress")]
    Duplicate(String),
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Validation(_) => "validation-error",
            FailureReason::NotLive => "not-live",
            FailureReason::Platform(e) => e.code(),
            FailureReason::Duplicate(_) => "duplicate-request",
        }
    }
}

/// Delivery outcome for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostOutcome {
    pub delivered: bool,
    pub detail: String,
}

impl PostOutcome {
    pub fn delivered(detail: impl Into<String>) -> Self {
        Self {
            delivered: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            delivered: false,
            detail: detail.into(),
        }
    }
}

/// A created clip and where it was announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipResult {
    pub request_id: String,
    pub channel: String,
    pub clip_id: String,
    pub clip_url: String,
    pub edit_url: Option<String>,
    pub verified: bool,
    pub per_platform_post_result: BTreeMap<PlatformTag, PostOutcome>,
    pub finished_at: DateTime<Utc>,
}

impl ClipResult {
    pub fn delivered_count(&self) -> usize {
        self.per_platform_post_result
            .values()
            .filter(|outcome| outcome.delivered)
            .count()
    }
}

/// Terminal result of [`ClipOrchestrator::submit`](super::ClipOrchestrator::submit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Completed(ClipResult),
    Failed {
        request_id: String,
        /// Stage that was running when the request failed.
        stage: Stage,
        reason: FailureReason,
    },
}

impl RequestOutcome {
    pub fn request_id(&self) -> &str {
        match self {
            RequestOutcome::Completed(result) => &result.request_id,
            RequestOutcome::Failed { request_id, .. } => request_id,
        }
    }

    pub fn result(&self) -> Option<&ClipResult> {
        match self {
            RequestOutcome::Completed(result) => Some(result),
            RequestOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            RequestOutcome::Completed(_) => None,
            RequestOutcome::Failed { reason, .. } => Some(reason),
        }
    }
}
