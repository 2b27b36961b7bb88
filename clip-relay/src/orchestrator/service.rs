//! The clip state machine.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use super::events::{ClipResult, FailureReason, PostOutcome, Progress, RequestOutcome, Stage};
use super::request::ClipRequest;
use crate::hub::{BroadcastMessage, StatusHub};
use crate::platforms::{ChatPoster, ClipSource, CreatedClip, PlatformAvailability, PlatformTag};

const NOT_CONFIGURED: &str = "platform not configured";

/// Drives one clip request through validation, liveness, creation and posting.
///
/// Each stage is announced on the hub before its work starts and again with
/// its outcome. Requests share nothing but the adapters, so any number can
/// run at once; only a repeated `request_id` is refused while the first run
/// is still going.
pub struct ClipOrchestrator {
    clips: Arc<dyn ClipSource>,
    posters: HashMap<PlatformTag, Arc<dyn ChatPoster>>,
    availability: PlatformAvailability,
    hub: Arc<StatusHub>,
    in_flight: Mutex<HashSet<String>>,
}

impl ClipOrchestrator {
    pub fn new(
        clips: Arc<dyn ClipSource>,
        posters: Vec<Arc<dyn ChatPoster>>,
        availability: PlatformAvailability,
        hub: Arc<StatusHub>,
    ) -> Self {
        let posters = posters
            .into_iter()
            .map(|poster| (poster.platform(), poster))
            .collect();

        Self {
            clips,
            posters,
            availability,
            hub,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn availability(&self) -> PlatformAvailability {
        self.availability
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Run `request` to a terminal state.
    #[instrument(skip(self, request), fields(request_id = %request.request_id, channel = %request.channel))]
    pub async fn submit(&self, request: ClipRequest) -> RequestOutcome {
        if !self.in_flight.lock().insert(request.request_id.clone()) {
            warn!("Duplicate submission rejected");
            let reason = FailureReason::Duplicate(request.request_id.clone());
            self.hub.publish(
                BroadcastMessage::error(reason.code(), reason.to_string())
                    .with_request_id(&request.request_id),
            );
            return RequestOutcome::Failed {
                request_id: request.request_id,
                stage: Stage::Validating,
                reason,
            };
        }

        let _guard = InFlight {
            set: &self.in_flight,
            id: &request.request_id,
        };

        match self.run(&request).await {
            Ok(result) => {
                info!(
                    clip_id = %result.clip_id,
                    delivered = result.delivered_count(),
                    targets = result.per_platform_post_result.len(),
                    "Clip request completed"
                );
                self.hub.publish(BroadcastMessage::clip_created(result.clone()));
                RequestOutcome::Completed(result)
            }
            Err((stage, reason)) => {
                info!(stage = stage.as_str(), code = reason.code(), error = %reason, "Clip request failed");
                self.emit(
                    BroadcastMessage::status(&request.request_id, stage, Progress::Failed)
                        .with_code(reason.code())
                        .with_detail(reason.to_string()),
                );
                self.emit(
                    BroadcastMessage::status(&request.request_id, Stage::Failed, Progress::Entered)
                        .with_code(reason.code())
                        .with_detail(reason.to_string()),
                );
                RequestOutcome::Failed {
                    request_id: request.request_id.clone(),
                    stage,
                    reason,
                }
            }
        }
    }

    async fn run(&self, request: &ClipRequest) -> Result<ClipResult, (Stage, FailureReason)> {
        let id = request.request_id.as_str();

        self.enter(id, Stage::Validating);
        request
            .validate()
            .map_err(|msg| (Stage::Validating, FailureReason::Validation(msg)))?;
        self.succeed(id, Stage::Validating, None);

        self.enter(id, Stage::CheckingLive);
        if !self.clips.is_live(&request.channel).await {
            return Err((Stage::CheckingLive, FailureReason::NotLive));
        }
        self.succeed(id, Stage::CheckingLive, None);

        self.enter(id, Stage::CreatingClip);
        let clip = self
            .create_clip(request)
            .await
            .map_err(|reason| (Stage::CreatingClip, reason))?;
        self.succeed(id, Stage::CreatingClip, Some(clip.clip_url.clone()));

        self.enter(id, Stage::PostingToPlatforms);
        let per_platform_post_result = self.post_all(request, &clip).await;
        let delivered = per_platform_post_result.values().filter(|o| o.delivered).count();
        self.succeed(
            id,
            Stage::PostingToPlatforms,
            Some(format!(
                "delivered to {delivered} of {} platforms",
                per_platform_post_result.len()
            )),
        );

        Ok(ClipResult {
            request_id: request.request_id.clone(),
            channel: request.channel.clone(),
            clip_id: clip.clip_id,
            clip_url: clip.clip_url,
            edit_url: clip.edit_url,
            verified: clip.verified,
            per_platform_post_result,
            finished_at: Utc::now(),
        })
    }

    async fn create_clip(&self, request: &ClipRequest) -> Result<CreatedClip, FailureReason> {
        let identity = self.clips.resolve_channel_identity(&request.channel).await?;
        debug!(broadcaster_id = %identity.id, "Creating clip");
        let clip = self
            .clips
            .create_clip(&identity, request.duration(), request.title.as_deref())
            .await?;
        Ok(clip)
    }

    /// Post to every target concurrently. One platform failing never affects another.
    async fn post_all(
        &self,
        request: &ClipRequest,
        clip: &CreatedClip,
    ) -> BTreeMap<PlatformTag, PostOutcome> {
        let targets = match &request.target_platforms {
            Some(targets) => targets.iter().copied().collect(),
            None => self.availability.available(),
        };
        let text = request.render_message(&clip.clip_url);

        let posts = targets.into_iter().map(|tag| {
            let text = text.as_str();
            async move {
                let poster = self
                    .posters
                    .get(&tag)
                    .filter(|_| self.availability.is_available(tag));

                let outcome = match poster {
                    None => PostOutcome::failed(NOT_CONFIGURED),
                    Some(poster) => match poster.post_message(&request.channel, text).await {
                        Ok(detail) => PostOutcome::delivered(detail),
                        Err(e) => {
                            warn!(platform = %tag, code = e.code(), error = %e, "Posting clip failed");
                            PostOutcome::failed(e.to_string())
                        }
                    },
                };
                (tag, outcome)
            }
        });

        join_all(posts).await.into_iter().collect()
    }

    fn enter(&self, request_id: &str, stage: Stage) {
        debug!(stage = stage.as_str(), "Entering stage");
        self.emit(BroadcastMessage::status(request_id, stage, Progress::Entered));
    }

    fn succeed(&self, request_id: &str, stage: Stage, detail: Option<String>) {
        let mut message = BroadcastMessage::status(request_id, stage, Progress::Succeeded);
        message.detail = detail;
        self.emit(message);
    }

    fn emit(&self, message: BroadcastMessage) {
        self.hub.publish(message);
    }
}

/// Removes a request id from the in-flight set when the run ends or is dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(self.id);
    }
}
