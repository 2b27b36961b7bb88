//! Clip orchestration.
//!
//! A request moves through a fixed sequence of stages:
//!
//! ```text
//! Validating -> CheckingLive -> CreatingClip -> PostingToPlatforms -> Completed
//!      \             \               \
//!       +-------------+---------------+--> Failed
//! ```
//!
//! Posting failures are recorded per platform and never fail the request.

mod events;
mod request;
mod service;

pub use events::{ClipResult, FailureReason, PostOutcome, Progress, RequestOutcome, Stage};
pub use request::{
    ClipRequest, ClipRequestFields, DEFAULT_MESSAGE_TEMPLATE, MAX_TITLE_CHARS, RequestDefaults,
};
pub use service::ClipOrchestrator;
