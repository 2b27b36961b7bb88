//! Twitch: Helix API clip source and IRC chat poster.

mod chat;
mod clips;
pub mod helix;

pub use chat::TwitchChatPoster;
pub use clips::{
    CLIP_BASE_URL, ClipTiming, MAX_CLIP_DURATION, MIN_CLIP_DURATION, TwitchClipSource, clip_url,
    validate_duration,
};
pub use helix::{ClipHandle, HelixApi, HelixClient};
