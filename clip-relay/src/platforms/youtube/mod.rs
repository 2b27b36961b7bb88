//! YouTube live chat.

pub mod api;
mod chat;

pub use api::{YouTubeApi, YouTubeClient};
pub use chat::{YouTubeChatPoster, YouTubeTarget};
