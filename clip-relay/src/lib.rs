//! clip-relay library crate.
//!
//! Creates Twitch clips on request and announces them in Twitch and YouTube
//! live chat, streaming every step to connected observers.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod hub;
pub mod logging;
pub mod orchestrator;
pub mod panic_hook;
pub mod platforms;
pub mod rate_limit;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
