//! HTTP and WebSocket surface.
//!
//! `/ws` streams status broadcasts to observers and accepts requests from
//! them; `/api/*` offers the same operations synchronously.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
