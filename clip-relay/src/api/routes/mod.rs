//! API route modules.

pub mod clips;
pub mod health;
pub mod logging;
pub mod ws;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(ws::router())
        .nest("/api", clips::router())
        .nest("/api/health", health::router())
        .nest("/api/logging", logging::router())
        .with_state(state)
}
