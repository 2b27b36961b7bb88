//! Health check route.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::HealthResponse;
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let chat = state.chat.as_ref().map(|chat| chat.snapshot());
    let degraded = chat
        .as_ref()
        .is_some_and(|snapshot| !snapshot.state.is_connected());

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        chat,
        observers: state.hub.observer_count(),
        in_flight_requests: state.orchestrator.in_flight_count(),
        platforms: state.availability.available(),
    })
}
