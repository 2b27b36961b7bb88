//! Synchronous clip creation and connection testing.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};
use serde_json::json;
use tracing::error;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::ConnectionTestRequest;
use crate::api::server::AppState;
use crate::orchestrator::{ClipRequest, ClipRequestFields, ClipResult, RequestOutcome};
use crate::services::ConnectionReport;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clips", post(create_clip))
        .route("/connection-test", post(connection_test))
}

/// Run a clip request to completion and return its result.
///
/// Progress is broadcast to observers as usual. The request runs on its own
/// task, so a client that disconnects mid-flight does not abort it.
async fn create_clip(
    State(state): State<AppState>,
    payload: Result<Json<ClipRequestFields>, JsonRejection>,
) -> ApiResult<Json<ClipResult>> {
    let Json(fields) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let request = ClipRequest::new(fields, &state.request_defaults);

    let orchestrator = state.orchestrator.clone();
    let outcome = tokio::spawn(async move { orchestrator.submit(request).await })
        .await
        .map_err(|e| {
            error!(error = %e, "Clip request task failed");
            ApiError::internal("clip request aborted")
        })?;

    match outcome {
        RequestOutcome::Completed(result) => Ok(Json(result)),
        RequestOutcome::Failed {
            request_id,
            stage,
            reason,
        } => Err(ApiError::from(reason)
            .with_details(json!({ "requestId": request_id, "stage": stage }))),
    }
}

async fn connection_test(
    State(state): State<AppState>,
    payload: Option<Json<ConnectionTestRequest>>,
) -> Json<ConnectionReport> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    Json(state.tester.run(request.channel.as_deref()).await)
}
