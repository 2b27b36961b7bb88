//! HTTP routes exercised through the router, without a listener.

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use clip_relay::api::AppState;
use clip_relay::api::routes::create_router;
use serde_json::{Value, json};
use tower::ServiceExt;

fn router(harness: &common::Harness) -> Router {
    create_router(AppState::from_container(&harness.services))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_health_reports_chat_and_platforms() {
    let harness = common::start(common::test_config(true)).await;

    let response = router(&harness)
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["chat"]["state"]["state"], "connected");
    assert_eq!(body["platforms"], json!(["twitch", "youtube"]));
    assert_eq!(body["inFlightRequests"], 0);
}

#[tokio::test(start_paused = true)]
async fn test_health_degraded_while_chat_is_down() {
    let harness = common::start(common::test_config(false)).await;
    harness.chat_server.refuse_connections(true);
    harness.chat_server.drop_connections();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let response = router(&harness)
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let body = read_json(response).await;
    assert_eq!(body["status"], "degraded");
}

#[tokio::test(start_paused = true)]
async fn test_create_clip_returns_result() {
    let harness = common::start(common::test_config(false)).await;
    harness.helix.set_live("alice", true);
    harness.helix.queue_clip_id("abc123");

    let response = router(&harness)
        .oneshot(post_json(
            "/api/clips",
            json!({ "channelIdentifier": "alice", "requestedDurationSeconds": 30 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["clipId"], "abc123");
    assert_eq!(body["clipUrl"], "https://clips.twitch.tv/abc123");
    assert_eq!(body["perPlatformPostResult"]["twitch"]["delivered"], true);
}

#[tokio::test(start_paused = true)]
async fn test_create_clip_validation_error() {
    let harness = common::start(common::test_config(false)).await;

    let response = router(&harness)
        .oneshot(post_json(
            "/api/clips",
            json!({ "channel": "alice", "requestedDurationSeconds": 90 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await;
    assert_eq!(body["code"], "validation-error");
    assert_eq!(body["details"]["stage"], "validating");
    assert_eq!(harness.helix.create_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_create_clip_offline_is_conflict() {
    let harness = common::start(common::test_config(false)).await;

    let response = router(&harness)
        .oneshot(post_json("/api/clips", json!({ "channel": "bob" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["code"], "not-live");
    assert_eq!(body["details"]["stage"], "checking-live");
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_request_id_is_rejected() {
    let harness = common::start(common::test_config(false)).await;
    harness.helix.set_live("alice", true);
    let app = router(&harness);

    let first = tokio::spawn(app.clone().oneshot(post_json(
        "/api/clips",
        json!({ "requestId": "req-1", "channel": "alice" }),
    )));
    while harness.services.orchestrator.in_flight_count() == 0 {
        tokio::task::yield_now().await;
    }

    let second = app
        .oneshot(post_json(
            "/api/clips",
            json!({ "requestId": "req-1", "channel": "alice" }),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(read_json(second).await["code"], "duplicate-request");

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(harness.helix.create_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_body_is_bad_request() {
    let harness = common::start(common::test_config(false)).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/clips")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = router(&harness).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["code"], "bad-request");
}

#[tokio::test(start_paused = true)]
async fn test_connection_test_with_and_without_body() {
    let harness = common::start(common::test_config(false)).await;
    harness.helix.set_live("alice", true);

    let response = router(&harness)
        .oneshot(post_json("/api/connection-test", json!({ "channel": "alice" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["channel"], "alice");
    assert_eq!(body["identity"]["id"], "id-alice");
    assert_eq!(body["live"], true);

    let response = router(&harness)
        .oneshot(
            Request::post("/api/connection-test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert!(body["channel"].is_null());
    assert_eq!(body["platforms"]["twitch"], true);
}
