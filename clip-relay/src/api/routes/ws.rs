//! Observer WebSocket.
//!
//! Each socket is attached to the status hub for its lifetime and receives
//! every broadcast as a JSON text frame. Observers may also submit requests:
//!
//! - `create-clip`: starts a request and answers with its id; progress
//!   arrives through the hub
//! - `test-connection`: the report is sent to this socket only
//! - `ping`: answered with `pong`

use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::models::InboundMessage;
use crate::api::server::AppState;
use crate::hub::BroadcastMessage;
use crate::orchestrator::{ClipRequest, Progress, Stage};

/// Heartbeat ping interval.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Replies addressed to a single socket.
const DIRECT_REPLY_CAPACITY: usize = 16;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(observer_ws))
}

async fn observer_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_json<S>(sender: &mut S, message: &BroadcastMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Failed to serialize broadcast message");
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut observer = state.hub.attach();
    let observer_id = observer.id();
    let (mut sender, mut receiver) = socket.split();

    if !send_json(&mut sender, &BroadcastMessage::connected(observer_id)).await {
        return;
    }
    debug!(observer_id, "Observer connected");

    let (reply_tx, mut reply_rx) = mpsc::channel::<BroadcastMessage>(DIRECT_REPLY_CAPACITY);
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_inbound(&state, text.as_str(), &reply_tx)
                            && !send_json(&mut sender, &reply).await
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let reply = BroadcastMessage::error("bad-request", "binary frames are not supported");
                        if !send_json(&mut sender, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(observer_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            message = observer.recv() => {
                let Some(message) = message else { break };
                if !send_json(&mut sender, &message).await {
                    break;
                }
            }

            Some(reply) = reply_rx.recv() => {
                if !send_json(&mut sender, &reply).await {
                    break;
                }
            }

            _ = heartbeat.tick() => {
                if awaiting_pong {
                    debug!(observer_id, "Observer missed heartbeat, closing");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }
        }
    }

    debug!(observer_id, "Observer disconnected");
}

/// Act on one inbound frame. Returns an immediate reply, if any.
fn handle_inbound(
    state: &AppState,
    text: &str,
    reply_tx: &mpsc::Sender<BroadcastMessage>,
) -> Option<BroadcastMessage> {
    let message = match InboundMessage::parse(text) {
        Ok(message) => message,
        Err(reason) => return Some(BroadcastMessage::error("bad-request", reason)),
    };

    match message {
        InboundMessage::Ping => Some(BroadcastMessage::pong()),
        InboundMessage::CreateClip(fields) => {
            let request = ClipRequest::new(fields, &state.request_defaults);
            // The id may have been generated here; tell the sender which one to follow.
            let accepted =
                BroadcastMessage::status(&request.request_id, Stage::Validating, Progress::Entered)
                    .with_detail("accepted");
            let orchestrator = state.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.submit(request).await;
            });
            Some(accepted)
        }
        InboundMessage::TestConnection(request) => {
            let tester = state.tester.clone();
            let reply_tx = reply_tx.clone();
            tokio::spawn(async move {
                let report = tester.run(request.channel.as_deref()).await;
                let _ = reply_tx.send(BroadcastMessage::connection_test(report)).await;
            });
            None
        }
    }
}
