//! Connection lifecycle tests against the in-process mock server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_link::testing::MockIrcServer;
use chat_link::{
    ChatConfig, ChatError, ChatLink, ChatManager, ChatTransport, ConnectionSnapshot,
    ConnectionState, SendGate, Ungated,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

fn config() -> ChatConfig {
    ChatConfig::new("twitch", "ClipBot", "secret")
}

fn manager(server: &MockIrcServer, config: ChatConfig) -> ChatManager {
    ChatManager::new(config, Arc::new(server.clone()), Arc::new(Ungated))
}

async fn wait_for(
    rx: &mut watch::Receiver<ConnectionSnapshot>,
    predicate: impl FnMut(&ConnectionSnapshot) -> bool,
) -> ConnectionSnapshot {
    tokio::time::timeout(Duration::from_secs(600), rx.wait_for(predicate))
        .await
        .expect("state not reached in time")
        .expect("driver stopped")
        .clone()
}

#[tokio::test(start_paused = true)]
async fn test_connect_join_and_send() {
    let server = MockIrcServer::new();
    let chat = manager(&server, config());

    chat.connect().await.unwrap();
    assert_eq!(chat.state(), ConnectionState::Connected);

    let receipt = chat.send("Alice", "clip: https://clips.twitch.tv/x").await.unwrap();
    assert!(receipt.acknowledged);
    assert_eq!(receipt.room, "#alice");

    let lines = server.sent_lines();
    assert_eq!(lines[0], "CAP REQ :twitch.tv/tags twitch.tv/commands");
    assert_eq!(lines[1], "PASS oauth:secret");
    assert_eq!(lines[2], "NICK clipbot");
    assert!(lines.contains(&"JOIN #alice".to_string()));
    assert_eq!(
        server.sent_messages(),
        vec![("#alice".to_string(), "clip: https://clips.twitch.tv/x".to_string())]
    );
    assert!(chat.snapshot().joined_rooms.contains("#alice"));
}

#[tokio::test(start_paused = true)]
async fn test_join_is_idempotent() {
    let server = MockIrcServer::new();
    let chat = manager(&server, config());
    chat.connect().await.unwrap();

    chat.join("alice").await.unwrap();
    chat.join("#ALICE").await.unwrap();
    chat.send("alice", "hi").await.unwrap();

    let joins = server
        .sent_lines()
        .into_iter()
        .filter(|l| l.starts_with("JOIN"))
        .count();
    assert_eq!(joins, 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent() {
    let server = MockIrcServer::new();
    let chat = manager(&server, config());

    chat.connect().await.unwrap();
    chat.connect().await.unwrap();
    assert_eq!(server.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credentials_fail_without_retry() {
    let server = MockIrcServer::new();
    server.reject_auth(true);
    let chat = manager(&server, config());

    let err = chat.connect().await.unwrap_err();
    assert!(matches!(err, ChatError::Authentication(_)));
    assert!(chat.state().is_terminal());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(server.open_count(), 1);
    assert_eq!(chat.send("alice", "hi").await, Err(ChatError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn test_send_before_connect_fails_fast() {
    let server = MockIrcServer::new();
    let chat = manager(&server, config());

    assert_eq!(chat.send("alice", "hi").await, Err(ChatError::NotConnected));
    assert_eq!(chat.join("alice").await, Err(ChatError::NotConnected));
    assert_eq!(server.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_join_timeout() {
    let server = MockIrcServer::new();
    server.silence_room("quiet");
    let chat = manager(&server, config());
    chat.connect().await.unwrap();

    let err = chat.join("quiet").await.unwrap_err();
    assert_eq!(
        err,
        ChatError::JoinTimeout {
            room: "#quiet".into()
        }
    );
    assert!(chat.snapshot().joined_rooms.is_empty());
    // Still usable afterwards.
    assert!(chat.state().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_join_echo_alone_does_not_complete_join() {
    let server = MockIrcServer::new();
    server.silence_room("echo");
    let chat = Arc::new(manager(&server, config()));
    chat.connect().await.unwrap();

    let join = tokio::spawn({
        let chat = chat.clone();
        async move { chat.join("echo").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    server.inject(":clipbot!clipbot@clipbot.tmi.twitch.tv JOIN #echo");

    assert_eq!(
        join.await.unwrap(),
        Err(ChatError::JoinTimeout {
            room: "#echo".into()
        })
    );
    assert!(chat.snapshot().joined_rooms.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_send_rejected_by_server() {
    let server = MockIrcServer::new();
    let chat = manager(&server, config());
    chat.connect().await.unwrap();
    chat.join("alice").await.unwrap();

    server.reject_room("alice", "msg_followersonly");
    let err = chat.send("alice", "hi").await.unwrap_err();
    assert_eq!(err, ChatError::rejected("msg_followersonly"));
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_send_is_reported() {
    let server = MockIrcServer::new();
    server.ack_sends(false);
    let chat = manager(&server, config());
    chat.connect().await.unwrap();

    let receipt = chat.send("alice", "hi").await.unwrap();
    assert!(!receipt.acknowledged);
}

#[tokio::test(start_paused = true)]
async fn test_message_validation_happens_before_writing() {
    let server = MockIrcServer::new();
    let chat = manager(&server, config());
    chat.connect().await.unwrap();

    let long = "x".repeat(501);
    assert!(matches!(
        chat.send("alice", &long).await,
        Err(ChatError::SendRejected { .. })
    ));
    assert!(matches!(
        chat.send("alice", " \r\n ").await,
        Err(ChatError::SendRejected { .. })
    ));

    chat.send("alice", "line one\r\nPRIVMSG #other :spam").await.unwrap();
    assert_eq!(
        server.sent_messages(),
        vec![(
            "#alice".to_string(),
            "line one  PRIVMSG #other :spam".to_string()
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_with_backoff_and_rejoins_rooms() {
    let server = MockIrcServer::new();
    let chat = manager(&server, config());
    chat.connect().await.unwrap();
    chat.join("alice").await.unwrap();

    let mut rx = chat.watch_state();
    server.refuse_next(2);
    server.drop_connections();

    wait_for(&mut rx, |s| {
        matches!(s.state, ConnectionState::Reconnecting { .. })
    })
    .await;
    assert_eq!(chat.send("alice", "hi").await, Err(ChatError::NotConnected));

    let snapshot = wait_for(&mut rx, |s| s.state.is_connected()).await;
    assert_eq!(snapshot.reconnect_attempt, 0);
    assert_eq!(snapshot.current_backoff_ms, 1000);
    assert!(snapshot.joined_rooms.contains("#alice"));
    assert_eq!(server.open_count(), 4);

    let joins = server
        .sent_lines()
        .into_iter()
        .filter(|l| l == "JOIN #alice")
        .count();
    assert_eq!(joins, 2);

    chat.send("alice", "back").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_grow_between_attempts() {
    let server = MockIrcServer::new();
    let chat = manager(&server, config());
    chat.connect().await.unwrap();

    let mut rx = chat.watch_state();
    server.refuse_connections(true);
    let started = tokio::time::Instant::now();
    server.drop_connections();

    wait_for(&mut rx, |s| {
        s.state == ConnectionState::Reconnecting { attempt: 3 }
    })
    .await;

    // 1s + 1.5s before the third attempt is scheduled.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(2500), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(4750), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let server = MockIrcServer::new();
    let chat = manager(
        &server,
        ChatConfig {
            max_reconnect_attempts: 3,
            ..config()
        },
    );
    chat.connect().await.unwrap();

    let mut rx = chat.watch_state();
    server.refuse_connections(true);
    server.drop_connections();

    let snapshot = wait_for(&mut rx, |s| s.state.is_terminal()).await;
    assert!(matches!(snapshot.state, ConnectionState::Failed { .. }));
    assert_eq!(server.open_count(), 4);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(server.open_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_initial_transport_failure_keeps_retrying() {
    let server = MockIrcServer::new();
    server.refuse_next(1);
    let chat = manager(&server, config());

    let err = chat.connect().await.unwrap_err();
    assert!(matches!(err, ChatError::Transport(_)));

    let mut rx = chat.watch_state();
    wait_for(&mut rx, |s| s.state.is_connected()).await;
    assert_eq!(server.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_final() {
    let server = MockIrcServer::new();
    let chat = manager(&server, config());
    chat.connect().await.unwrap();
    chat.join("alice").await.unwrap();

    chat.disconnect().await;
    assert_eq!(chat.state(), ConnectionState::Disconnected);
    assert!(chat.snapshot().joined_rooms.is_empty());
    assert_eq!(chat.send("alice", "hi").await, Err(ChatError::NotConnected));
    assert_eq!(chat.connect().await, Err(ChatError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn test_answers_server_ping() {
    let server = MockIrcServer::new();
    let chat = manager(&server, config());
    chat.connect().await.unwrap();

    server.inject("PING :tmi.twitch.tv");
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(server.sent_lines().contains(&"PONG :tmi.twitch.tv".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_server_reconnect_request_triggers_reconnect() {
    let server = MockIrcServer::new();
    let chat = manager(&server, config());
    chat.connect().await.unwrap();

    let mut rx = chat.watch_state();
    server.inject(":tmi.twitch.tv RECONNECT");

    wait_for(&mut rx, |s| {
        matches!(s.state, ConnectionState::Reconnecting { .. })
    })
    .await;
    wait_for(&mut rx, |s| s.state.is_connected()).await;
    assert_eq!(server.open_count(), 2);
}

#[derive(Default)]
struct RecordingGate {
    keys: Mutex<Vec<String>>,
}

#[async_trait]
impl SendGate for RecordingGate {
    async fn reserve(&self, key: &str) {
        self.keys.lock().push(key.to_string());
    }
}

#[tokio::test(start_paused = true)]
async fn test_every_send_passes_through_gate() {
    let server = MockIrcServer::new();
    let gate = Arc::new(RecordingGate::default());
    let chat = ChatManager::new(config(), Arc::new(server.clone()), gate.clone());
    chat.connect().await.unwrap();

    chat.send("alice", "one").await.unwrap();
    chat.send("bob", "two").await.unwrap();

    assert_eq!(
        *gate.keys.lock(),
        vec!["chat:twitch".to_string(), "chat:twitch".to_string()]
    );
}

/// Spaces reservations `interval` apart, like the service's rate limiter.
struct SpacingGate {
    interval: Duration,
    next: Mutex<Option<Instant>>,
}

#[async_trait]
impl SendGate for SpacingGate {
    async fn reserve(&self, _key: &str) {
        let slot = {
            let mut next = self.next.lock();
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_gate_spaces_wire_writes_when_join_is_slow() {
    let server = MockIrcServer::new();
    server.silence_room("slow");
    let gate = Arc::new(SpacingGate {
        interval: Duration::from_millis(1500),
        next: Mutex::new(None),
    });
    let chat = Arc::new(ChatManager::new(config(), Arc::new(server.clone()), gate));
    chat.connect().await.unwrap();

    let first = tokio::spawn({
        let chat = chat.clone();
        async move { chat.send("slow", "A").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = tokio::spawn({
        let chat = chat.clone();
        async move { chat.send("slow", "B").await }
    });

    let started = Instant::now();
    let mut written = Vec::new();
    let mut injected = false;
    while written.len() < 2 && started.elapsed() < Duration::from_secs(10) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if !injected && started.elapsed() >= Duration::from_secs(3) {
            server.inject(":tmi.twitch.tv ROOMSTATE #slow");
            injected = true;
        }
        if server.sent_messages().len() > written.len() {
            written.push(Instant::now());
        }
    }

    assert!(first.await.unwrap().unwrap().acknowledged);
    assert!(second.await.unwrap().unwrap().acknowledged);
    assert_eq!(written.len(), 2);
    let gap = written[1] - written[0];
    assert!(gap >= Duration::from_millis(1500), "gap {gap:?}");
}

/// Transport whose connection attempts never finish.
struct StalledTransport;

#[async_trait]
impl ChatTransport for StalledTransport {
    async fn open(&self) -> chat_link::Result<Box<dyn ChatLink>> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_connect_times_out_and_can_be_disconnected() {
    let chat = ChatManager::new(config(), Arc::new(StalledTransport), Arc::new(Ungated));

    let err = tokio::time::timeout(Duration::from_secs(60), chat.connect())
        .await
        .expect("connect never resolved")
        .unwrap_err();
    assert!(matches!(err, ChatError::Transport(_)));

    let mut rx = chat.watch_state();
    wait_for(&mut rx, |s| {
        matches!(s.state, ConnectionState::Reconnecting { .. })
    })
    .await;

    tokio::time::timeout(Duration::from_secs(60), chat.disconnect())
        .await
        .expect("disconnect never resolved");
    assert_eq!(chat.state(), ConnectionState::Disconnected);
}
