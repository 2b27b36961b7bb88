//! Chat connection manager.
//!
//! One [`ChatManager`] owns one persistent connection. All link I/O happens on
//! a single driver task; callers talk to it through a bounded command queue and
//! observe it through a `watch` snapshot and a `broadcast` event stream.
//!
//! Lifecycle:
//! - `Disconnected` -> `Connecting` on [`ChatManager::connect`]
//! - `Connecting` -> `Connected` after the server welcome (`001`)
//! - `Connected` -> `Reconnecting` on transport loss, back to `Connected` on success
//! - `Reconnecting` -> `Failed` after `max_reconnect_attempts` consecutive failures
//! - any state -> `Failed` when credentials are rejected (never retried)
//! - `Connected` -> `Disconnected` on [`ChatManager::disconnect`]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ChatError, Result};
use crate::gate::SendGate;
use crate::irc::{self, IrcMessage};
use crate::state::{ChatConfig, ChatEvent, ConnectionSnapshot, ConnectionState, SendReceipt};
use crate::transport::{ChatLink, ChatTransport};

const EVENT_CAPACITY: usize = 256;

/// Commands sent to the driver task.
#[derive(Debug)]
enum Command {
    Join {
        room: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Leave {
        room: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Send {
        room: String,
        text: String,
        reply: oneshot::Sender<Result<SendReceipt>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

impl Command {
    /// Answer the command without touching the link.
    fn reject(self, err: ChatError) {
        match self {
            Command::Join { reply, .. } | Command::Leave { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Command::Send { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Command::Disconnect { reply } => {
                let _ = reply.send(());
            }
        }
    }
}

/// Handle to a managed chat connection.
pub struct ChatManager {
    config: Arc<ChatConfig>,
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionSnapshot>,
    events: broadcast::Sender<ChatEvent>,
    /// Driver waiting to be started by the first `connect`.
    pending: Mutex<Option<Driver>>,
}

impl ChatManager {
    pub fn new(
        config: ChatConfig,
        transport: Arc<dyn ChatTransport>,
        gate: Arc<dyn SendGate>,
    ) -> Self {
        let config = Arc::new(config);
        let (command_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionSnapshot::initial(&config));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let driver = Driver {
            backoff: config.reconnect_interval,
            gate_key: config.gate_key(),
            config: config.clone(),
            transport,
            gate,
            commands,
            state_tx,
            events: events.clone(),
            ready: None,
            joined: BTreeSet::new(),
            attempt: 0,
        };

        Self {
            config,
            command_tx,
            state_rx,
            events,
            pending: Mutex::new(Some(driver)),
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Start the driver and wait for the first connection attempt.
    ///
    /// A transport failure still leaves the driver retrying in the background;
    /// rejected credentials leave the connection `Failed`.
    pub async fn connect(&self) -> Result<()> {
        let driver = self.pending.lock().take();
        let Some(mut driver) = driver else {
            return match self.state() {
                ConnectionState::Connected => Ok(()),
                _ => Err(ChatError::NotConnected),
            };
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        driver.ready = Some(ready_tx);
        driver.set_state(ConnectionState::Connecting);
        tokio::spawn(driver.run());

        ready_rx.await.unwrap_or(Err(ChatError::NotConnected))
    }

    /// Join a room. Joining an already joined room is a no-op.
    pub async fn join(&self, room: &str) -> Result<()> {
        self.ensure_connected()?;
        let room = room_name(room)?;
        let (reply, rx) = oneshot::channel();
        self.dispatch(Command::Join { room, reply }).await?;
        rx.await.unwrap_or(Err(ChatError::NotConnected))
    }

    /// Leave a room. Leaving a room that was never joined is a no-op.
    pub async fn leave(&self, room: &str) -> Result<()> {
        self.ensure_connected()?;
        let room = room_name(room)?;
        let (reply, rx) = oneshot::channel();
        self.dispatch(Command::Leave { room, reply }).await?;
        rx.await.unwrap_or(Err(ChatError::NotConnected))
    }

    /// Send a message, joining the room first if needed.
    pub async fn send(&self, room: &str, text: &str) -> Result<SendReceipt> {
        self.ensure_connected()?;

        let room = room_name(room)?;
        let text = irc::sanitize_text(text);
        if text.is_empty() {
            return Err(ChatError::rejected("empty message"));
        }
        if text.chars().count() > irc::MAX_MESSAGE_CHARS {
            return Err(ChatError::rejected(format!(
                "message exceeds {} characters",
                irc::MAX_MESSAGE_CHARS
            )));
        }

        let (reply, rx) = oneshot::channel();
        self.dispatch(Command::Send { room, text, reply }).await?;
        rx.await.unwrap_or(Err(ChatError::NotConnected))
    }

    /// Close the connection for good.
    pub async fn disconnect(&self) {
        let never_started = self.pending.lock().take();
        if let Some(mut driver) = never_started {
            driver.set_state(ConnectionState::Disconnected);
            return;
        }

        let (reply, rx) = oneshot::channel();
        if self
            .command_tx
            .send(Command::Disconnect { reply })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().state.clone()
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.state_rx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.state_rx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state().is_connected() {
            Ok(())
        } else {
            Err(ChatError::NotConnected)
        }
    }

    async fn dispatch(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ChatError::NotConnected)
    }
}

/// Why the serve loop returned.
enum Served {
    Lost(String),
    Stopped,
}

/// The single task that owns the link.
struct Driver {
    config: Arc<ChatConfig>,
    transport: Arc<dyn ChatTransport>,
    /// Spaces PRIVMSG writes under `gate_key`.
    gate: Arc<dyn SendGate>,
    gate_key: String,
    commands: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionSnapshot>,
    events: broadcast::Sender<ChatEvent>,
    ready: Option<oneshot::Sender<Result<()>>>,
    joined: BTreeSet<String>,
    attempt: u32,
    backoff: Duration,
}

impl Driver {
    async fn run(mut self) {
        let mut link = match self.establish().await {
            Ok(link) => {
                self.on_connected();
                Some(link)
            }
            Err(e @ ChatError::Authentication(_)) => {
                self.fail(&e);
                self.drain().await;
                return;
            }
            Err(e) => {
                warn!(network = %self.config.network, error = %e, "Initial chat connection failed");
                self.notify_ready(Err(e));
                None
            }
        };

        loop {
            let current = match link.take() {
                Some(current) => current,
                None => match self.reconnect().await {
                    Some(current) => current,
                    None => break,
                },
            };

            match self.serve(current).await {
                Served::Lost(reason) => {
                    warn!(network = %self.config.network, reason = %reason, "Chat transport lost");
                }
                Served::Stopped => break,
            }
        }

        debug!(network = %self.config.network, "Chat driver stopped");
    }

    /// Process commands and inbound frames until the link drops or we are told to stop.
    async fn serve(&mut self, mut link: Box<dyn ChatLink>) -> Served {
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        None => {
                            link.close().await;
                            self.set_state(ConnectionState::Disconnected);
                            return Served::Stopped;
                        }
                        Some(Command::Disconnect { reply }) => {
                            link.close().await;
                            self.joined.clear();
                            self.set_state(ConnectionState::Disconnected);
                            info!(network = %self.config.network, "Chat connection closed");
                            let _ = reply.send(());
                            return Served::Stopped;
                        }
                        Some(command) => {
                            if let Some(reason) = self.execute(&mut link, command).await {
                                link.close().await;
                                return Served::Lost(reason);
                            }
                        }
                    }
                }

                frame = link.recv() => {
                    let outcome = match frame {
                        Some(Ok(text)) => self.handle_frame(&mut link, &text).await,
                        Some(Err(e)) => Err(e),
                        None => Err(ChatError::transport("closed by peer")),
                    };
                    if let Err(e) = outcome {
                        link.close().await;
                        return Served::Lost(e.to_string());
                    }
                }
            }
        }
    }

    /// Run one command against a live link. Returns the loss reason if the link died.
    async fn execute(&mut self, link: &mut Box<dyn ChatLink>, command: Command) -> Option<String> {
        match command {
            Command::Join { room, reply } => {
                let result = self.join_room(link, &room).await;
                let lost = lost_reason(&result);
                let _ = reply.send(result.map_err(into_caller_error));
                lost
            }
            Command::Leave { room, reply } => {
                let result = self.leave_room(link, &room).await;
                let lost = lost_reason(&result);
                let _ = reply.send(result.map_err(into_caller_error));
                lost
            }
            Command::Send { room, text, reply } => {
                let result = self.send_message(link, &room, &text).await;
                let lost = lost_reason(&result);
                let _ = reply.send(result.map_err(into_caller_error));
                lost
            }
            Command::Disconnect { reply } => {
                let _ = reply.send(());
                None
            }
        }
    }

    async fn join_room(&mut self, link: &mut Box<dyn ChatLink>, room: &str) -> Result<()> {
        if self.joined.contains(room) {
            return Ok(());
        }

        link.send(&irc::join(room)).await?;

        // ROOMSTATE closes Twitch's join burst (JOIN, NAMES, USERSTATE, ROOMSTATE).
        let timeout = self.config.join_timeout;
        let outcome = self
            .await_reply(link, timeout, |msg| match msg.command.as_str() {
                "ROOMSTATE" if msg.channel() == Some(room) => Some(Ok(())),
                "NOTICE" if msg.channel() == Some(room) => Some(Err(rejection(msg))),
                _ => None,
            })
            .await?;

        match outcome {
            Some(Ok(())) => {
                self.joined.insert(room.to_string());
                self.publish_snapshot();
                let _ = self.events.send(ChatEvent::Joined {
                    room: room.to_string(),
                });
                debug!(network = %self.config.network, room = %room, "Joined chat room");
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Err(ChatError::JoinTimeout {
                room: room.to_string(),
            }),
        }
    }

    async fn leave_room(&mut self, link: &mut Box<dyn ChatLink>, room: &str) -> Result<()> {
        if !self.joined.contains(room) {
            return Ok(());
        }

        link.send(&irc::part(room)).await?;
        self.joined.remove(room);
        self.publish_snapshot();
        let _ = self.events.send(ChatEvent::Parted {
            room: room.to_string(),
        });
        Ok(())
    }

    async fn send_message(
        &mut self,
        link: &mut Box<dyn ChatLink>,
        room: &str,
        text: &str,
    ) -> Result<SendReceipt> {
        self.join_room(link, room).await?;
        self.gate.reserve(&self.gate_key).await;
        link.send(&irc::privmsg(room, text)).await?;

        let timeout = self.config.send_ack_timeout;
        let outcome = self
            .await_reply(link, timeout, |msg| match msg.command.as_str() {
                "USERSTATE" if msg.channel() == Some(room) => Some(Ok(())),
                "NOTICE" if msg.channel() == Some(room) => Some(Err(rejection(msg))),
                _ => None,
            })
            .await?;

        match outcome {
            Some(Ok(())) => Ok(SendReceipt {
                room: room.to_string(),
                acknowledged: true,
            }),
            Some(Err(e)) => Err(e),
            None => {
                debug!(network = %self.config.network, room = %room, "Send not acknowledged within window");
                Ok(SendReceipt {
                    room: room.to_string(),
                    acknowledged: false,
                })
            }
        }
    }

    /// Open a link and complete the PASS/NICK exchange.
    async fn establish(&mut self) -> Result<Box<dyn ChatLink>> {
        let mut link = tokio::time::timeout(self.config.handshake_timeout, self.transport.open())
            .await
            .map_err(|_| ChatError::transport("connect timed out"))??;

        for line in irc::handshake(&self.config.username, &self.config.oauth_token) {
            link.send(&line).await?;
        }

        let timeout = self.config.handshake_timeout;
        let outcome = self
            .await_reply(&mut link, timeout, |msg| {
                if msg.command == "001" {
                    Some(Ok(()))
                } else if msg.is_auth_failure() {
                    let reason = msg.trailing().unwrap_or("credentials rejected");
                    Some(Err(ChatError::Authentication(reason.to_string())))
                } else {
                    None
                }
            })
            .await;

        match outcome {
            Ok(Some(Ok(()))) => Ok(link),
            Ok(Some(Err(e))) | Err(e) => {
                link.close().await;
                Err(e)
            }
            Ok(None) => {
                link.close().await;
                Err(ChatError::transport("handshake timed out"))
            }
        }
    }

    /// Back off and retry until connected, failed, or stopped.
    async fn reconnect(&mut self) -> Option<Box<dyn ChatLink>> {
        loop {
            if self.attempt >= self.config.max_reconnect_attempts {
                let reason = format!("gave up after {} reconnect attempts", self.attempt);
                self.fail(&ChatError::transport(reason));
                self.drain().await;
                return None;
            }

            self.attempt += 1;
            let delay = self.backoff;
            self.backoff = next_backoff(delay, &self.config);
            self.set_state(ConnectionState::Reconnecting {
                attempt: self.attempt,
            });
            info!(
                network = %self.config.network,
                attempt = self.attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to chat"
            );

            if !self.idle(delay).await {
                return None;
            }

            let mut link = match self.establish().await {
                Ok(link) => link,
                Err(e @ ChatError::Authentication(_)) => {
                    self.fail(&e);
                    self.drain().await;
                    return None;
                }
                Err(e) => {
                    warn!(network = %self.config.network, attempt = self.attempt, error = %e, "Reconnect attempt failed");
                    continue;
                }
            };

            match self.rejoin(&mut link).await {
                Ok(()) => {
                    self.on_connected();
                    return Some(link);
                }
                Err(e) => {
                    warn!(network = %self.config.network, error = %e, "Link lost while re-joining rooms");
                    link.close().await;
                }
            }
        }
    }

    /// Re-join rooms from the previous session. Rooms that refuse are dropped.
    async fn rejoin(&mut self, link: &mut Box<dyn ChatLink>) -> Result<()> {
        let rooms = std::mem::take(&mut self.joined);
        let mut remaining: Vec<String> = rooms.iter().cloned().collect();

        while let Some(room) = remaining.first().cloned() {
            match self.join_room(link, &room).await {
                Ok(()) => {}
                Err(e @ ChatError::Transport(_)) => {
                    self.joined.extend(remaining);
                    return Err(e);
                }
                Err(e) => {
                    warn!(network = %self.config.network, room = %room, error = %e, "Dropping room after failed re-join");
                }
            }
            remaining.remove(0);
        }
        Ok(())
    }

    /// Sleep while answering commands with `NotConnected`. Returns `false` if told to stop.
    async fn idle(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    None => {
                        self.set_state(ConnectionState::Disconnected);
                        return false;
                    }
                    Some(Command::Disconnect { reply }) => {
                        self.joined.clear();
                        self.set_state(ConnectionState::Disconnected);
                        let _ = reply.send(());
                        return false;
                    }
                    Some(command) => command.reject(ChatError::NotConnected),
                },
            }
        }
    }

    /// After a terminal failure, keep answering until the manager goes away.
    async fn drain(&mut self) {
        while let Some(command) = self.commands.recv().await {
            let stop = matches!(command, Command::Disconnect { .. });
            command.reject(ChatError::NotConnected);
            if stop {
                break;
            }
        }
    }

    /// Read frames until `matcher` accepts a line or `timeout` passes.
    ///
    /// Lines the matcher ignores still get normal handling (PING, NOTICE, ...).
    async fn await_reply<R>(
        &mut self,
        link: &mut Box<dyn ChatLink>,
        timeout: Duration,
        mut matcher: impl FnMut(&IrcMessage) -> Option<R> + Send,
    ) -> Result<Option<R>> {
        let deadline = Instant::now() + timeout;

        loop {
            let text = match tokio::time::timeout_at(deadline, link.recv()).await {
                Err(_) => return Ok(None),
                Ok(None) => return Err(ChatError::transport("closed by peer")),
                Ok(Some(Err(e))) => return Err(as_transport(e)),
                Ok(Some(Ok(text))) => text,
            };

            let mut matched = None;
            for line in text.lines() {
                let Some(msg) = IrcMessage::parse(line) else {
                    continue;
                };
                if matched.is_none()
                    && let Some(result) = matcher(&msg)
                {
                    matched = Some(result);
                    continue;
                }
                self.handle_message(link, &msg).await?;
            }

            if matched.is_some() {
                return Ok(matched);
            }
        }
    }

    async fn handle_frame(&mut self, link: &mut Box<dyn ChatLink>, text: &str) -> Result<()> {
        for line in text.lines() {
            if let Some(msg) = IrcMessage::parse(line) {
                self.handle_message(link, &msg).await?;
            }
        }
        Ok(())
    }

    async fn handle_message(&mut self, link: &mut Box<dyn ChatLink>, msg: &IrcMessage) -> Result<()> {
        match msg.command.as_str() {
            "PING" => link.send(&irc::pong(msg)).await,
            "RECONNECT" => Err(ChatError::transport("server requested reconnect")),
            "NOTICE" => {
                let room = msg.channel().filter(|c| c.starts_with('#')).map(str::to_string);
                let text = msg.trailing().unwrap_or_default().to_string();
                debug!(network = %self.config.network, room = ?room, notice = %text, "Chat notice");
                let _ = self.events.send(ChatEvent::Notice {
                    room,
                    msg_id: msg.tag("msg-id").map(str::to_string),
                    text,
                });
                Ok(())
            }
            "PART" => {
                let ours = msg
                    .nick()
                    .is_some_and(|n| n.eq_ignore_ascii_case(&self.config.username));
                if ours
                    && let Some(room) = msg.channel()
                    && self.joined.remove(room)
                {
                    self.publish_snapshot();
                    let _ = self.events.send(ChatEvent::Parted {
                        room: room.to_string(),
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_connected(&mut self) {
        self.attempt = 0;
        self.backoff = self.config.reconnect_interval;
        self.set_state(ConnectionState::Connected);
        info!(network = %self.config.network, user = %self.config.username, "Chat connected");
        self.notify_ready(Ok(()));
    }

    fn fail(&mut self, err: &ChatError) {
        error!(network = %self.config.network, error = %err, "Chat connection failed permanently");
        self.set_state(ConnectionState::Failed {
            reason: err.to_string(),
        });
        self.notify_ready(Err(err.clone()));
    }

    fn notify_ready(&mut self, result: Result<()>) {
        if let Some(tx) = self.ready.take() {
            let _ = tx.send(result);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        let changed = self.state_tx.borrow().state != state;
        self.write_snapshot(Some(state.clone()));
        if changed {
            let _ = self.events.send(ChatEvent::StateChanged(state));
        }
    }

    fn publish_snapshot(&mut self) {
        self.write_snapshot(None);
    }

    fn write_snapshot(&self, state: Option<ConnectionState>) {
        let joined = self.joined.clone();
        let attempt = self.attempt;
        let backoff_ms = self.backoff.as_millis() as u64;
        self.state_tx.send_modify(|snapshot| {
            if let Some(state) = state {
                snapshot.state = state;
            }
            snapshot.joined_rooms = joined;
            snapshot.reconnect_attempt = attempt;
            snapshot.current_backoff_ms = backoff_ms;
        });
    }
}

/// Normalized room name, rejecting names that are empty once cleaned.
fn room_name(room: &str) -> Result<String> {
    let room = irc::normalize_room(room);
    if room.len() < 2 {
        return Err(ChatError::rejected("empty room name"));
    }
    Ok(room)
}

fn next_backoff(current: Duration, config: &ChatConfig) -> Duration {
    let next = current.mul_f64(config.reconnect_decay.max(1.0));
    next.min(config.max_reconnect_interval)
}

fn rejection(msg: &IrcMessage) -> ChatError {
    let reason = msg
        .tag("msg-id")
        .or_else(|| msg.trailing())
        .unwrap_or("rejected by server");
    ChatError::rejected(reason)
}

fn as_transport(err: ChatError) -> ChatError {
    match err {
        ChatError::Transport(_) => err,
        other => ChatError::transport(other.to_string()),
    }
}

fn lost_reason<T>(result: &Result<T>) -> Option<String> {
    match result {
        Err(ChatError::Transport(reason)) => Some(reason.clone()),
        _ => None,
    }
}

/// A caller never sees the raw transport fault; the link is gone, so it is `NotConnected`.
fn into_caller_error(err: ChatError) -> ChatError {
    match err {
        ChatError::Transport(_) => ChatError::NotConnected,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_backoff_grows_and_caps() {
        let config = ChatConfig {
            reconnect_interval: Duration::from_millis(1000),
            max_reconnect_interval: Duration::from_millis(3000),
            reconnect_decay: 1.5,
            ..ChatConfig::default()
        };

        let first = next_backoff(config.reconnect_interval, &config);
        assert_eq!(first, Duration::from_millis(1500));
        let second = next_backoff(first, &config);
        assert_eq!(second, Duration::from_millis(2250));
        let third = next_backoff(second, &config);
        assert_eq!(third, Duration::from_millis(3000));
    }

    #[test]
    fn test_rejection_prefers_msg_id() {
        let msg = IrcMessage::parse(
            "@msg-id=msg_followersonly :tmi.twitch.tv NOTICE #alice :This room is in followers-only mode.",
        )
        .unwrap();
        assert_eq!(
            rejection(&msg),
            ChatError::SendRejected {
                reason: "msg_followersonly".into()
            }
        );
    }

    #[test]
    fn test_room_name_rejects_empty_names() {
        assert_eq!(room_name("#Alice").unwrap(), "#alice");
        assert_eq!(room_name(" # \r\n"), Err(ChatError::rejected("empty room name")));
    }

    #[test]
    fn test_transport_errors_become_not_connected_for_callers() {
        assert_eq!(
            into_caller_error(ChatError::transport("gone")),
            ChatError::NotConnected
        );
        assert_eq!(
            into_caller_error(ChatError::rejected("x")),
            ChatError::rejected("x")
        );
    }
}
