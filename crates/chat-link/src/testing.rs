//! In-process stand-in for the Twitch chat server.
//!
//! [`MockIrcServer`] implements [`ChatTransport`] and answers the driver the
//! way Twitch does: `001` after NICK, a JOIN/USERSTATE/ROOMSTATE burst after
//! JOIN, `USERSTATE` after PRIVMSG. Each behavior can be switched off to
//! exercise failure paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::error::{ChatError, Result};
use crate::irc::{self, IrcMessage};
use crate::transport::{ChatLink, ChatTransport};

#[derive(Debug, Default)]
struct Behavior {
    reject_auth: bool,
    refuse_all: bool,
    refuse_next: u32,
    ack_sends: bool,
    silent_rooms: HashSet<String>,
    rejecting_rooms: HashMap<String, String>,
}

#[derive(Debug)]
struct Shared {
    behavior: Mutex<Behavior>,
    sent: Mutex<Vec<String>>,
    opens: AtomicU32,
    epoch: watch::Sender<u64>,
    injectors: Mutex<Vec<mpsc::UnboundedSender<String>>>,
}

/// Scriptable fake chat server. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct MockIrcServer {
    shared: Arc<Shared>,
}

impl Default for MockIrcServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIrcServer {
    pub fn new() -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                behavior: Mutex::new(Behavior {
                    ack_sends: true,
                    ..Behavior::default()
                }),
                sent: Mutex::new(Vec::new()),
                opens: AtomicU32::new(0),
                epoch,
                injectors: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Answer NICK with a login failure NOTICE.
    pub fn reject_auth(&self, reject: bool) {
        self.shared.behavior.lock().reject_auth = reject;
    }

    /// Refuse every new connection while set.
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.behavior.lock().refuse_all = refuse;
    }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_next(&self, count: u32) {
        self.shared.behavior.lock().refuse_next = count;
    }

    /// Stop (or resume) confirming PRIVMSG with USERSTATE.
    pub fn ack_sends(&self, ack: bool) {
        self.shared.behavior.lock().ack_sends = ack;
    }

    /// Never acknowledge JOINs for this room.
    pub fn silence_room(&self, room: &str) {
        self.shared
            .behavior
            .lock()
            .silent_rooms
            .insert(irc::normalize_room(room));
    }

    /// Answer JOIN and PRIVMSG for this room with a NOTICE carrying `msg_id`.
    pub fn reject_room(&self, room: &str, msg_id: &str) {
        self.shared
            .behavior
            .lock()
            .rejecting_rooms
            .insert(irc::normalize_room(room), msg_id.to_string());
    }

    /// Sever every open link. Links opened afterwards are unaffected.
    pub fn drop_connections(&self) {
        self.shared.epoch.send_modify(|epoch| *epoch += 1);
    }

    /// Push a raw server line to every open link.
    pub fn inject(&self, line: &str) {
        self.shared
            .injectors
            .lock()
            .retain(|tx| tx.send(line.to_string()).is_ok());
    }

    /// Lines written by clients, in order, across all links.
    pub fn sent_lines(&self) -> Vec<String> {
        self.shared.sent.lock().clone()
    }

    /// `(room, text)` pairs of every PRIVMSG written.
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent_lines()
            .iter()
            .filter_map(|line| IrcMessage::parse(line))
            .filter(|msg| msg.command == "PRIVMSG")
            .filter_map(|msg| {
                let room = msg.channel()?.to_string();
                let text = msg.trailing()?.to_string();
                Some((room, text))
            })
            .collect()
    }

    /// Number of times a client tried to open a link.
    pub fn open_count(&self) -> u32 {
        self.shared.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for MockIrcServer {
    async fn open(&self) -> Result<Box<dyn ChatLink>> {
        self.shared.opens.fetch_add(1, Ordering::SeqCst);

        {
            let mut behavior = self.shared.behavior.lock();
            if behavior.refuse_all {
                return Err(ChatError::transport("connection refused"));
            }
            if behavior.refuse_next > 0 {
                behavior.refuse_next -= 1;
                return Err(ChatError::transport("connection refused"));
            }
        }

        let (tx, server_rx) = mpsc::unbounded_channel();
        self.shared.injectors.lock().push(tx);

        Ok(Box::new(MockLink {
            shared: self.shared.clone(),
            epoch: self.shared.epoch.subscribe(),
            server_rx,
            inbox: VecDeque::new(),
            nick: String::new(),
            closed: false,
        }))
    }
}

struct MockLink {
    shared: Arc<Shared>,
    epoch: watch::Receiver<u64>,
    server_rx: mpsc::UnboundedReceiver<String>,
    inbox: VecDeque<String>,
    nick: String,
    closed: bool,
}

impl MockLink {
    fn severed(&self) -> bool {
        self.closed || self.epoch.has_changed().unwrap_or(true)
    }

    fn respond(&mut self, line: &str) {
        let Some(msg) = IrcMessage::parse(line) else {
            return;
        };
        let behavior = self.shared.behavior.lock();

        match msg.command.as_str() {
            "NICK" => {
                self.nick = msg.channel().unwrap_or_default().to_string();
                if behavior.reject_auth {
                    self.inbox
                        .push_back(":tmi.twitch.tv NOTICE * :Login authentication failed".into());
                } else {
                    self.inbox
                        .push_back(format!(":tmi.twitch.tv 001 {} :Welcome, GLHF!", self.nick));
                }
            }
            "JOIN" => {
                let room = msg.channel().unwrap_or_default().to_string();
                if behavior.silent_rooms.contains(&room) {
                    return;
                }
                if let Some(msg_id) = behavior.rejecting_rooms.get(&room) {
                    self.inbox.push_back(format!(
                        "@msg-id={msg_id} :tmi.twitch.tv NOTICE {room} :You cannot join this room."
                    ));
                    return;
                }
                let nick = &self.nick;
                self.inbox.push_back(format!(
                    ":{nick}!{nick}@{nick}.tmi.twitch.tv JOIN {room}\r\n\
                     @badges=;color= :tmi.twitch.tv USERSTATE {room}\r\n\
                     @emote-only=0;followers-only=-1 :tmi.twitch.tv ROOMSTATE {room}"
                ));
            }
            "PRIVMSG" => {
                let room = msg.channel().unwrap_or_default().to_string();
                if let Some(msg_id) = behavior.rejecting_rooms.get(&room) {
                    self.inbox.push_back(format!(
                        "@msg-id={msg_id} :tmi.twitch.tv NOTICE {room} :Your message was not sent."
                    ));
                } else if behavior.ack_sends {
                    self.inbox
                        .push_back(format!("@badges=;color= :tmi.twitch.tv USERSTATE {room}"));
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl ChatLink for MockLink {
    async fn send(&mut self, line: &str) -> Result<()> {
        if self.severed() {
            return Err(ChatError::transport("connection reset"));
        }
        self.shared.sent.lock().push(line.to_string());
        self.respond(line);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        if self.severed() {
            return None;
        }
        if let Some(frame) = self.inbox.pop_front() {
            return Some(Ok(frame));
        }

        tokio::select! {
            _ = self.epoch.changed() => None,
            line = self.server_rx.recv() => line.map(Ok),
        }
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}
