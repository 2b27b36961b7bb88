//! Minimal IRC line codec for Twitch chat.
//!
//! Only the subset the relay needs is handled: tags, prefix, command and
//! parameters on the way in, and JOIN/PART/PRIVMSG/PONG on the way out.

use std::collections::HashMap;

/// Twitch rejects PRIVMSG bodies longer than this.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// NOTICE texts Twitch sends when PASS/NICK are refused.
const AUTH_FAILURE_NOTICES: &[&str] = &[
    "Login authentication failed",
    "Improperly formatted auth",
    "Invalid NICK",
];

/// A parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse a single line (without CRLF).
    pub fn parse(line: &str) -> Option<Self> {
        let mut remaining = line.trim_end_matches(['\r', '\n']);
        if remaining.is_empty() {
            return None;
        }

        let mut tags = HashMap::new();
        if let Some(rest) = remaining.strip_prefix('@') {
            let (tag_str, rest) = rest.split_once(' ')?;
            for tag in tag_str.split(';') {
                match tag.split_once('=') {
                    Some((key, value)) => tags.insert(key.to_string(), value.to_string()),
                    None => tags.insert(tag.to_string(), String::new()),
                };
            }
            remaining = rest.trim_start();
        }

        let mut prefix = None;
        if let Some(rest) = remaining.strip_prefix(':') {
            let (p, rest) = rest.split_once(' ')?;
            prefix = Some(p.to_string());
            remaining = rest.trim_start();
        }

        let (command, mut rest) = match remaining.split_once(' ') {
            Some((command, rest)) => (command, rest),
            None => (remaining, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    if !param.is_empty() {
                        params.push(param.to_string());
                    }
                    rest = tail;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nickname part of the prefix (`nick!user@host`).
    pub fn nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .and_then(|p| p.split('!').next())
            .filter(|n| !n.is_empty())
    }

    /// First parameter, which is the channel for JOIN/PART/NOTICE/USERSTATE.
    pub fn channel(&self) -> Option<&str> {
        self.params.first().map(String::as_str)
    }

    /// Trailing parameter.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Whether this NOTICE reports rejected credentials.
    pub fn is_auth_failure(&self) -> bool {
        self.command == "NOTICE"
            && self
                .trailing()
                .is_some_and(|text| AUTH_FAILURE_NOTICES.iter().any(|n| text.contains(n)))
    }
}

/// Normalize a channel name to `#lowercase`.
///
/// Whitespace and control characters are dropped so a room name can never
/// split into extra parameters or lines.
pub fn normalize_room(room: &str) -> String {
    let cleaned: String = room
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    format!("#{}", cleaned.trim_start_matches('#').to_lowercase())
}

/// Replace CR/LF so a message body can never smuggle extra commands.
pub fn sanitize_text(text: &str) -> String {
    text.replace(['\r', '\n'], " ").trim().to_string()
}

/// Handshake lines for an authenticated session.
pub fn handshake(username: &str, oauth_token: &str) -> Vec<String> {
    let pass = if oauth_token.starts_with("oauth:") {
        format!("PASS {oauth_token}")
    } else {
        format!("PASS oauth:{oauth_token}")
    };
    vec![
        "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string(),
        pass,
        format!("NICK {}", username.to_lowercase()),
    ]
}

pub fn join(room: &str) -> String {
    format!("JOIN {room}")
}

pub fn part(room: &str) -> String {
    format!("PART {room}")
}

pub fn privmsg(room: &str, text: &str) -> String {
    format!("PRIVMSG {room} :{text}")
}

/// Reply to a server `PING` line.
pub fn pong(ping: &IrcMessage) -> String {
    match ping.trailing() {
        Some(token) => format!("PONG :{token}"),
        None => "PONG :tmi.twitch.tv".to_string(),
    }
}
