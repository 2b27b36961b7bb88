//! Twitch chat poster, delegating to the shared chat connection.

use std::sync::Arc;

use async_trait::async_trait;
use chat_link::ChatManager;
use tracing::debug;

use crate::platforms::{ChatPoster, PlatformError, PlatformTag};

/// Posts into `#<channel>` through the [`ChatManager`].
pub struct TwitchChatPoster {
    chat: Arc<ChatManager>,
}

impl TwitchChatPoster {
    pub fn new(chat: Arc<ChatManager>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl ChatPoster for TwitchChatPoster {
    fn platform(&self) -> PlatformTag {
        PlatformTag::Twitch
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<String, PlatformError> {
        let receipt = self.chat.send(channel, text).await?;
        debug!(room = %receipt.room, acknowledged = receipt.acknowledged, "Posted to Twitch chat");

        Ok(if receipt.acknowledged {
            format!("delivered to {}", receipt.room)
        } else {
            format!("sent to {} (not acknowledged)", receipt.room)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_link::testing::MockIrcServer;
    use chat_link::{ChatConfig, ChatError, Ungated};

    fn poster(server: &MockIrcServer) -> (TwitchChatPoster, Arc<ChatManager>) {
        let chat = Arc::new(ChatManager::new(
            ChatConfig::new("twitch", "clipbot", "token"),
            Arc::new(server.clone()),
            Arc::new(Ungated),
        ));
        (TwitchChatPoster::new(chat.clone()), chat)
    }

    #[tokio::test(start_paused = true)]
    async fn test_posts_into_channel_room() {
        let server = MockIrcServer::new();
        let (poster, chat) = poster(&server);
        chat.connect().await.unwrap();

        let detail = poster.post_message("Alice", "hello").await.unwrap();
        assert_eq!(detail, "delivered to #alice");
        assert_eq!(
            server.sent_messages(),
            vec![("#alice".to_string(), "hello".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_connected_is_a_platform_error() {
        let server = MockIrcServer::new();
        let (poster, _chat) = poster(&server);

        let err = poster.post_message("alice", "hello").await.unwrap_err();
        assert_eq!(err, PlatformError::Chat(ChatError::NotConnected));
        assert_eq!(err.code(), "not-connected");
    }
}
