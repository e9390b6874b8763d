//! Message types for the NanoClaw message bus
//!
//! Inbound events come from two places: channel adapters (a user typed
//! something) and the runtime itself (a background task finished). Both
//! travel on the same queue; [`MessageOrigin`] tells them apart.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who produced an inbound event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MessageOrigin {
    /// A real user on a channel
    #[default]
    User,
    /// Synthesized by the runtime (e.g. a subagent announcement).
    /// `channel` / `chat_id` on the message name the conversation to resume.
    System {
        /// Producer tag, e.g. `"subagent"`
        sender: String,
    },
}

/// Represents an incoming message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The channel this message came from (e.g., "cli", "telegram")
    pub channel: String,
    /// Unique identifier of the sender
    pub sender_id: String,
    /// Unique identifier of the chat/conversation
    pub chat_id: String,
    /// The text content of the message
    pub content: String,
    /// Local file paths of attached media
    #[serde(default)]
    pub media: Vec<String>,
    /// Session key for routing (format: "channel:chat_id")
    pub session_key: String,
    /// Additional metadata key-value pairs, echoed on the reply
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub origin: MessageOrigin,
}

/// Represents an outgoing message to be sent via a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The channel to send this message through
    pub channel: String,
    /// The chat/conversation to send to
    pub chat_id: String,
    /// The text content to send
    pub content: String,
    /// Optional message ID to reply to
    pub reply_to: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl InboundMessage {
    /// Creates a new user-originated message.
    ///
    /// The session key is automatically generated as "channel:chat_id".
    ///
    /// # Example
    /// ```
    /// use nanoclaw::bus::message::InboundMessage;
    ///
    /// let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello, bot!");
    /// assert_eq!(msg.session_key, "telegram:chat456");
    /// assert!(!msg.is_system());
    /// ```
    pub fn new(channel: &str, sender_id: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            media: Vec::new(),
            session_key: format!("{}:{}", channel, chat_id),
            metadata: HashMap::new(),
            origin: MessageOrigin::User,
        }
    }

    /// Creates a system-originated event addressed to an existing conversation.
    ///
    /// # Example
    /// ```
    /// use nanoclaw::bus::message::{InboundMessage, MessageOrigin};
    ///
    /// let msg = InboundMessage::system("subagent", "telegram", "chat456", "done");
    /// assert_eq!(msg.session_key, "telegram:chat456");
    /// assert_eq!(msg.origin, MessageOrigin::System { sender: "subagent".into() });
    /// ```
    pub fn system(sender: &str, origin_channel: &str, origin_chat_id: &str, content: &str) -> Self {
        let mut msg = Self::new(origin_channel, sender, origin_chat_id, content);
        msg.origin = MessageOrigin::System {
            sender: sender.to_string(),
        };
        msg
    }

    /// Attaches a local media file path (builder pattern).
    pub fn with_media(mut self, path: &str) -> Self {
        self.media.push(path.to_string());
        self
    }

    /// Adds a metadata key-value pair to the message (builder pattern).
    ///
    /// # Example
    /// ```
    /// use nanoclaw::bus::message::InboundMessage;
    ///
    /// let msg = InboundMessage::new("telegram", "user123", "chat456", "Hello")
    ///     .with_metadata("message_id", "12345");
    /// assert_eq!(msg.metadata.get("message_id"), Some(&"12345".to_string()));
    /// ```
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Routes this message to a different session than "channel:chat_id".
    pub fn with_session_key(mut self, key: &str) -> Self {
        self.session_key = key.to_string();
        self
    }

    pub fn has_media(&self) -> bool {
        !self.media.is_empty()
    }

    pub fn is_system(&self) -> bool {
        matches!(self.origin, MessageOrigin::System { .. })
    }
}

impl OutboundMessage {
    /// Creates a new outbound message.
    ///
    /// # Example
    /// ```
    /// use nanoclaw::bus::message::OutboundMessage;
    ///
    /// let msg = OutboundMessage::new("telegram", "chat456", "Hello from the bot!");
    /// assert_eq!(msg.channel, "telegram");
    /// ```
    pub fn new(channel: &str, chat_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            reply_to: None,
            metadata: HashMap::new(),
        }
    }

    /// Sets the message ID to reply to (builder pattern).
    pub fn with_reply(mut self, message_id: &str) -> Self {
        self.reply_to = Some(message_id.to_string());
        self
    }

    /// Creates a reply to an inbound message, carrying its metadata over.
    ///
    /// # Example
    /// ```
    /// use nanoclaw::bus::message::{InboundMessage, OutboundMessage};
    ///
    /// let inbound = InboundMessage::new("telegram", "user123", "chat456", "Hello")
    ///     .with_metadata("thread", "7");
    /// let response = OutboundMessage::reply_to(&inbound, "Hello back!");
    /// assert_eq!(response.chat_id, "chat456");
    /// assert_eq!(response.metadata.get("thread").map(String::as_str), Some("7"));
    /// ```
    pub fn reply_to(msg: &InboundMessage, content: &str) -> Self {
        let mut out = Self::new(&msg.channel, &msg.chat_id, content);
        out.metadata = msg.metadata.clone();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_defaults_to_user_origin() {
        let msg = InboundMessage::new("cli", "user", "direct", "hi");
        assert_eq!(msg.origin, MessageOrigin::User);
        assert!(!msg.has_media());
    }

    #[test]
    fn test_system_message_routes_to_origin() {
        let msg = InboundMessage::system("subagent", "discord", "room-9", "report");
        assert!(msg.is_system());
        assert_eq!(msg.channel, "discord");
        assert_eq!(msg.chat_id, "room-9");
        assert_eq!(msg.sender_id, "subagent");
        assert_eq!(msg.session_key, "discord:room-9");
    }

    #[test]
    fn test_with_media_and_session_key() {
        let msg = InboundMessage::new("cli", "u", "c", "look")
            .with_media("/tmp/a.png")
            .with_media("/tmp/b.png")
            .with_session_key("custom:key");
        assert_eq!(msg.media.len(), 2);
        assert_eq!(msg.session_key, "custom:key");
    }

    #[test]
    fn test_origin_serde_tagged() {
        let origin = MessageOrigin::System {
            sender: "subagent".into(),
        };
        let json = serde_json::to_value(&origin).unwrap();
        assert_eq!(json["kind"], "system");
        assert_eq!(json["sender"], "subagent");

        let back: MessageOrigin = serde_json::from_value(json).unwrap();
        assert_eq!(back, origin);
    }

    #[test]
    fn test_inbound_deserialize_without_optional_fields() {
        let json = r#"{"channel":"cli","sender_id":"u","chat_id":"c","content":"x","session_key":"cli:c"}"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.origin, MessageOrigin::User);
        assert!(msg.media.is_empty());
        assert!(msg.metadata.is_empty());
    }

    #[test]
    fn test_outbound_with_reply() {
        let msg = OutboundMessage::new("telegram", "chat456", "reply").with_reply("m1");
        assert_eq!(msg.reply_to.as_deref(), Some("m1"));
        assert!(msg.metadata.is_empty());
    }
}
