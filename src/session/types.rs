//! Session types for NanoClaw
//!
//! Core types for conversation state: sessions, message turns, roles and
//! tool calls. The same [`Message`] type is used for persisted session turns
//! and for the ephemeral message list sent to the model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted conversation.
///
/// `messages` is append-only except for [`Session::clear`]. Turns before
/// `last_consolidated` have already been folded into long-term memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier, usually "channel:chat_id"
    pub key: String,
    /// Ordered conversation turns
    pub messages: Vec<Message>,
    /// Consolidation watermark; always `<= messages.len()`
    #[serde(default)]
    pub last_consolidated: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new empty session.
    ///
    /// # Example
    /// ```
    /// use nanoclaw::session::Session;
    ///
    /// let session = Session::new("telegram:chat1");
    /// assert!(session.messages.is_empty());
    /// assert_eq!(session.last_consolidated, 0);
    /// ```
    pub fn new(key: &str) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            messages: Vec::new(),
            last_consolidated: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a turn and bumps `updated_at`.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Returns copies of the most recent `max_messages` turns, oldest first.
    ///
    /// # Example
    /// ```
    /// use nanoclaw::session::{Message, Session};
    ///
    /// let mut session = Session::new("test");
    /// for i in 0..5 {
    ///     session.add_message(Message::user(&format!("msg{}", i)));
    /// }
    /// let history = session.get_history(2);
    /// assert_eq!(history.len(), 2);
    /// assert_eq!(history[0].content, "msg3");
    /// ```
    pub fn get_history(&self, max_messages: usize) -> Vec<Message> {
        let start = self.messages.len().saturating_sub(max_messages);
        self.messages[start..].to_vec()
    }

    /// Empties the session and resets the consolidation watermark.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_consolidated = 0;
        self.updated_at = Utc::now();
    }

    /// Moves the consolidation watermark, clamped to the turn count.
    pub fn set_last_consolidated(&mut self, index: usize) {
        self.last_consolidated = index.min(self.messages.len());
        self.updated_at = Utc::now();
    }

    /// Number of turns not yet folded into long-term memory.
    pub fn unconsolidated_count(&self) -> usize {
        self.messages.len().saturating_sub(self.last_consolidated)
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// One multimodal content item of a user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    /// Usually a `data:<mime>;base64,...` URL
    pub url: String,
}

/// A single turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Text content (for multimodal messages, the text part)
    pub content: String,
    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the call this turn answers (tool results only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name (tool results only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Names of tools run while producing this assistant turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_used: Option<Vec<String>>,
    /// Inline images plus text; replaces `content` on the wire when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<ContentPart>>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
            tools_used: None,
            parts: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self::with_role(Role::User, content)
    }

    /// User message carrying inline content parts.
    pub fn user_with_parts(content: &str, parts: Vec<ContentPart>) -> Self {
        Self {
            parts: Some(parts),
            ..Self::with_role(Role::User, content)
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: &str) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Creates a tool result answering `tool_call_id`.
    ///
    /// # Example
    /// ```
    /// use nanoclaw::session::{Message, Role};
    ///
    /// let msg = Message::tool_result("call_1", "read_file", "contents");
    /// assert_eq!(msg.role, Role::Tool);
    /// assert_eq!(msg.name.as_deref(), Some("read_file"));
    /// ```
    pub fn tool_result(tool_call_id: &str, name: &str, content: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            name: Some(name.to_string()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// Records which tools produced this turn (builder pattern).
    pub fn with_tools_used(mut self, tools: Vec<String>) -> Self {
        if !tools.is_empty() {
            self.tools_used = Some(tools);
        }
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_call_id.is_some()
    }
}

/// Role of a message sender in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned identifier, echoed verbatim on the result
    pub id: String,
    pub name: String,
    /// Arguments as a JSON string
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    /// Parses the arguments JSON into the requested type.
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.arguments)
    }
}
