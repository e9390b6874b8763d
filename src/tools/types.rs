//! Tool types for NanoClaw
//!
//! The `Tool` trait every tool implements, and the `ToolContext` passed to
//! each call. Routing state (which chat a tool is acting for) travels in the
//! context on every call; tools themselves stay immutable and shareable.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::memory::UserContext;

/// A capability the model can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to call the tool
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments object
    fn parameters(&self) -> Value;

    /// Runs the tool. An `Err` is reported back to the model as text; it never
    /// aborts the agent loop.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String>;

    /// Tools that act on "the current conversation" need `channel` and
    /// `chat_id` in the context; the registry refuses to run them without.
    fn requires_context(&self) -> bool {
        false
    }
}

/// Per-call execution context.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Channel of the conversation being served
    pub channel: Option<String>,
    /// Chat of the conversation being served
    pub chat_id: Option<String>,
    /// Workspace root for relative paths
    pub workspace: Option<String>,
    /// Externally supplied user context for this exchange, if any
    pub user_context: Option<UserContext>,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: &str, chat_id: &str) -> Self {
        self.channel = Some(channel.to_string());
        self.chat_id = Some(chat_id.to_string());
        self
    }

    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }

    pub fn with_user_context(mut self, user_context: Option<UserContext>) -> Self {
        self.user_context = user_context;
        self
    }

    /// `(channel, chat_id)` when both are known.
    pub fn route(&self) -> Option<(&str, &str)> {
        match (&self.channel, &self.chat_id) {
            (Some(channel), Some(chat_id)) => Some((channel.as_str(), chat_id.as_str())),
            _ => None,
        }
    }
}
