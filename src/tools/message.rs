//! Message tool for proactive outbound messages.
//!
//! Lets the model push a message to the user mid-task (progress updates,
//! or a message to a different chat) without ending its turn.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::bus::{MessageBus, OutboundMessage};
use crate::error::{ClawError, Result};

use super::{Tool, ToolContext};

/// Publishes an [`OutboundMessage`] on the bus.
pub struct MessageTool {
    bus: Arc<MessageBus>,
}

impl MessageTool {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user. Defaults to the current conversation; \
         pass channel and chat_id to message a different chat."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Message text to send"
                },
                "channel": {
                    "type": "string",
                    "description": "Destination channel. Omit to use the current conversation."
                },
                "chat_id": {
                    "type": "string",
                    "description": "Destination chat ID. Omit to use the current conversation."
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClawError::Tool("Missing 'content' parameter".to_string()))?;

        let channel = args
            .get("channel")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| ctx.channel.clone())
            .ok_or_else(|| ClawError::Tool("No target channel specified".to_string()))?;

        let chat_id = args
            .get("chat_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| ctx.chat_id.clone())
            .ok_or_else(|| ClawError::Tool("No target chat_id specified".to_string()))?;

        self.bus
            .publish_outbound(OutboundMessage::new(&channel, &chat_id, content))
            .await?;

        Ok(format!("Message sent to {}:{}", channel, chat_id))
    }
}
