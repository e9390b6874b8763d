//! Background subagent tool.
//!
//! Hands a self-contained task to the [`SubagentManager`]. The call returns
//! immediately; the result comes back later as a system-origin message on
//! the bus, routed to the conversation that spawned it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::{SpawnRequest, SubagentManager};
use crate::error::{ClawError, Result};

use super::{Tool, ToolContext};

pub struct SpawnTool {
    manager: Arc<SubagentManager>,
}

impl SpawnTool {
    pub fn new(manager: Arc<SubagentManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }

    fn description(&self) -> &str {
        "Spawn a subagent to handle a task in the background. Use this for complex \
         or time-consuming tasks that can run independently. The subagent will \
         complete the task and report back when done."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task for the subagent to complete"
                },
                "label": {
                    "type": "string",
                    "description": "Optional short label for the task (for display)"
                },
                "context_summary": {
                    "type": "string",
                    "description": "Brief summary of the conversation so far that the subagent needs"
                },
                "relevant_files": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Paths of files the subagent should look at"
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let task = args
            .get("task")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClawError::Tool("Missing 'task' argument".into()))?;

        let (channel, chat_id) = ctx
            .route()
            .ok_or_else(|| ClawError::Tool("No conversation available in tool context".into()))?;

        let optional_str = |key: &str| {
            args.get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let relevant_files = args
            .get("relevant_files")
            .and_then(|v| v.as_array())
            .map(|files| {
                files
                    .iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let request = SpawnRequest {
            task: task.to_string(),
            label: optional_str("label"),
            origin_channel: channel.to_string(),
            origin_chat_id: chat_id.to_string(),
            context_summary: optional_str("context_summary"),
            relevant_files,
            user_context: ctx.user_context.clone(),
        };

        Ok(self.manager.spawn(request).await)
    }

    fn requires_context(&self) -> bool {
        true
    }
}
