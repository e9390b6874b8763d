//! Tool registry for NanoClaw
//!
//! Name → tool lookup with deterministic advertisement order. Execution
//! never fails from the caller's point of view: unknown tools and tool errors
//! come back as text for the model to read.

use std::collections::HashMap;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ClawError, Result};
use crate::providers::ToolDefinition;

use super::{Tool, ToolContext};

/// Registry of tools available to one agent loop.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registers a tool. Names must be unique.
    ///
    /// # Example
    /// ```
    /// use nanoclaw::tools::{EchoTool, ToolRegistry};
    ///
    /// let mut registry = ToolRegistry::new();
    /// registry.register(Box::new(EchoTool)).unwrap();
    /// assert!(registry.register(Box::new(EchoTool)).is_err());
    /// ```
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ClawError::Tool(format!("Tool already registered: {}", name)));
        }
        debug!(tool = %name, "Registering tool");
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Executes a tool with an empty context.
    pub async fn execute(&self, name: &str, args: Value) -> String {
        self.execute_with_context(name, args, &ToolContext::default())
            .await
    }

    /// Executes a tool, converting every failure into an error string.
    pub async fn execute_with_context(&self, name: &str, args: Value, ctx: &ToolContext) -> String {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "Unknown tool requested");
            return format!("Error: Tool not found: {}", name);
        };

        if tool.requires_context() && ctx.route().is_none() {
            warn!(tool = name, "Tool called without conversation context");
            return format!(
                "Error executing {}: no conversation context (channel/chat_id) available",
                name
            );
        }

        let start = Instant::now();
        match tool.execute(args, ctx).await {
            Ok(output) => {
                debug!(
                    tool = name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool executed successfully"
                );
                output
            }
            Err(e) => {
                warn!(
                    tool = name,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool execution failed"
                );
                format!("Error executing {}: {}", name, e)
            }
        }
    }

    /// Tool schemas in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect()
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
