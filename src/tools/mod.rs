//! Tools module - capabilities the model can call
//!
//! - `Tool` trait: the interface every tool implements
//! - `ToolContext`: per-call routing and workspace context
//! - `ToolRegistry`: name lookup, schemas, error-to-text execution
//!
//! # Built-in Tools
//!
//! - `EchoTool`: echoes its input (handy for wiring tests)
//! - `ReadFileTool`, `WriteFileTool`, `EditFileTool`, `ListDirTool`
//! - `MessageTool`: push a message to a chat mid-task
//! - `SpawnTool`: run a task in a background subagent
//!
//! # Example
//!
//! ```rust
//! use nanoclaw::tools::{EchoTool, ToolRegistry};
//! use nanoclaw::tools::filesystem::ReadFileTool;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry.register(Box::new(EchoTool)).unwrap();
//! registry.register(Box::new(ReadFileTool::new(false))).unwrap();
//!
//! let result = registry.execute("echo", json!({"message": "Hello!"})).await;
//! assert_eq!(result, "Hello!");
//! assert_eq!(registry.definitions().len(), 2);
//! # });
//! ```

pub mod filesystem;
pub mod message;
mod registry;
pub mod spawn;
mod types;

pub use registry::ToolRegistry;
pub use types::{Tool, ToolContext};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Echoes the `message` argument back.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");
        Ok(message.to_string())
    }
}
