//! Provider types for NanoClaw
//!
//! The `LLMProvider` trait, chat options and response types shared by every
//! model backend (and by the mock backends in tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::{Message, ToolCall};

/// Tool schema advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// A language-model backend.
///
/// Implementations must be cheap to share (`Arc<dyn LLMProvider>`); the main
/// loop, subagents and the memory consolidator all call the same instance
/// concurrently.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Sends one completion request.
    ///
    /// `model` of `None` means [`LLMProvider::default_model`].
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;

    fn default_model(&self) -> &str;

    /// Short identifier used in logs
    fn name(&self) -> &str;
}

/// Sampling options for a chat call
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A model reply: text, zero or more tool calls, and what it cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    /// Cost in currency units as reported by the backend (0 when unknown)
    #[serde(default)]
    pub cost: f64,
}

impl LLMResponse {
    /// Creates a plain-text response.
    ///
    /// # Example
    /// ```
    /// use nanoclaw::providers::LLMResponse;
    ///
    /// let response = LLMResponse::text("Hello!");
    /// assert!(!response.has_tool_calls());
    /// assert_eq!(response.cost, 0.0);
    /// ```
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            tool_calls: vec![],
            usage: None,
            cost: 0.0,
        }
    }

    /// Creates a response requesting tool calls.
    pub fn with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.to_string(),
            tool_calls,
            usage: None,
            cost: 0.0,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.usage.as_ref().map_or(0, |u| u.prompt_tokens as u64)
    }

    pub fn completion_tokens(&self) -> u64 {
        self.usage.as_ref().map_or(0, |u| u.completion_tokens as u64)
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}
