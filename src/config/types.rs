//! Configuration type definitions for NanoClaw
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a partial `config.json` is always valid.

use serde::{Deserialize, Serialize};

/// Main configuration struct for NanoClaw
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Agent configuration (models, tokens, iterations, memory window)
    pub agents: AgentConfig,
    /// Shared spend ceiling
    pub budget: BudgetConfig,
    /// LLM provider configurations
    pub providers: ProvidersConfig,
    /// Tool behaviour
    pub tools: ToolsConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Default agent settings
    pub defaults: AgentDefaults,
}

/// Default agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Workspace directory path (`~` is expanded)
    pub workspace: String,
    /// Default model to use
    pub model: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum model calls per user message
    pub max_tool_iterations: u32,
    /// Maximum model calls per subagent task
    pub subagent_max_iterations: u32,
    /// Number of recent turns sent to the model; also the consolidation trigger
    pub memory_window: usize,
    /// How often the consumer re-checks the shutdown flag while idle
    pub poll_interval_ms: u64,
}

/// Default model compile-time configuration.
/// Set `NANOCLAW_DEFAULT_MODEL` at compile time to override.
const COMPILE_TIME_DEFAULT_MODEL: &str = match option_env!("NANOCLAW_DEFAULT_MODEL") {
    Some(v) => v,
    None => "gpt-4o",
};

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.nanoclaw/workspace".to_string(),
            model: COMPILE_TIME_DEFAULT_MODEL.to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 20,
            subagent_max_iterations: 15,
            memory_window: 50,
            poll_interval_ms: 1000,
        }
    }
}

/// Spend ceiling shared by the main loop and every subagent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BudgetConfig {
    /// Maximum total cost in currency units. `None` means unlimited.
    pub ceiling: Option<f64>,
}

/// LLM provider configurations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// OpenAI or any OpenAI-compatible endpoint
    pub openai: Option<ProviderConfig>,
}

/// Generic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    /// Override the API base URL
    pub api_base: Option<String>,
}

/// Tool behaviour
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ToolsConfig {
    /// Reject file tool paths outside the workspace
    pub restrict_to_workspace: bool,
}

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, multi-line
    Pretty,
    /// Compact single line with target and fields
    #[default]
    Component,
    /// JSON lines
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Append logs to this file instead of stderr
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            file: None,
        }
    }
}
