//! Configuration management for NanoClaw
//!
//! Configuration is loaded from `~/.nanoclaw/config.json` with environment
//! variable overrides.

mod types;

pub use types::*;

use crate::error::{ClawError, Result};
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the NanoClaw configuration directory path (~/.nanoclaw)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nanoclaw")
    }

    /// Returns the path to the config file (~/.nanoclaw/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// Environment variables can override config values using the pattern:
    /// `NANOCLAW_SECTION_SUBSECTION_KEY`
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)
                .map_err(|e| ClawError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration as pretty JSON, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Workspace directory with `~` expanded.
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.agents.defaults.workspace)
    }

    /// Directory holding persisted sessions (~/.nanoclaw/sessions)
    pub fn sessions_dir() -> PathBuf {
        Self::dir().join("sessions")
    }

    /// Environment variables follow the pattern: NANOCLAW_SECTION_SUBSECTION_KEY
    fn apply_env_overrides(&mut self) {
        let defaults = &mut self.agents.defaults;
        if let Ok(val) = std::env::var("NANOCLAW_AGENTS_DEFAULTS_WORKSPACE") {
            defaults.workspace = val;
        }
        if let Ok(val) = std::env::var("NANOCLAW_AGENTS_DEFAULTS_MODEL") {
            defaults.model = val;
        }
        if let Ok(val) = std::env::var("NANOCLAW_AGENTS_DEFAULTS_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                defaults.max_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("NANOCLAW_AGENTS_DEFAULTS_TEMPERATURE") {
            if let Ok(v) = val.parse() {
                defaults.temperature = v;
            }
        }
        if let Ok(val) = std::env::var("NANOCLAW_AGENTS_DEFAULTS_MAX_TOOL_ITERATIONS") {
            if let Ok(v) = val.parse() {
                defaults.max_tool_iterations = v;
            }
        }
        if let Ok(val) = std::env::var("NANOCLAW_AGENTS_DEFAULTS_MEMORY_WINDOW") {
            if let Ok(v) = val.parse() {
                defaults.memory_window = v;
            }
        }

        if let Ok(val) = std::env::var("NANOCLAW_BUDGET_CEILING") {
            if let Ok(v) = val.parse() {
                self.budget.ceiling = Some(v);
            }
        }

        if let Ok(val) = std::env::var("NANOCLAW_TOOLS_RESTRICT_TO_WORKSPACE") {
            if let Ok(v) = val.parse() {
                self.tools.restrict_to_workspace = v;
            }
        }

        if let Ok(val) = std::env::var("NANOCLAW_LOGGING_LEVEL") {
            self.logging.level = val;
        }

        self.apply_provider_env_overrides();
    }

    fn apply_provider_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NANOCLAW_PROVIDERS_OPENAI_API_KEY") {
            let provider = self
                .providers
                .openai
                .get_or_insert_with(ProviderConfig::default);
            provider.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("NANOCLAW_PROVIDERS_OPENAI_API_BASE") {
            let provider = self
                .providers
                .openai
                .get_or_insert_with(ProviderConfig::default);
            provider.api_base = Some(val);
        }
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
