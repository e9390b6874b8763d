//! Shared helpers for CLI commands.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use nanoclaw::agent::AgentLoop;
use nanoclaw::bus::MessageBus;
use nanoclaw::config::Config;
use nanoclaw::providers::{LLMProvider, OpenAIProvider};
use nanoclaw::session::SessionManager;

/// Builds the model backend from config.
pub(crate) fn build_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    let Some(openai) = config.providers.openai.as_ref() else {
        bail!(
            "No provider configured. Set NANOCLAW_PROVIDERS_OPENAI_API_KEY or add \
             providers.openai.api_key to {}",
            Config::path().display()
        );
    };
    let Some(api_key) = openai.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
        bail!("providers.openai.api_key is empty");
    };

    let provider = match openai.api_base.as_deref() {
        Some(base) => OpenAIProvider::with_base_url(api_key, base),
        None => OpenAIProvider::new(api_key),
    };
    Ok(Arc::new(provider))
}

/// Creates the workspace and an agent loop with file-backed sessions.
pub(crate) fn create_agent(config: Config, bus: Arc<MessageBus>) -> Result<Arc<AgentLoop>> {
    let provider = build_provider(&config)?;

    let workspace = config.workspace_path();
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;

    let sessions = SessionManager::with_path(Config::sessions_dir())
        .with_context(|| "Failed to open session store")?;

    Ok(Arc::new(AgentLoop::new(config, sessions, bus, provider)))
}

/// Masks all but the last four characters of a secret.
pub(crate) fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{}", tail)
}
