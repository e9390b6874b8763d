//! Memory CLI command handlers.

use anyhow::{Context, Result};

use nanoclaw::config::Config;
use nanoclaw::memory::MemoryStore;

use super::MemoryAction;

pub(crate) async fn cmd_memory(action: MemoryAction) -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    let store = MemoryStore::new(&config.workspace_path());

    match action {
        MemoryAction::Show => {
            let memory = store.read_long_term();
            if memory.trim().is_empty() {
                println!("No long-term memory yet ({}).", store.memory_file().display());
            } else {
                println!("{}", memory.trim_end());
            }
        }
        MemoryAction::History { limit } => {
            let history = store.read_history();
            let entries = last_entries(&history, limit);
            if entries.is_empty() {
                println!("No history yet ({}).", store.history_file().display());
            }
            for entry in entries {
                println!("{}\n", entry);
            }
        }
    }
    Ok(())
}

/// The last `limit` blank-line-separated entries, oldest first.
fn last_entries(history: &str, limit: usize) -> Vec<&str> {
    let entries: Vec<&str> = history
        .split("\n\n")
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect();
    let start = entries.len().saturating_sub(limit);
    entries[start..].to_vec()
}
