//! Long-term memory for NanoClaw
//!
//! Two plain Markdown files under `<workspace>/memory/`:
//!
//! - `MEMORY.md`: the single current long-term memory document, rewritten
//!   wholesale by consolidation
//! - `HISTORY.md`: an append-only log, one timestamped paragraph per
//!   consolidation run, separated by blank lines
//!
//! Both are ordinary files so the model can also read them with its file
//! tools, and a human can edit them.

pub mod external;

pub use external::{UserContext, UserContextProvider};

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ClawError, Result};

const MEMORY_FILE: &str = "MEMORY.md";
const HISTORY_FILE: &str = "HISTORY.md";

/// File-backed long-term memory rooted at `<workspace>/memory`.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    memory_dir: PathBuf,
}

impl MemoryStore {
    pub fn new(workspace: &Path) -> Self {
        Self {
            memory_dir: workspace.join("memory"),
        }
    }

    pub fn memory_file(&self) -> PathBuf {
        self.memory_dir.join(MEMORY_FILE)
    }

    pub fn history_file(&self) -> PathBuf {
        self.memory_dir.join(HISTORY_FILE)
    }

    /// Current long-term memory, or an empty string if none exists yet.
    pub fn read_long_term(&self) -> String {
        std::fs::read_to_string(self.memory_file()).unwrap_or_default()
    }

    /// Replaces the long-term memory document.
    pub fn write_long_term(&self, content: &str) -> Result<()> {
        self.ensure_dir()?;
        std::fs::write(self.memory_file(), content)
            .map_err(|e| ClawError::Memory(format!("failed to write {}: {}", MEMORY_FILE, e)))
    }

    /// Appends one entry to the history log, followed by a blank line.
    pub fn append_history(&self, entry: &str) -> Result<()> {
        self.ensure_dir()?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_file())
            .map_err(|e| ClawError::Memory(format!("failed to open {}: {}", HISTORY_FILE, e)))?;
        write!(file, "{}\n\n", entry.trim_end())
            .map_err(|e| ClawError::Memory(format!("failed to append {}: {}", HISTORY_FILE, e)))
    }

    /// Full history log, or an empty string.
    pub fn read_history(&self) -> String {
        std::fs::read_to_string(self.history_file()).unwrap_or_default()
    }

    /// Memory section for the system prompt; `None` when there is nothing to say.
    pub fn get_memory_context(&self) -> Option<String> {
        let long_term = self.read_long_term();
        if long_term.trim().is_empty() {
            None
        } else {
            Some(format!("## Long-term Memory\n{}", long_term))
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.memory_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_store() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        assert_eq!(store.read_long_term(), "");
        assert_eq!(store.read_history(), "");
        assert!(store.get_memory_context().is_none());
    }

    #[test]
    fn test_write_and_read_long_term() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        store.write_long_term("User prefers metric units.").unwrap();

        assert_eq!(store.read_long_term(), "User prefers metric units.");
        assert!(temp.path().join("memory/MEMORY.md").exists());
        assert_eq!(
            store.get_memory_context().unwrap(),
            "## Long-term Memory\nUser prefers metric units."
        );
    }

    #[test]
    fn test_append_history_separates_entries() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        store
            .append_history("[2024-05-01 10:00] First entry.\n")
            .unwrap();
        store.append_history("[2024-05-01 11:00] Second entry.").unwrap();

        assert_eq!(
            store.read_history(),
            "[2024-05-01 10:00] First entry.\n\n[2024-05-01 11:00] Second entry.\n\n"
        );
    }

    #[test]
    fn test_whitespace_memory_is_no_context() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        store.write_long_term("  \n").unwrap();
        assert!(store.get_memory_context().is_none());
    }
}
