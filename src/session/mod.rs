//! Session module - conversation state storage
//!
//! Sessions live in an in-memory cache and, when a storage directory is
//! configured, as one pretty-printed JSON file per session key.
//!
//! Callers always work on an owned copy returned by
//! [`SessionManager::get_or_create`] and hand it back with
//! [`SessionManager::save`]; the cache never exposes shared mutable state.
//!
//! # Example
//!
//! ```
//! use nanoclaw::session::{SessionManager, Message};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SessionManager::new_memory();
//!
//!     let mut session = manager.get_or_create("telegram:chat123").await.unwrap();
//!     session.add_message(Message::user("Hello!"));
//!     session.add_message(Message::assistant("Hi there!"));
//!     manager.save(&session).await.unwrap();
//!
//!     let reloaded = manager.get("telegram:chat123").await.unwrap().unwrap();
//!     assert_eq!(reloaded.messages.len(), 2);
//! }
//! ```

pub mod types;

pub use types::{ContentPart, ImageUrl, Message, Role, Session, ToolCall};

use crate::error::{ClawError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Cache plus optional file persistence for [`Session`]s.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    storage_path: Option<PathBuf>,
}

impl SessionManager {
    /// Memory-only manager; nothing touches the disk.
    pub fn new_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
        }
    }

    /// Persistent manager storing sessions under `path` (created if missing).
    pub fn with_path(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(path),
        })
    }

    /// Returns the cached or persisted session for `key`, creating an empty one
    /// if neither exists.
    pub async fn get_or_create(&self, key: &str) -> Result<Session> {
        if let Some(session) = self.get(key).await? {
            return Ok(session);
        }

        let session = Session::new(key);
        let mut sessions = self.sessions.write().await;
        sessions.insert(key.to_string(), session.clone());
        Ok(session)
    }

    /// Returns the session for `key` without creating it.
    pub async fn get(&self, key: &str) -> Result<Option<Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(key) {
                return Ok(Some(session.clone()));
            }
        }

        let Some(file_path) = self.file_path(key) else {
            return Ok(None);
        };
        if !file_path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&file_path).await?;
        let mut session: Session = serde_json::from_str(&content).map_err(|e| {
            ClawError::Session(format!("corrupt session file {}: {}", file_path.display(), e))
        })?;
        // Hand-edited or stale files may carry a watermark past the end.
        session.last_consolidated = session.last_consolidated.min(session.messages.len());
        debug!(key = %key, messages = session.messages.len(), "Loaded session from disk");

        let mut sessions = self.sessions.write().await;
        sessions.insert(key.to_string(), session.clone());
        Ok(Some(session))
    }

    /// Stores the session in the cache and, if persistent, on disk.
    pub async fn save(&self, session: &Session) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.key.clone(), session.clone());
        }

        if let Some(file_path) = self.file_path(&session.key) {
            let content = serde_json::to_string_pretty(session)?;
            tokio::fs::write(&file_path, content).await?;
        }

        Ok(())
    }

    /// Drops `key` from the cache only. The next read goes back to disk.
    pub async fn invalidate(&self, key: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(key);
    }

    /// Removes a session from the cache and the disk.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.invalidate(key).await;

        if let Some(file_path) = self.file_path(key) {
            if file_path.exists() {
                tokio::fs::remove_file(&file_path).await?;
            }
        }

        Ok(())
    }

    /// Lists all known session keys (cache and disk), sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions.keys().cloned().collect()
        };

        // Filenames are sanitized, so read each file for its real key.
        if let Some(ref storage_path) = self.storage_path {
            let mut dir_entries = tokio::fs::read_dir(storage_path).await?;
            while let Some(entry) = dir_entries.next_entry().await? {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "json") {
                    if let Ok(content) = tokio::fs::read_to_string(&path).await {
                        if let Ok(session) = serde_json::from_str::<Session>(&content) {
                            if !keys.contains(&session.key) {
                                keys.push(session.key);
                            }
                        }
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    pub async fn cache_size(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        self.storage_path
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", Self::sanitize_key(key))))
    }

    /// Percent-encodes characters that are unsafe in filenames so distinct
    /// keys never collide ("telegram:chat1" → "telegram%3Achat1").
    fn sanitize_key(key: &str) -> String {
        let mut result = String::with_capacity(key.len() * 3);
        for c in key.chars() {
            match c {
                '/' => result.push_str("%2F"),
                '\\' => result.push_str("%5C"),
                ':' => result.push_str("%3A"),
                '*' => result.push_str("%2A"),
                '?' => result.push_str("%3F"),
                '"' => result.push_str("%22"),
                '<' => result.push_str("%3C"),
                '>' => result.push_str("%3E"),
                '|' => result.push_str("%7C"),
                '%' => result.push_str("%25"),
                _ => result.push(c),
            }
        }
        result
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new_memory()
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            storage_path: self.storage_path.clone(),
        }
    }
}
