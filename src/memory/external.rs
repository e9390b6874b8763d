//! External user-context memory.
//!
//! An optional remote service that models the user across conversations.
//! It is consulted before each exchange and told about each completed one.
//! It is never required: every failure degrades to "no external context".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// What the external service knows about the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    /// Free-form model of the user
    pub representation: Option<String>,
    /// Short structured facts ("peer card")
    pub card: Option<String>,
}

impl UserContext {
    pub fn is_empty(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |v| v.trim().is_empty());
        blank(&self.representation) && blank(&self.card)
    }
}

/// A user-modeling backend.
#[async_trait]
pub trait UserContextProvider: Send + Sync {
    /// Context relevant to the upcoming message.
    async fn prefetch(&self, session_key: &str, user_message: &str) -> Result<UserContext>;

    /// Records one completed user/assistant exchange.
    async fn sync(&self, session_key: &str, user: &str, assistant: &str) -> Result<()>;

    /// Starts a fresh conversation for `session_key` after a reset.
    async fn new_session(&self, _session_key: &str) -> Result<()> {
        Ok(())
    }
}

/// Prefetch that never fails: errors are logged and empty results dropped.
pub async fn prefetch_or_none(
    provider: &dyn UserContextProvider,
    session_key: &str,
    user_message: &str,
) -> Option<UserContext> {
    match provider.prefetch(session_key, user_message).await {
        Ok(ctx) if !ctx.is_empty() => Some(ctx),
        Ok(_) => None,
        Err(e) => {
            warn!(session = %session_key, error = %e, "User context prefetch failed");
            None
        }
    }
}

/// Sync that never fails: errors are logged.
pub async fn sync_or_warn(
    provider: &dyn UserContextProvider,
    session_key: &str,
    user: &str,
    assistant: &str,
) {
    if let Err(e) = provider.sync(session_key, user, assistant).await {
        warn!(session = %session_key, error = %e, "User context sync failed");
    }
}

/// Session rotation that never fails: errors are logged.
pub async fn new_session_or_warn(provider: &dyn UserContextProvider, session_key: &str) {
    if let Err(e) = provider.new_session(session_key).await {
        warn!(session = %session_key, error = %e, "User context session rotation failed");
    }
}
