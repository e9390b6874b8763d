//! Error types for NanoClaw
//!
//! One crate-wide error enum (`ClawError`) plus a structured classification
//! for model backend HTTP failures (`ProviderError`). Tool failures and
//! consolidation failures are deliberately *not* surfaced through these
//! types at the loop level; they are converted to strings or log lines by
//! their callers.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Classified model backend failure.
#[derive(Debug)]
pub enum ProviderError {
    /// 401: invalid API key
    Auth(String),
    /// 429: rate limit or quota exceeded
    RateLimit(String),
    /// 402: payment required
    Billing(String),
    /// 5xx
    ServerError(String),
    /// 400: malformed request
    InvalidRequest(String),
    /// 404: unknown model or endpoint
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Anything else
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Billing(msg) => write!(f, "Billing error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` for transient failures (rate limit, 5xx, timeout).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_) | ProviderError::ServerError(_) | ProviderError::Timeout(_)
        )
    }

    /// HTTP status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::Billing(_) => Some(402),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Timeout(_) | ProviderError::Unknown(_) => None,
        }
    }
}

impl From<ProviderError> for ClawError {
    fn from(err: ProviderError) -> Self {
        ClawError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for NanoClaw operations.
#[derive(Error, Debug)]
pub enum ClawError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped model backend failure (mock providers, response decoding)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Classified model backend failure
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Tool execution errors (invalid parameters, execution failures, etc.)
    #[error("Tool error: {0}")]
    Tool(String),

    /// Session persistence or state errors
    #[error("Session error: {0}")]
    Session(String),

    /// Long-term memory file errors
    #[error("Memory error: {0}")]
    Memory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Message bus channel closed unexpectedly
    #[error("Bus error: channel closed")]
    BusClosed,

    /// Resource not found (sessions, tools, skills, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path escapes the workspace while restriction is on
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

/// A specialized `Result` type for NanoClaw operations.
pub type Result<T> = std::result::Result<T, ClawError>;
