//! Providers module - LLM backends
//!
//! Every backend implements [`LLMProvider`]. The runtime holds one
//! `Arc<dyn LLMProvider>` and shares it between the main loop, subagents and
//! memory consolidation.
//!
//! # Example
//!
//! ```rust,ignore
//! use nanoclaw::providers::{ChatOptions, LLMProvider, OpenAIProvider};
//! use nanoclaw::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("your-api-key");
//!     let messages = vec![Message::user("Hello!")];
//!     let options = ChatOptions::new().with_max_tokens(1000);
//!     let response = provider.chat(messages, vec![], None, options).await.unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

pub mod openai;
mod types;

use crate::error::ProviderError;

pub use openai::OpenAIProvider;
pub use types::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition, Usage};

/// Map an HTTP error response to a classified [`ProviderError`].
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 => ProviderError::Auth(body.to_string()),
        402 => ProviderError::Billing(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        408 => ProviderError::Timeout(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 => ProviderError::InvalidRequest(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}
