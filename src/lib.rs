//! nanoclaw - lightweight personal AI agent runtime
//!
//! Inbound messages arrive on a [`bus::MessageBus`], the [`agent::AgentLoop`]
//! assembles context and drives a tool-calling loop against an
//! [`providers::LLMProvider`], and conversation state is persisted by the
//! [`session::SessionManager`]. Old turns are folded into long-term memory
//! files in the background.

pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod memory;
pub mod providers;
pub mod session;
pub mod skills;
pub mod tools;
pub mod utils;

pub use agent::{AgentLoop, SpendBudget};
pub use bus::{InboundMessage, MessageBus, MessageOrigin, OutboundMessage};
pub use config::Config;
pub use error::{ClawError, Result};
pub use providers::{ChatOptions, LLMProvider, LLMResponse, OpenAIProvider, ToolDefinition, Usage};
pub use session::{Message, Role, Session, SessionManager, ToolCall};
