//! Agent module - Core AI agent logic and conversation handling
//!
//! - [`AgentLoop`]: the bus consumer; one message at a time, to completion
//! - [`run_loop`]: the tool-call iteration state machine, shared with subagents
//! - [`ContextBuilder`]: system prompt and message list assembly
//! - [`SubagentManager`]: background tasks that report back over the bus
//! - [`MemoryConsolidator`]: folds old turns into MEMORY.md / HISTORY.md
//! - [`SpendBudget`]: cost ceiling shared by everything above
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  MessageBus │────>│  AgentLoop  │────>│  run_loop   │──> LLMProvider
//! │  (inbound)  │     │             │     │             │──> ToolRegistry
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                   │                   │ spawn tool
//!        │                   ▼                   ▼
//!        │            ┌─────────────┐     ┌─────────────┐
//!        │            │  Session    │     │  Subagent   │
//!        │            │  Manager    │     │  Manager    │
//!        │            └─────────────┘     └─────────────┘
//!        │                   │ oversized         │
//!        │                   ▼                   │
//!        │            ┌─────────────┐            │
//!        │            │  Memory     │            │
//!        │            │ Consolidator│            │
//!        │            └─────────────┘            │
//!        └──────── system-origin announcement ───┘
//! ```

pub mod budget;
pub mod consolidation;
mod context;
mod r#loop;
pub mod runner;
pub mod subagent;

pub use budget::{SourceSpend, SpendBudget};
pub use consolidation::{ConsolidationMode, ConsolidationOutcome, MemoryConsolidator};
pub use context::{ContextBuilder, BOOTSTRAP_FILES};
pub use r#loop::AgentLoop;
pub use runner::{run_loop, LoopOutcome, LoopSettings, StopReason, CONTINUATION_NUDGE};
pub use subagent::{SpawnRequest, SubagentManager};
