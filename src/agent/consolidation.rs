//! Incremental memory consolidation.
//!
//! Folds old session turns into the two memory files: a timestamped
//! paragraph appended to HISTORY.md and a rewritten MEMORY.md. Progress is
//! tracked by the session's `last_consolidated` watermark so each turn is
//! summarised once.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::memory::MemoryStore;
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, Session};

use super::budget::SpendBudget;

const SYSTEM_PROMPT: &str = "You are a memory consolidation agent. Respond only with valid JSON.";

/// How much of the session to consolidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationMode {
    /// Everything past the watermark except the most recent `window / 2` turns
    Incremental,
    /// Every turn, before the session is cleared
    ArchiveAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    /// Nothing to do
    Skipped,
    Consolidated { processed: usize, watermark: usize },
    /// Nothing was written; the watermark is unchanged
    Failed(String),
}

/// Summarises session turns into long-term memory with one model call.
pub struct MemoryConsolidator {
    provider: Arc<dyn LLMProvider>,
    store: MemoryStore,
    model: String,
    memory_window: usize,
    budget: Option<Arc<SpendBudget>>,
}

impl MemoryConsolidator {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        store: MemoryStore,
        model: &str,
        memory_window: usize,
    ) -> Self {
        Self {
            provider,
            store,
            model: model.to_string(),
            memory_window,
            budget: None,
        }
    }

    /// Records the consolidation call's spend under `"consolidation"`.
    pub fn with_budget(mut self, budget: Arc<SpendBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn memory_window(&self) -> usize {
        self.memory_window
    }

    /// Consolidates `session` in place; never returns an error.
    pub async fn consolidate(
        &self,
        session: &mut Session,
        mode: ConsolidationMode,
    ) -> ConsolidationOutcome {
        let len = session.messages.len();
        let (start, end, watermark) = match mode {
            ConsolidationMode::ArchiveAll => (0, len, 0),
            ConsolidationMode::Incremental => {
                let keep = self.memory_window / 2;
                if len <= keep {
                    return ConsolidationOutcome::Skipped;
                }
                let end = len - keep;
                (session.last_consolidated, end, end)
            }
        };
        if start >= end {
            debug!(session = %session.key, start, end, "Nothing to consolidate");
            return ConsolidationOutcome::Skipped;
        }

        let transcript = render_transcript(&session.messages[start..end]);
        if transcript.is_empty() {
            session.set_last_consolidated(watermark);
            return ConsolidationOutcome::Consolidated {
                processed: end - start,
                watermark: session.last_consolidated,
            };
        }

        info!(session = %session.key, turns = end - start, ?mode, "Consolidating memory");

        match self.summarise(&transcript).await {
            Ok(()) => {
                session.set_last_consolidated(watermark);
                info!(
                    session = %session.key,
                    watermark = session.last_consolidated,
                    "Memory consolidation done"
                );
                ConsolidationOutcome::Consolidated {
                    processed: end - start,
                    watermark: session.last_consolidated,
                }
            }
            Err(reason) => {
                warn!(session = %session.key, reason = %reason, "Memory consolidation failed");
                ConsolidationOutcome::Failed(reason)
            }
        }
    }

    async fn summarise(&self, transcript: &str) -> std::result::Result<(), String> {
        let current = self.store.read_long_term();
        let prompt = build_prompt(&current, transcript);

        let response = self
            .provider
            .chat(
                vec![Message::system(SYSTEM_PROMPT), Message::user(&prompt)],
                Vec::new(),
                Some(&self.model),
                ChatOptions::new(),
            )
            .await
            .map_err(|e| format!("provider error: {}", e))?;

        if let Some(budget) = &self.budget {
            budget.record(
                response.cost,
                response.prompt_tokens(),
                response.completion_tokens(),
                "consolidation",
            );
        }

        let text = response.content.trim();
        if text.is_empty() {
            return Err("empty response".to_string());
        }
        let fields = parse_response(text).ok_or_else(|| "unparsable response".to_string())?;

        self.apply(&current, &fields).map_err(|e| {
            error!(error = %e, "Failed to write memory files");
            e.to_string()
        })
    }

    fn apply(&self, current: &str, fields: &Map<String, Value>) -> Result<()> {
        if let Some(entry) = string_field(fields, "history_entry") {
            if !entry.trim().is_empty() {
                self.store.append_history(&entry)?;
            }
        }
        if let Some(update) = string_field(fields, "memory_update") {
            if update.trim().is_empty() {
                debug!("Empty memory update ignored");
            } else if update != current {
                self.store.write_long_term(&update)?;
            } else {
                debug!("Long-term memory unchanged");
            }
        }
        Ok(())
    }
}

/// One line per turn with content: `[YYYY-MM-DD HH:MM] ROLE [tools: a, b]: text`.
fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| {
            let tools = m
                .tools_used
                .as_ref()
                .filter(|t| !t.is_empty())
                .map(|t| format!(" [tools: {}]", t.join(", ")))
                .unwrap_or_default();
            format!(
                "[{}] {}{}: {}",
                m.timestamp.format("%Y-%m-%d %H:%M"),
                m.role.to_string().to_uppercase(),
                tools,
                m.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_prompt(current_memory: &str, transcript: &str) -> String {
    let current = if current_memory.trim().is_empty() {
        "(empty)"
    } else {
        current_memory
    };
    format!(
        "You are a memory consolidation agent. Process this conversation and return a JSON \
         object with exactly two keys:\n\n\
         1. \"history_entry\": A paragraph (2-5 sentences) summarizing the key events/decisions/topics. \
         Start with a timestamp like [YYYY-MM-DD HH:MM]. Include enough detail to be useful when \
         found by grep search later.\n\n\
         2. \"memory_update\": The updated long-term memory content. Add any new facts: user \
         location, preferences, personal info, habits, project context, technical decisions, \
         tools/services used. If nothing new, return the existing content unchanged.\n\n\
         ## Current Long-term Memory\n{}\n\n\
         ## Conversation to Process\n{}\n\n\
         Respond with ONLY valid JSON, no markdown fences.",
        current, transcript
    )
}

/// Permissive JSON-object extraction; `None` unless an object is found.
fn parse_response(text: &str) -> Option<Map<String, Value>> {
    let body = strip_code_fence(text);
    parse_object(body).or_else(|| {
        let start = body.find('{')?;
        let end = body.rfind('}')?;
        if end <= start {
            return None;
        }
        parse_object(&body[start..=end])
    })
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    let value = serde_json::from_str::<Value>(text)
        .ok()
        .or_else(|| json5::from_str::<Value>(text).ok())?;
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// String value of `key`; non-string JSON is kept as its serialized form.
fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClawError;
    use crate::providers::{LLMResponse, ToolDefinition};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixedReply {
        reply: std::result::Result<String, String>,
        calls: AtomicUsize,
    }

    impl FixedReply {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("boom".to_string()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for FixedReply {
        async fn chat(
            &self,
            _messages: Vec<Message>,
            _tools: Vec<ToolDefinition>,
            _model: Option<&str>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(LLMResponse::text(text)),
                Err(e) => Err(ClawError::Provider(e.clone())),
            }
        }

        fn default_model(&self) -> &str {
            "fixed"
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn session_with(turns: usize) -> Session {
        let mut session = Session::new("cli:direct");
        for i in 0..turns {
            if i % 2 == 0 {
                session.add_message(Message::user(&format!("question {}", i)));
            } else {
                session.add_message(Message::assistant(&format!("answer {}", i)));
            }
        }
        session
    }

    const GOOD_REPLY: &str = r#"{"history_entry": "[2024-05-01 10:00] Talked about tea.", "memory_update": "Prefers tea."}"#;

    #[tokio::test]
    async fn test_incremental_moves_watermark() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        let provider = FixedReply::ok(GOOD_REPLY);
        let consolidator = MemoryConsolidator::new(provider.clone(), store.clone(), "m", 10);
        let mut session = session_with(20);

        let outcome = consolidator
            .consolidate(&mut session, ConsolidationMode::Incremental)
            .await;

        assert_eq!(
            outcome,
            ConsolidationOutcome::Consolidated {
                processed: 15,
                watermark: 15
            }
        );
        assert_eq!(session.last_consolidated, 15);
        assert_eq!(store.read_long_term(), "Prefers tea.");
        assert_eq!(
            store.read_history(),
            "[2024-05-01 10:00] Talked about tea.\n\n"
        );
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        let provider = FixedReply::ok(GOOD_REPLY);
        let consolidator = MemoryConsolidator::new(provider.clone(), store.clone(), "m", 10);
        let mut session = session_with(20);

        consolidator
            .consolidate(&mut session, ConsolidationMode::Incremental)
            .await;
        let again = consolidator
            .consolidate(&mut session, ConsolidationMode::Incremental)
            .await;

        assert_eq!(again, ConsolidationOutcome::Skipped);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.read_history().matches("Talked about tea").count(), 1);
    }

    #[tokio::test]
    async fn test_short_session_skipped() {
        let temp = TempDir::new().unwrap();
        let provider = FixedReply::ok(GOOD_REPLY);
        let consolidator =
            MemoryConsolidator::new(provider.clone(), MemoryStore::new(temp.path()), "m", 10);
        let mut session = session_with(4);

        let outcome = consolidator
            .consolidate(&mut session, ConsolidationMode::Incremental)
            .await;
        assert_eq!(outcome, ConsolidationOutcome::Skipped);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_identical_memory_not_rewritten() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        store.write_long_term("Prefers tea.").unwrap();
        let before = std::fs::metadata(store.memory_file()).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let consolidator =
            MemoryConsolidator::new(FixedReply::ok(GOOD_REPLY), store.clone(), "m", 10);
        let mut session = session_with(20);
        consolidator
            .consolidate(&mut session, ConsolidationMode::Incremental)
            .await;

        let after = std::fs::metadata(store.memory_file()).unwrap().modified().unwrap();
        assert_eq!(before, after);
        assert_eq!(session.last_consolidated, 15);
    }

    #[tokio::test]
    async fn test_archive_all() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        let consolidator =
            MemoryConsolidator::new(FixedReply::ok(GOOD_REPLY), store.clone(), "m", 50);
        let mut session = session_with(3);

        let outcome = consolidator
            .consolidate(&mut session, ConsolidationMode::ArchiveAll)
            .await;
        assert_eq!(
            outcome,
            ConsolidationOutcome::Consolidated {
                processed: 3,
                watermark: 0
            }
        );
        assert!(store.read_history().contains("Talked about tea"));
    }

    #[tokio::test]
    async fn test_failures_leave_state_untouched() {
        for provider in [
            FixedReply::failing(),
            FixedReply::ok(""),
            FixedReply::ok("I could not do that."),
            FixedReply::ok("[1, 2, 3]"),
        ] {
            let temp = TempDir::new().unwrap();
            let store = MemoryStore::new(temp.path());
            let consolidator = MemoryConsolidator::new(provider, store.clone(), "m", 10);
            let mut session = session_with(20);

            let outcome = consolidator
                .consolidate(&mut session, ConsolidationMode::Incremental)
                .await;

            assert!(matches!(outcome, ConsolidationOutcome::Failed(_)));
            assert_eq!(session.last_consolidated, 0);
            assert_eq!(store.read_history(), "");
            assert_eq!(store.read_long_term(), "");
        }
    }

    #[tokio::test]
    async fn test_empty_memory_update_keeps_memory() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        store.write_long_term("User lives in Oslo.").unwrap();
        let provider = FixedReply::ok(
            r#"{"history_entry": "[2024-05-01 10:00] Small talk.", "memory_update": "  "}"#,
        );
        let consolidator = MemoryConsolidator::new(provider, store.clone(), "m", 10);
        let mut session = session_with(20);

        let outcome = consolidator
            .consolidate(&mut session, ConsolidationMode::Incremental)
            .await;

        assert!(matches!(outcome, ConsolidationOutcome::Consolidated { .. }));
        assert_eq!(store.read_long_term(), "User lives in Oslo.");
        assert!(store.read_history().contains("Small talk."));
    }

    #[test]
    fn test_parse_response_variants() {
        let fenced = "```json\n{\"history_entry\": \"a\", \"memory_update\": \"b\"}\n```";
        assert_eq!(parse_response(fenced).unwrap()["memory_update"], "b");

        let trailing = "{'history_entry': 'a', 'memory_update': 'b',}";
        assert_eq!(parse_response(trailing).unwrap()["history_entry"], "a");

        let chatty = "Sure! Here it is: {\"history_entry\": \"a\", \"memory_update\": \"b\"} Hope that helps.";
        assert!(parse_response(chatty).is_some());

        assert!(parse_response("no json here").is_none());
        assert!(parse_response("\"just a string\"").is_none());
    }

    #[test]
    fn test_transcript_format() {
        let mut msg = Message::assistant("Read the file.").with_tools_used(vec![
            "read_file".into(),
            "list_dir".into(),
        ]);
        msg.timestamp = chrono::DateTime::parse_from_rfc3339("2024-05-01T10:30:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let empty = Message::assistant("");

        let transcript = render_transcript(&[msg, empty]);
        assert_eq!(
            transcript,
            "[2024-05-01 10:30] ASSISTANT [tools: read_file, list_dir]: Read the file."
        );
    }
}
