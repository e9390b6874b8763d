//! Integration tests for nanoclaw
//!
//! These drive a full `AgentLoop` against scripted providers and check the
//! flows that cross module boundaries: tool iteration, background memory
//! consolidation, subagent announcements, the spend ceiling and error
//! recovery on the bus.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use nanoclaw::agent::{AgentLoop, ConsolidationMode, ConsolidationOutcome, SpawnRequest};
use nanoclaw::bus::{InboundMessage, MessageBus, MessageOrigin};
use nanoclaw::config::Config;
use nanoclaw::error::{ClawError, Result};
use nanoclaw::memory::{MemoryStore, UserContext, UserContextProvider};
use nanoclaw::providers::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition};
use nanoclaw::session::{Message, Role, SessionManager, ToolCall};
use nanoclaw::tools::EchoTool;

const CONSOLIDATION_REPLY: &str =
    r#"{"history_entry": "[2024-05-01 10:00] Discussed tea.", "memory_update": "Prefers green tea."}"#;

// ============================================================================
// Scripted provider
// ============================================================================

/// Who a request came from, judged by its system prompt.
fn caller(messages: &[Message]) -> &'static str {
    let system = messages.first().map(|m| m.content.as_str()).unwrap_or("");
    if system.starts_with("You are a memory consolidation agent") {
        "consolidation"
    } else if system.starts_with("# Subagent") {
        "subagent"
    } else {
        "agent"
    }
}

#[derive(Default)]
struct Scripted {
    agent: Mutex<VecDeque<Result<LLMResponse>>>,
    subagent: Mutex<VecDeque<Result<LLMResponse>>>,
    consolidation: Option<String>,
    requests: Mutex<Vec<(&'static str, Vec<Message>)>>,
}

impl Scripted {
    fn new() -> Self {
        Self::default()
    }

    fn agent_reply(self, response: Result<LLMResponse>) -> Self {
        self.agent.lock().unwrap().push_back(response);
        self
    }

    fn subagent_reply(self, response: Result<LLMResponse>) -> Self {
        self.subagent.lock().unwrap().push_back(response);
        self
    }

    fn consolidation_reply(mut self, reply: &str) -> Self {
        self.consolidation = Some(reply.to_string());
        self
    }

    fn calls(&self, who: &str) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == who)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl LLMProvider for Scripted {
    async fn chat(
        &self,
        messages: Vec<Message>,
        _tools: Vec<ToolDefinition>,
        _model: Option<&str>,
        _options: ChatOptions,
    ) -> Result<LLMResponse> {
        let who = caller(&messages);
        self.requests.lock().unwrap().push((who, messages));
        match who {
            "consolidation" => self
                .consolidation
                .as_deref()
                .map(LLMResponse::text)
                .ok_or_else(|| ClawError::Provider("no consolidation reply".into())),
            "subagent" => self
                .subagent
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(LLMResponse::text("subagent default"))),
            _ => self
                .agent
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(LLMResponse::text("ok"))),
        }
    }

    fn default_model(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn config_for(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.agents.defaults.workspace = temp.path().to_string_lossy().to_string();
    config.agents.defaults.memory_window = 10;
    config.agents.defaults.poll_interval_ms = 10;
    config
}

fn agent_with(config: Config, bus: Arc<MessageBus>, provider: Arc<Scripted>) -> AgentLoop {
    AgentLoop::new(config, SessionManager::new_memory(), bus, provider)
}

/// Seeds `key` with alternating user/assistant turns.
async fn seed(agent: &AgentLoop, key: &str, turns: usize) {
    let mut session = agent.session_manager().get_or_create(key).await.unwrap();
    for i in 0..turns {
        if i % 2 == 0 {
            session.add_message(Message::user(&format!("question {}", i)));
        } else {
            session.add_message(Message::assistant(&format!("answer {}", i)));
        }
    }
    agent.session_manager().save(&session).await.unwrap();
}

// ============================================================================
// Tool iteration
// ============================================================================

#[tokio::test]
async fn test_tool_calls_execute_in_order() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(
        Scripted::new()
            .agent_reply(Ok(LLMResponse::with_tools(
                "",
                vec![
                    ToolCall::new("call_1", "echo", r#"{"message": "first"}"#),
                    ToolCall::new("call_2", "echo", r#"{"message": "second"}"#),
                ],
            )))
            .agent_reply(Ok(LLMResponse::text("Both echoes done."))),
    );
    let agent = agent_with(
        config_for(&temp),
        Arc::new(MessageBus::new()),
        Arc::clone(&provider),
    );
    agent.register_tool(Box::new(EchoTool)).await.unwrap();

    let reply = agent
        .process_direct("echo twice", "cli:direct", "cli", "direct")
        .await
        .unwrap();
    assert_eq!(reply, "Both echoes done.");

    let calls = provider.calls("agent");
    assert_eq!(calls.len(), 2);
    let results: Vec<&Message> = calls[1]
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(results[0].content, "first");
    assert_eq!(results[1].tool_call_id.as_deref(), Some("call_2"));
    assert_eq!(results[1].content, "second");

    let session = agent.session_manager().get_or_create("cli:direct").await.unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(
        session.messages[1].tools_used,
        Some(vec!["echo".to_string(), "echo".to_string()])
    );
}

// ============================================================================
// Memory consolidation
// ============================================================================

#[tokio::test]
async fn test_consolidation_moves_watermark_once() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(Scripted::new().consolidation_reply(CONSOLIDATION_REPLY));
    let agent = agent_with(
        config_for(&temp),
        Arc::new(MessageBus::new()),
        Arc::clone(&provider),
    );
    seed(&agent, "cli:direct", 18).await;

    agent
        .process_direct("one more", "cli:direct", "cli", "direct")
        .await
        .unwrap();
    agent.wait_for_background().await;

    // 20 messages, window 10: everything but the newest 5 is folded in.
    let mut session = agent.session_manager().get_or_create("cli:direct").await.unwrap();
    assert_eq!(session.messages.len(), 20);
    assert_eq!(session.last_consolidated, 15);

    let store = MemoryStore::new(temp.path());
    assert_eq!(store.read_long_term().trim(), "Prefers green tea.");
    assert!(store.read_history().contains("Discussed tea."));
    assert_eq!(provider.calls("consolidation").len(), 1);

    let outcome = agent
        .consolidator()
        .consolidate(&mut session, ConsolidationMode::Incremental)
        .await;
    assert_eq!(outcome, ConsolidationOutcome::Skipped);
    assert_eq!(session.last_consolidated, 15);
    assert_eq!(provider.calls("consolidation").len(), 1);
}

#[tokio::test]
async fn test_unchanged_memory_is_not_rewritten() {
    let temp = TempDir::new().unwrap();
    let store = MemoryStore::new(temp.path());
    store.write_long_term("Prefers green tea.").unwrap();
    let before = std::fs::metadata(store.memory_file())
        .unwrap()
        .modified()
        .unwrap();

    let provider = Arc::new(Scripted::new().consolidation_reply(CONSOLIDATION_REPLY));
    let agent = agent_with(
        config_for(&temp),
        Arc::new(MessageBus::new()),
        Arc::clone(&provider),
    );
    seed(&agent, "cli:direct", 18).await;
    agent
        .process_direct("one more", "cli:direct", "cli", "direct")
        .await
        .unwrap();
    agent.wait_for_background().await;

    let after = std::fs::metadata(store.memory_file())
        .unwrap()
        .modified()
        .unwrap();
    assert_eq!(before, after);
    assert!(store.read_history().contains("Discussed tea."));
}

#[tokio::test]
async fn test_short_session_does_not_consolidate() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(Scripted::new().consolidation_reply(CONSOLIDATION_REPLY));
    let agent = agent_with(
        config_for(&temp),
        Arc::new(MessageBus::new()),
        Arc::clone(&provider),
    );

    agent
        .process_direct("hi", "cli:direct", "cli", "direct")
        .await
        .unwrap();
    agent.wait_for_background().await;

    assert!(provider.calls("consolidation").is_empty());
    let session = agent.session_manager().get_or_create("cli:direct").await.unwrap();
    assert_eq!(session.last_consolidated, 0);
}

#[tokio::test]
async fn test_new_command_archives_in_background() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(Scripted::new().consolidation_reply(CONSOLIDATION_REPLY));
    let agent = agent_with(
        config_for(&temp),
        Arc::new(MessageBus::new()),
        Arc::clone(&provider),
    );
    seed(&agent, "cli:direct", 4).await;

    let reply = agent
        .process_direct("/new", "cli:direct", "cli", "direct")
        .await
        .unwrap();
    assert_eq!(reply, "Session cleared.");
    let session = agent.session_manager().get_or_create("cli:direct").await.unwrap();
    assert!(session.messages.is_empty());

    agent.wait_for_background().await;
    assert_eq!(provider.calls("consolidation").len(), 1);
    let history = MemoryStore::new(temp.path()).read_history();
    assert!(history.contains("Discussed tea."));
}

#[tokio::test]
async fn test_clear_archives_every_turn() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(Scripted::new().consolidation_reply(CONSOLIDATION_REPLY));
    let agent = agent_with(
        config_for(&temp),
        Arc::new(MessageBus::new()),
        Arc::clone(&provider),
    );
    seed(&agent, "cli:direct", 20).await;
    let mut session = agent.session_manager().get_or_create("cli:direct").await.unwrap();
    session.set_last_consolidated(15);
    agent.session_manager().save(&session).await.unwrap();

    let reply = agent
        .process_direct("/clear", "cli:direct", "cli", "direct")
        .await
        .unwrap();
    assert_eq!(reply, "Session cleared.");
    agent.wait_for_background().await;

    let calls = provider.calls("consolidation");
    assert_eq!(calls.len(), 1);
    let prompt = &calls[0][1].content;
    let archived = prompt.matches("USER: question ").count()
        + prompt.matches("ASSISTANT: answer ").count();
    assert_eq!(archived, 20);
    assert!(prompt.contains("question 0"));

    let session = agent.session_manager().get_or_create("cli:direct").await.unwrap();
    assert!(session.messages.is_empty());
    assert_eq!(session.last_consolidated, 0);
}

#[tokio::test]
async fn test_clear_on_empty_session_skips_archive() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(Scripted::new().consolidation_reply(CONSOLIDATION_REPLY));
    let agent = agent_with(
        config_for(&temp),
        Arc::new(MessageBus::new()),
        Arc::clone(&provider),
    );

    agent
        .process_direct("/new", "cli:direct", "cli", "direct")
        .await
        .unwrap();
    agent.wait_for_background().await;
    assert!(provider.calls("consolidation").is_empty());
}

// ============================================================================
// Subagents
// ============================================================================

#[tokio::test]
async fn test_failing_subagent_announces_once() {
    let temp = TempDir::new().unwrap();
    let bus = Arc::new(MessageBus::new());
    let provider = Arc::new(
        Scripted::new().subagent_reply(Err(ClawError::Provider("upstream down".into()))),
    );
    let agent = agent_with(config_for(&temp), Arc::clone(&bus), provider);

    let ack = agent
        .subagents()
        .spawn(SpawnRequest::new("count the files", "telegram", "chat-1").with_label("count"))
        .await;
    assert!(ack.contains("count"));
    agent.subagents().wait_for_all().await;
    assert_eq!(agent.subagents().running_count(), 0);

    let announcement = bus.consume_inbound().await.unwrap();
    assert!(matches!(announcement.origin, MessageOrigin::System { .. }));
    assert_eq!(announcement.channel, "telegram");
    assert_eq!(announcement.chat_id, "chat-1");
    assert_eq!(announcement.metadata.get("status").map(String::as_str), Some("error"));
    assert!(announcement.content.contains("failed"));
    assert!(announcement.content.contains("upstream down"));

    let extra = tokio::time::timeout(Duration::from_millis(50), bus.consume_inbound()).await;
    assert!(extra.is_err(), "expected exactly one announcement");
}

#[tokio::test]
async fn test_subagent_result_reaches_origin_chat() {
    let temp = TempDir::new().unwrap();
    let bus = Arc::new(MessageBus::new());
    let provider = Arc::new(
        Scripted::new()
            .subagent_reply(Ok(LLMResponse::text("Found 3 files.")))
            .agent_reply(Ok(LLMResponse::text("There are 3 files."))),
    );
    let agent = Arc::new(agent_with(
        config_for(&temp),
        Arc::clone(&bus),
        Arc::clone(&provider),
    ));

    let runner = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.start().await })
    };
    agent
        .subagents()
        .spawn(SpawnRequest::new("count the files", "telegram", "chat-1"))
        .await;

    let out = tokio::time::timeout(Duration::from_secs(2), bus.consume_outbound())
        .await
        .expect("no reply published")
        .unwrap();
    assert_eq!(out.channel, "telegram");
    assert_eq!(out.chat_id, "chat-1");
    assert_eq!(out.content, "There are 3 files.");

    let session = agent
        .session_manager()
        .get_or_create("telegram:chat-1")
        .await
        .unwrap();
    assert!(session.messages[0].content.starts_with("[System: subagent]"));
    assert!(session.messages[0].content.contains("Found 3 files."));

    agent.stop();
    runner.await.unwrap().unwrap();
}

// ============================================================================
// Spend ceiling
// ============================================================================

#[tokio::test]
async fn test_budget_ceiling_stops_further_calls() {
    let temp = TempDir::new().unwrap();
    let mut config = config_for(&temp);
    config.budget.ceiling = Some(1.0);
    let provider = Arc::new(
        Scripted::new().agent_reply(Ok(LLMResponse::text("expensive answer").with_cost(1.5))),
    );
    let agent = agent_with(config, Arc::new(MessageBus::new()), Arc::clone(&provider));

    let first = agent
        .process_direct("first", "cli:direct", "cli", "direct")
        .await
        .unwrap();
    assert_eq!(first, "expensive answer");
    assert!(agent.budget().is_exhausted());

    let second = agent
        .process_direct("second", "cli:direct", "cli", "direct")
        .await
        .unwrap();
    assert!(second.contains("spending limit"));
    assert_eq!(provider.calls("agent").len(), 1);
    assert!((agent.budget().total_cost() - 1.5).abs() < 1e-9);
}

// ============================================================================
// Error recovery
// ============================================================================

#[tokio::test]
async fn test_provider_error_sends_apology_and_keeps_session() {
    let temp = TempDir::new().unwrap();
    let bus = Arc::new(MessageBus::new());
    let provider = Arc::new(
        Scripted::new().agent_reply(Err(ClawError::Provider("connection reset".into()))),
    );
    let agent = Arc::new(agent_with(config_for(&temp), Arc::clone(&bus), provider));

    let runner = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.start().await })
    };
    bus.publish_inbound(InboundMessage::new("telegram", "user1", "chat-9", "hello"))
        .await
        .unwrap();

    let out = tokio::time::timeout(Duration::from_secs(2), bus.consume_outbound())
        .await
        .expect("no apology published")
        .unwrap();
    assert!(out.content.starts_with("Sorry, I encountered an error:"));
    assert!(out.content.contains("connection reset"));
    assert_eq!(out.chat_id, "chat-9");

    let session = agent
        .session_manager()
        .get_or_create("telegram:chat-9")
        .await
        .unwrap();
    assert!(session.messages.is_empty());

    // The loop keeps serving after a failed turn.
    bus.publish_inbound(InboundMessage::new("telegram", "user1", "chat-9", "again"))
        .await
        .unwrap();
    let out = tokio::time::timeout(Duration::from_secs(2), bus.consume_outbound())
        .await
        .expect("no reply published")
        .unwrap();
    assert_eq!(out.content, "ok");

    agent.stop();
    runner.await.unwrap().unwrap();
}

// ============================================================================
// External user context
// ============================================================================

#[derive(Default)]
struct CountingContext {
    fail: bool,
    synced: AtomicUsize,
    exchanges: Mutex<Vec<(String, String, String)>>,
    rotated: Mutex<Vec<String>>,
}

impl CountingContext {
    fn working() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }
}

#[async_trait]
impl UserContextProvider for CountingContext {
    async fn prefetch(&self, _session_key: &str, _user_message: &str) -> Result<UserContext> {
        if self.fail {
            return Err(ClawError::Memory("service unreachable".into()));
        }
        Ok(UserContext {
            representation: Some("Drinks tea every morning.".into()),
            card: None,
        })
    }

    async fn sync(&self, session_key: &str, user: &str, assistant: &str) -> Result<()> {
        self.synced.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClawError::Memory("service unreachable".into()));
        }
        self.exchanges.lock().unwrap().push((
            session_key.to_string(),
            user.to_string(),
            assistant.to_string(),
        ));
        Ok(())
    }

    async fn new_session(&self, session_key: &str) -> Result<()> {
        self.rotated.lock().unwrap().push(session_key.to_string());
        if self.fail {
            return Err(ClawError::Memory("service unreachable".into()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_user_context_is_injected() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(Scripted::new());
    let context = CountingContext::working();
    let agent = agent_with(
        config_for(&temp),
        Arc::new(MessageBus::new()),
        Arc::clone(&provider),
    )
    .with_user_context_provider(context.clone());

    agent
        .process_direct("good morning", "cli:direct", "cli", "direct")
        .await
        .unwrap();

    let calls = provider.calls("agent");
    assert!(calls[0][0].content.contains("Drinks tea every morning."));
    assert_eq!(context.synced.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_user_context_failure_degrades() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(Scripted::new());
    let context = CountingContext::failing();
    let agent = agent_with(
        config_for(&temp),
        Arc::new(MessageBus::new()),
        Arc::clone(&provider),
    )
    .with_user_context_provider(context.clone());

    let reply = agent
        .process_direct("good morning", "cli:direct", "cli", "direct")
        .await
        .unwrap();
    assert_eq!(reply, "ok");
    assert_eq!(context.synced.load(Ordering::SeqCst), 1);

    let session = agent.session_manager().get_or_create("cli:direct").await.unwrap();
    assert_eq!(session.messages.len(), 2);
}

#[tokio::test]
async fn test_system_exchange_is_synced() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(Scripted::new().agent_reply(Ok(LLMResponse::text("Report is ready."))));
    let context = CountingContext::working();
    let agent = agent_with(
        config_for(&temp),
        Arc::new(MessageBus::new()),
        Arc::clone(&provider),
    )
    .with_user_context_provider(context.clone());

    let msg = InboundMessage::system("subagent", "telegram", "chat-3", "[Subagent 'r' completed successfully]");
    agent.process_message(&msg).await.unwrap();

    let exchanges = context.exchanges.lock().unwrap();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].0, "telegram:chat-3");
    assert!(exchanges[0].1.starts_with("[System: subagent]"));
    assert_eq!(exchanges[0].2, "Report is ready.");
}

#[tokio::test]
async fn test_reset_rotates_user_context_session() {
    let temp = TempDir::new().unwrap();
    let provider = Arc::new(Scripted::new().consolidation_reply(CONSOLIDATION_REPLY));
    let context = CountingContext::failing();
    let agent = agent_with(
        config_for(&temp),
        Arc::new(MessageBus::new()),
        Arc::clone(&provider),
    )
    .with_user_context_provider(context.clone());

    let reply = agent
        .process_direct("/new", "cli:direct", "cli", "direct")
        .await
        .unwrap();
    assert_eq!(reply, "Session cleared.");
    assert_eq!(*context.rotated.lock().unwrap(), vec!["cli:direct".to_string()]);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_file_round_trip() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");

    let mut config = Config::default();
    config.agents.defaults.memory_window = 42;
    config.budget.ceiling = Some(2.5);
    config.save_to_path(&path).unwrap();

    let loaded = Config::load_from_path(&path).unwrap();
    assert_eq!(loaded.agents.defaults.memory_window, 42);
    assert_eq!(loaded.budget.ceiling, Some(2.5));
}
