//! Agent loop implementation
//!
//! The single consumer of the inbound queue. Each message is processed to
//! completion: session lookup, context assembly, the tool-call iteration
//! loop, then the session update and an outbound reply. Memory
//! consolidation and subagents run as detached tasks.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bus::{InboundMessage, MessageBus, MessageOrigin, OutboundMessage};
use crate::config::Config;
use crate::error::{ClawError, Result};
use crate::memory::external::{new_session_or_warn, prefetch_or_none, sync_or_warn};
use crate::memory::{MemoryStore, UserContextProvider};
use crate::providers::LLMProvider;
use crate::session::{Message, Session, SessionManager};
use crate::tools::filesystem::{EditFileTool, ListDirTool, ReadFileTool, WriteFileTool};
use crate::tools::message::MessageTool;
use crate::tools::spawn::SpawnTool;
use crate::tools::{Tool, ToolContext, ToolRegistry};

use super::budget::SpendBudget;
use super::consolidation::{ConsolidationMode, ConsolidationOutcome, MemoryConsolidator};
use super::context::ContextBuilder;
use super::runner::{run_loop, LoopSettings, StopReason};
use super::subagent::SubagentManager;

const NO_RESPONSE: &str = "I've completed processing but have no response to give.";
const BACKGROUND_DONE: &str = "Background task completed.";
const SESSION_CLEARED: &str = "Session cleared.";
const HELP_TEXT: &str = "nanoclaw commands:\n\
    /new - Start a new conversation\n\
    /clear - Clear the conversation (same as /new)\n\
    /help - Show available commands";

type SessionLocks = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;
type KeySet = Arc<std::sync::Mutex<HashSet<String>>>;

/// The main agent loop that processes messages and coordinates with LLM providers.
///
/// One `AgentLoop` owns one tool registry, one spend budget (shared with its
/// subagents) and one session manager; nothing is global.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use nanoclaw::agent::AgentLoop;
/// use nanoclaw::bus::MessageBus;
/// use nanoclaw::config::Config;
/// use nanoclaw::providers::OpenAIProvider;
/// use nanoclaw::session::SessionManager;
///
/// let config = Config::load()?;
/// let bus = Arc::new(MessageBus::new());
/// let provider = Arc::new(OpenAIProvider::new("sk-..."));
/// let agent = Arc::new(AgentLoop::new(config, SessionManager::new_memory(), bus, provider));
///
/// tokio::spawn({
///     let agent = Arc::clone(&agent);
///     async move { agent.start().await }
/// });
/// // ...
/// agent.stop();
/// ```
pub struct AgentLoop {
    config: Config,
    session_manager: Arc<SessionManager>,
    bus: Arc<MessageBus>,
    provider: Arc<dyn LLMProvider>,
    tools: RwLock<ToolRegistry>,
    context_builder: ContextBuilder,
    subagents: Arc<SubagentManager>,
    consolidator: Arc<MemoryConsolidator>,
    budget: Arc<SpendBudget>,
    user_context: Option<Arc<dyn UserContextProvider>>,
    /// Whether the loop is currently running
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    /// Per-session locks; also taken by consolidation when it applies a watermark
    session_locks: SessionLocks,
    /// Session keys with an incremental consolidation in flight
    consolidating: KeySet,
    background: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl AgentLoop {
    /// Creates an agent loop with the standard tool set registered.
    pub fn new(
        config: Config,
        session_manager: SessionManager,
        bus: Arc<MessageBus>,
        provider: Arc<dyn LLMProvider>,
    ) -> Self {
        let workspace = config.workspace_path();
        let defaults = &config.agents.defaults;
        let restrict = config.tools.restrict_to_workspace;
        let budget = Arc::new(SpendBudget::new(config.budget.ceiling));

        let subagents = Arc::new(
            SubagentManager::new(
                Arc::clone(&provider),
                workspace.clone(),
                Arc::clone(&bus),
                LoopSettings {
                    model: defaults.model.clone(),
                    max_iterations: defaults.subagent_max_iterations,
                    max_tokens: defaults.max_tokens,
                    temperature: defaults.temperature,
                },
            )
            .with_budget(Arc::clone(&budget))
            .with_restrict_to_workspace(restrict),
        );

        let consolidator = Arc::new(
            MemoryConsolidator::new(
                Arc::clone(&provider),
                MemoryStore::new(&workspace),
                &defaults.model,
                defaults.memory_window,
            )
            .with_budget(Arc::clone(&budget)),
        );

        let mut tools = ToolRegistry::new();
        let standard: Vec<Box<dyn Tool>> = vec![
            Box::new(ReadFileTool::new(restrict)),
            Box::new(WriteFileTool::new(restrict)),
            Box::new(EditFileTool::new(restrict)),
            Box::new(ListDirTool::new(restrict)),
            Box::new(MessageTool::new(Arc::clone(&bus))),
            Box::new(SpawnTool::new(Arc::clone(&subagents))),
        ];
        for tool in standard {
            if let Err(e) = tools.register(tool) {
                warn!(error = %e, "Skipping standard tool");
            }
        }

        let (shutdown_tx, _) = watch::channel(false);
        Self {
            context_builder: ContextBuilder::new(&workspace),
            config,
            session_manager: Arc::new(session_manager),
            bus,
            provider,
            tools: RwLock::new(tools),
            subagents,
            consolidator,
            budget,
            user_context: None,
            running: AtomicBool::new(false),
            shutdown_tx,
            session_locks: Arc::new(Mutex::new(HashMap::new())),
            consolidating: Arc::new(std::sync::Mutex::new(HashSet::new())),
            background: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Attaches an external user-modeling service.
    pub fn with_user_context_provider(mut self, provider: Arc<dyn UserContextProvider>) -> Self {
        self.user_context = Some(provider);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Registers an additional tool. Names must be unique.
    pub async fn register_tool(&self, tool: Box<dyn Tool>) -> Result<()> {
        self.tools.write().await.register(tool)
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.has(name)
    }

    /// Processes one inbound message and returns the reply text.
    ///
    /// User turns and the assistant reply are appended to the session only
    /// after the iteration loop succeeds, so a provider error leaves the
    /// session untouched.
    ///
    /// # Errors
    /// Provider failures and session persistence failures.
    pub async fn process_message(&self, msg: &InboundMessage) -> Result<String> {
        let session_key = match &msg.origin {
            MessageOrigin::User => msg.session_key.clone(),
            MessageOrigin::System { .. } => format!("{}:{}", msg.channel, msg.chat_id),
        };

        let session_lock = session_lock(&self.session_locks, &session_key).await;
        let _session_guard = session_lock.lock().await;

        let (current, is_user) = match &msg.origin {
            MessageOrigin::User => {
                if let Some(reply) = self.handle_command(&msg.content, &session_key).await? {
                    return Ok(reply);
                }
                (msg.content.clone(), true)
            }
            MessageOrigin::System { sender } => {
                (format!("[System: {}] {}", sender, msg.content), false)
            }
        };

        let mut session = self.session_manager.get_or_create(&session_key).await?;

        let user_context = match (&self.user_context, is_user) {
            (Some(provider), true) => {
                prefetch_or_none(provider.as_ref(), &session_key, &msg.content).await
            }
            _ => None,
        };

        let media: &[String] = if is_user { &msg.media } else { &[] };
        let defaults = &self.config.agents.defaults;
        let mut messages = self.context_builder.build_messages(
            session.get_history(defaults.memory_window),
            &current,
            media,
            Some(&msg.channel),
            Some(&msg.chat_id),
            user_context.as_ref(),
        );

        let workspace = self.config.workspace_path();
        let tool_ctx = ToolContext::new()
            .with_channel(&msg.channel, &msg.chat_id)
            .with_workspace(&workspace.to_string_lossy())
            .with_user_context(user_context);

        let settings = LoopSettings {
            model: defaults.model.clone(),
            max_iterations: defaults.max_tool_iterations,
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
        };

        let outcome = {
            let tools = self.tools.read().await;
            run_loop(
                &mut messages,
                &tools,
                self.provider.as_ref(),
                &settings,
                Some(self.budget.as_ref()),
                "agent",
                &tool_ctx,
            )
            .await?
        };
        debug!(
            iterations = outcome.iterations,
            stop = ?outcome.stop,
            tools = outcome.tools_used.len(),
            "Loop finished"
        );

        let reply = match outcome.stop {
            StopReason::BudgetExhausted => format!(
                "I've reached the spending limit for this conversation and stopped before finishing. {}",
                self.budget.summary()
            ),
            _ => {
                let fallback = if is_user { NO_RESPONSE } else { BACKGROUND_DONE };
                outcome
                    .content
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| fallback.to_string())
            }
        };

        session.add_message(Message::user(&current));
        session.add_message(Message::assistant(&reply).with_tools_used(outcome.tools_used));
        self.session_manager.save(&session).await?;

        if let Some(provider) = &self.user_context {
            sync_or_warn(provider.as_ref(), &session_key, &current, &reply).await;
        }

        self.maybe_consolidate(&session);
        Ok(reply)
    }

    /// Processes `content` as a user message without going through the bus.
    pub async fn process_direct(
        &self,
        content: &str,
        session_key: &str,
        channel: &str,
        chat_id: &str,
    ) -> Result<String> {
        let msg =
            InboundMessage::new(channel, "user", chat_id, content).with_session_key(session_key);
        self.process_message(&msg).await
    }

    async fn handle_command(&self, content: &str, session_key: &str) -> Result<Option<String>> {
        match content.trim().to_lowercase().as_str() {
            "/new" | "/clear" => {
                self.reset_session(session_key).await?;
                Ok(Some(SESSION_CLEARED.to_string()))
            }
            "/help" => Ok(Some(HELP_TEXT.to_string())),
            _ => Ok(None),
        }
    }

    /// Clears the live session immediately and archives every turn it held
    /// in the background.
    async fn reset_session(&self, session_key: &str) -> Result<()> {
        let mut session = self.session_manager.get_or_create(session_key).await?;
        let mut archive = Session::new(session_key);
        archive.messages = session.messages.clone();

        session.clear();
        self.session_manager.save(&session).await?;
        self.session_manager.invalidate(session_key).await;
        info!(session = %session_key, archived = archive.messages.len(), "Session cleared");

        if let Some(provider) = &self.user_context {
            new_session_or_warn(provider.as_ref(), session_key).await;
        }
        if archive.messages.is_empty() {
            return Ok(());
        }

        let consolidator = Arc::clone(&self.consolidator);
        let key = session_key.to_string();
        self.track(tokio::spawn(
            async move {
                match consolidator
                    .consolidate(&mut archive, ConsolidationMode::ArchiveAll)
                    .await
                {
                    ConsolidationOutcome::Failed(reason) => {
                        warn!(session = %key, reason = %reason, "Archive of cleared session failed")
                    }
                    outcome => debug!(session = %key, ?outcome, "Archived cleared session"),
                }
            }
            .instrument(info_span!("archive", session = %session_key)),
        ));
        Ok(())
    }

    /// Starts a detached incremental consolidation when the session has
    /// outgrown the memory window.
    fn maybe_consolidate(&self, session: &Session) {
        let window = self.consolidator.memory_window();
        if session.unconsolidated_count() <= window {
            return;
        }

        let Some(in_flight) = InFlight::acquire(&self.consolidating, &session.key) else {
            debug!(session = %session.key, "Consolidation already running");
            return;
        };

        let mut snapshot = session.clone();
        let consolidator = Arc::clone(&self.consolidator);
        let session_manager = Arc::clone(&self.session_manager);
        let locks = Arc::clone(&self.session_locks);
        let span = info_span!("consolidation", session = %session.key);

        self.track(tokio::spawn(
            async move {
                let _in_flight = in_flight;
                let outcome = consolidator
                    .consolidate(&mut snapshot, ConsolidationMode::Incremental)
                    .await;
                let ConsolidationOutcome::Consolidated { watermark, .. } = outcome else {
                    return;
                };
                if let Err(e) =
                    apply_watermark(&session_manager, &locks, &snapshot, watermark).await
                {
                    error!(error = %e, "Failed to save consolidation watermark");
                }
            }
            .instrument(span),
        ));
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    /// Waits for pending consolidation tasks and running subagents.
    pub async fn wait_for_background(&self) {
        loop {
            let handles: Vec<_> = {
                let mut background = self.background.lock().unwrap_or_else(|e| e.into_inner());
                background.drain(..).collect()
            };
            if handles.is_empty() && self.subagents.running_count() == 0 {
                return;
            }
            futures::future::join_all(handles).await;
            self.subagents.wait_for_all().await;
        }
    }

    /// Start the agent loop (consuming from message bus).
    ///
    /// Runs until `stop()` is called or the bus closes. The shutdown signal
    /// is observed within one poll interval even when the queue is idle.
    ///
    /// # Errors
    /// Returns an error if the loop is already running.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ClawError::Config("Agent loop already running".into()));
        }
        info!("Starting agent loop");

        // Subscribe fresh and consume any stale stop signal from a previous run.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = *shutdown_rx.borrow_and_update();
        let poll = Duration::from_millis(self.config.agents.defaults.poll_interval_ms.max(1));

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Received shutdown signal");
                        break;
                    }
                }
                polled = tokio::time::timeout(poll, self.bus.consume_inbound()) => {
                    match polled {
                        Ok(Some(msg)) => self.handle_inbound(msg).await,
                        Ok(None) => {
                            info!("Inbound channel closed");
                            break;
                        }
                        Err(_) => {}
                    }
                }
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Agent loop stopped");
        Ok(())
    }

    async fn handle_inbound(&self, msg: InboundMessage) {
        let origin = match &msg.origin {
            MessageOrigin::User => "user".to_string(),
            MessageOrigin::System { sender } => format!("system:{}", sender),
        };
        let span = info_span!(
            "request",
            request_id = %uuid::Uuid::new_v4(),
            channel = %msg.channel,
            chat_id = %msg.chat_id,
            origin = %origin,
        );

        async {
            info!("Processing message");
            let start = std::time::Instant::now();
            let content = match self.process_message(&msg).await {
                Ok(reply) => {
                    info!(
                        latency_ms = start.elapsed().as_millis() as u64,
                        response_len = reply.len(),
                        "Request completed"
                    );
                    reply
                }
                Err(e) => {
                    error!(
                        latency_ms = start.elapsed().as_millis() as u64,
                        error = %e,
                        "Request failed"
                    );
                    format!("Sorry, I encountered an error: {}", e)
                }
            };

            if let Err(e) = self
                .bus
                .publish_outbound(OutboundMessage::reply_to(&msg, &content))
                .await
            {
                error!("Failed to publish outbound message: {}", e);
            }
        }
        .instrument(span)
        .await;
    }

    /// Stop the agent loop.
    ///
    /// The message being processed finishes first. Running subagents are not
    /// cancelled.
    pub fn stop(&self) {
        info!(
            running_subagents = self.subagents.running_count(),
            "Stopping agent loop"
        );
        self.budget.emit_usage("shutdown");
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session_manager
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn budget(&self) -> &Arc<SpendBudget> {
        &self.budget
    }

    pub fn subagents(&self) -> &Arc<SubagentManager> {
        &self.subagents
    }

    pub fn consolidator(&self) -> &Arc<MemoryConsolidator> {
        &self.consolidator
    }
}

/// Returns the lock for `key`, dropping entries nobody holds or waits on.
async fn session_lock(locks: &SessionLocks, key: &str) -> Arc<Mutex<()>> {
    let mut locks = locks.lock().await;
    locks.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);
    Arc::clone(
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(()))),
    )
}

/// Moves the live session's watermark forward, provided it still begins
/// with the turns that were consolidated.
async fn apply_watermark(
    session_manager: &SessionManager,
    locks: &SessionLocks,
    snapshot: &Session,
    watermark: usize,
) -> Result<()> {
    let lock = session_lock(locks, &snapshot.key).await;
    let _guard = lock.lock().await;

    let mut live = session_manager.get_or_create(&snapshot.key).await?;
    let consolidated_len = snapshot.messages.len();
    let same_prefix = live.messages.len() >= consolidated_len
        && live.messages.get(consolidated_len.wrapping_sub(1)).map(|m| m.timestamp)
            == snapshot.messages.last().map(|m| m.timestamp);

    if !same_prefix {
        debug!(session = %snapshot.key, "Session changed during consolidation, dropping watermark");
        return Ok(());
    }
    if watermark > live.last_consolidated {
        live.set_last_consolidated(watermark);
        session_manager.save(&live).await?;
    }
    Ok(())
}

/// Marks a session key as consolidating until dropped.
struct InFlight {
    set: KeySet,
    key: String,
}

impl InFlight {
    fn acquire(set: &KeySet, key: &str) -> Option<Self> {
        let mut keys = set.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.insert(key.to_string()) {
            return None;
        }
        Some(Self {
            set: Arc::clone(set),
            key: key.to_string(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChatOptions, LLMResponse, ToolDefinition};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StaticProvider;

    #[async_trait]
    impl LLMProvider for StaticProvider {
        async fn chat(
            &self,
            _messages: Vec<Message>,
            _tools: Vec<ToolDefinition>,
            _model: Option<&str>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            Ok(LLMResponse::text("static reply"))
        }

        fn default_model(&self) -> &str {
            "static"
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn agent(temp: &TempDir) -> AgentLoop {
        let mut config = Config::default();
        config.agents.defaults.workspace = temp.path().to_string_lossy().to_string();
        config.agents.defaults.poll_interval_ms = 10;
        AgentLoop::new(
            config,
            SessionManager::new_memory(),
            Arc::new(MessageBus::new()),
            Arc::new(StaticProvider),
        )
    }

    #[tokio::test]
    async fn test_standard_tools_registered() {
        let temp = TempDir::new().unwrap();
        let agent = agent(&temp);

        assert!(!agent.is_running());
        assert_eq!(agent.tool_count().await, 6);
        for name in ["read_file", "write_file", "edit_file", "list_dir", "message", "spawn"] {
            assert!(agent.has_tool(name).await, "missing {}", name);
        }
        assert!(agent
            .register_tool(Box::new(crate::tools::EchoTool))
            .await
            .is_ok());
        assert!(agent
            .register_tool(Box::new(crate::tools::EchoTool))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_process_direct_records_turns() {
        let temp = TempDir::new().unwrap();
        let agent = agent(&temp);

        let reply = agent
            .process_direct("hello", "cli:direct", "cli", "direct")
            .await
            .unwrap();
        assert_eq!(reply, "static reply");

        let session = agent.session_manager().get_or_create("cli:direct").await.unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].content, "hello");
        assert_eq!(session.messages[1].content, "static reply");
    }

    #[tokio::test]
    async fn test_help_and_clear_commands() {
        let temp = TempDir::new().unwrap();
        let agent = agent(&temp);
        agent
            .process_direct("hello", "cli:direct", "cli", "direct")
            .await
            .unwrap();

        let help = agent
            .process_direct("  /HELP ", "cli:direct", "cli", "direct")
            .await
            .unwrap();
        assert!(help.contains("/new"));

        let cleared = agent
            .process_direct("/clear", "cli:direct", "cli", "direct")
            .await
            .unwrap();
        assert_eq!(cleared, "Session cleared.");
        let session = agent.session_manager().get_or_create("cli:direct").await.unwrap();
        assert!(session.messages.is_empty());
        assert_eq!(session.last_consolidated, 0);

        agent.wait_for_background().await;
    }

    #[tokio::test]
    async fn test_system_message_routes_to_origin() {
        let temp = TempDir::new().unwrap();
        let agent = agent(&temp);
        let msg = InboundMessage::system("subagent", "telegram", "chat-7", "[Subagent 'x' completed successfully]");

        agent.process_message(&msg).await.unwrap();

        let session = agent.session_manager().get_or_create("telegram:chat-7").await.unwrap();
        assert_eq!(
            session.messages[0].content,
            "[System: subagent] [Subagent 'x' completed successfully]"
        );
    }

    #[tokio::test]
    async fn test_idle_session_locks_are_pruned() {
        let temp = TempDir::new().unwrap();
        let agent = agent(&temp);

        for key in ["cli:a", "cli:b", "cli:c"] {
            let (channel, chat) = key.split_once(':').unwrap();
            agent.process_direct("hi", key, channel, chat).await.unwrap();
        }

        let locks = agent.session_locks.lock().await;
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key("cli:c"));
    }

    #[tokio::test]
    async fn test_agent_loop_start_stop() {
        let temp = TempDir::new().unwrap();
        let agent = Arc::new(agent(&temp));

        let agent_clone = Arc::clone(&agent);
        let handle = tokio::spawn(async move { agent_clone.start().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(agent.is_running());

        agent.stop();
        let result = tokio::time::timeout(Duration::from_millis(200), handle).await;
        assert!(result.is_ok());
        assert!(!agent.is_running());
    }

    #[tokio::test]
    async fn test_agent_loop_double_start() {
        let temp = TempDir::new().unwrap();
        let agent = Arc::new(agent(&temp));

        let agent_clone = Arc::clone(&agent);
        let handle = tokio::spawn(async move { agent_clone.start().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = agent.start().await;
        assert!(result.unwrap_err().to_string().contains("already running"));

        agent.stop();
        let _ = tokio::time::timeout(Duration::from_millis(200), handle).await;
    }

    #[tokio::test]
    async fn test_agent_loop_can_restart_after_stop() {
        let temp = TempDir::new().unwrap();
        let agent = Arc::new(agent(&temp));

        for _ in 0..2 {
            let agent_clone = Arc::clone(&agent);
            let run = tokio::spawn(async move { agent_clone.start().await });
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(agent.is_running());
            agent.stop();
            let result = tokio::time::timeout(Duration::from_millis(200), run).await;
            assert!(result.is_ok());
            assert!(!agent.is_running());
        }
    }

    #[tokio::test]
    async fn test_bus_round_trip() {
        let temp = TempDir::new().unwrap();
        let agent = Arc::new(agent(&temp));
        let bus = Arc::clone(agent.bus());

        let agent_clone = Arc::clone(&agent);
        let handle = tokio::spawn(async move { agent_clone.start().await });

        bus.publish_inbound(
            InboundMessage::new("cli", "user", "direct", "hi").with_metadata("thread", "42"),
        )
        .await
        .unwrap();
        let out = tokio::time::timeout(Duration::from_secs(2), bus.consume_outbound())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.content, "static reply");
        assert_eq!(out.metadata.get("thread").map(String::as_str), Some("42"));

        agent.stop();
        let _ = tokio::time::timeout(Duration::from_millis(200), handle).await;
    }

    #[test]
    fn test_in_flight_guard() {
        let set: KeySet = Arc::new(std::sync::Mutex::new(HashSet::new()));
        let first = InFlight::acquire(&set, "k").unwrap();
        assert!(InFlight::acquire(&set, "k").is_none());
        drop(first);
        assert!(InFlight::acquire(&set, "k").is_some());
    }
}
