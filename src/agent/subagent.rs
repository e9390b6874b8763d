//! Background subagents.
//!
//! A subagent is an independent `run_loop` with a restricted tool set,
//! running on its own tokio task. It shares the provider and spend budget
//! with the main agent and reports back by publishing a system-origin
//! inbound message routed to the conversation that spawned it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::bus::{InboundMessage, MessageBus};
use crate::error::Result;
use crate::memory::UserContext;
use crate::providers::LLMProvider;
use crate::session::Message;
use crate::tools::filesystem::{ListDirTool, ReadFileTool, WriteFileTool};
use crate::tools::{ToolContext, ToolRegistry};
use crate::utils::string::{prefix_chars, preview};

use super::budget::SpendBudget;
use super::runner::{run_loop, LoopSettings, StopReason};

/// Everything needed to start one subagent.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub task: String,
    /// Display label; derived from the task when absent
    pub label: Option<String>,
    pub origin_channel: String,
    pub origin_chat_id: String,
    /// What the spawning conversation already established
    pub context_summary: Option<String>,
    pub relevant_files: Vec<String>,
    pub user_context: Option<UserContext>,
}

impl SpawnRequest {
    pub fn new(task: &str, origin_channel: &str, origin_chat_id: &str) -> Self {
        Self {
            task: task.to_string(),
            label: None,
            origin_channel: origin_channel.to_string(),
            origin_chat_id: origin_chat_id.to_string(),
            context_summary: None,
            relevant_files: Vec::new(),
            user_context: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

type RunningMap = Arc<Mutex<HashMap<String, JoinHandle<()>>>>;

/// Spawns and tracks background subagents.
///
/// Subagents run to completion: nothing here cancels them. Each task removes
/// its own bookkeeping entry when it ends, however it ends.
pub struct SubagentManager {
    provider: Arc<dyn LLMProvider>,
    workspace: PathBuf,
    bus: Arc<MessageBus>,
    settings: LoopSettings,
    budget: Option<Arc<SpendBudget>>,
    restrict_to_workspace: bool,
    running: RunningMap,
}

impl SubagentManager {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        workspace: PathBuf,
        bus: Arc<MessageBus>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            provider,
            workspace,
            bus,
            settings,
            budget: None,
            restrict_to_workspace: false,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Shares the main agent's spend budget.
    pub fn with_budget(mut self, budget: Arc<SpendBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_restrict_to_workspace(mut self, restrict: bool) -> Self {
        self.restrict_to_workspace = restrict;
        self
    }

    /// Starts a subagent and returns the acknowledgement shown to the model.
    pub async fn spawn(&self, request: SpawnRequest) -> String {
        let task_id = prefix_chars(&uuid::Uuid::new_v4().simple().to_string(), 8);
        let label = request
            .label
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| preview(&request.task, 30));

        let job = SubagentJob {
            id: task_id.clone(),
            label: label.clone(),
            request,
            provider: Arc::clone(&self.provider),
            workspace: self.workspace.clone(),
            bus: Arc::clone(&self.bus),
            settings: self.settings.clone(),
            budget: self.budget.clone(),
            restrict_to_workspace: self.restrict_to_workspace,
        };
        let guard = RunningGuard {
            running: Arc::clone(&self.running),
            id: task_id.clone(),
        };
        let span = info_span!("subagent", task_id = %task_id, label = %label);

        {
            // Held across spawn + insert so the task cannot remove its entry
            // before it exists.
            let mut running = lock(&self.running);
            let handle = tokio::spawn(
                async move {
                    let _guard = guard;
                    job.run().await;
                }
                .instrument(span),
            );
            running.insert(task_id.clone(), handle);
        }

        info!(task_id = %task_id, label = %label, "Spawned subagent");
        format!(
            "Subagent [{}] started (id: {}). I'll notify you when it completes.",
            label, task_id
        )
    }

    pub fn running_count(&self) -> usize {
        lock(&self.running).len()
    }

    /// Waits until every subagent running at call time (and any started
    /// meanwhile) has finished.
    pub async fn wait_for_all(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut running = lock(&self.running);
                running.drain().map(|(_, handle)| handle).collect()
            };
            if handles.is_empty() {
                return;
            }
            for result in join_all(handles).await {
                if let Err(e) = result {
                    warn!(error = %e, "Subagent task ended abnormally");
                }
            }
        }
    }
}

fn lock(running: &RunningMap) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
    running.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes the task's entry when the task ends, including by panic.
struct RunningGuard {
    running: RunningMap,
    id: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        lock(&self.running).remove(&self.id);
    }
}

struct SubagentJob {
    id: String,
    label: String,
    request: SpawnRequest,
    provider: Arc<dyn LLMProvider>,
    workspace: PathBuf,
    bus: Arc<MessageBus>,
    settings: LoopSettings,
    budget: Option<Arc<SpendBudget>>,
    restrict_to_workspace: bool,
}

impl SubagentJob {
    async fn run(self) {
        info!("Subagent starting");
        let (result, ok) = match self.execute().await {
            Ok(text) => (text, true),
            Err(e) => {
                error!(error = %e, "Subagent failed");
                (format!("Error: {}", e), false)
            }
        };
        info!(ok, "Subagent finished");
        self.announce(&result, ok).await;
    }

    async fn execute(&self) -> Result<String> {
        let tools = self.build_tools()?;
        let workspace = self.workspace.to_string_lossy();
        let ctx = ToolContext::new()
            .with_channel(&self.request.origin_channel, &self.request.origin_chat_id)
            .with_workspace(&workspace);

        let mut messages = vec![
            Message::system(&self.build_prompt()),
            Message::user(&self.request.task),
        ];
        let outcome = run_loop(
            &mut messages,
            &tools,
            self.provider.as_ref(),
            &self.settings,
            self.budget.as_deref(),
            &format!("subagent:{}", self.id),
            &ctx,
        )
        .await?;

        Ok(match (outcome.stop, outcome.content) {
            (StopReason::BudgetExhausted, _) => "Budget exhausted - stopping subagent".to_string(),
            (_, Some(content)) if !content.trim().is_empty() => content,
            _ => "Task completed but no final response was generated.".to_string(),
        })
    }

    fn build_tools(&self) -> Result<ToolRegistry> {
        let restrict = self.restrict_to_workspace;
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(ReadFileTool::new(restrict)))?;
        tools.register(Box::new(WriteFileTool::new(restrict)))?;
        tools.register(Box::new(ListDirTool::new(restrict)))?;
        Ok(tools)
    }

    fn build_prompt(&self) -> String {
        let mut prompt = format!(
            "# Subagent\n\n\
             You are a subagent spawned by the main agent to complete a specific task.\n\n\
             ## Your Task\n{task}\n\n\
             ## Rules\n\
             1. Stay focused - complete only the assigned task, nothing else\n\
             2. Your final response will be reported back to the main agent\n\
             3. Do not initiate conversations or take on side tasks\n\
             4. Be concise but informative in your findings\n\n\
             ## What You Can Do\n\
             - Read and write files in the workspace\n\
             - List directory contents\n\
             - Complete the task thoroughly\n\n\
             ## What You Cannot Do\n\
             - Send messages directly to users (no message tool available)\n\
             - Spawn other subagents\n\
             - Access the main agent's conversation history\n\n\
             ## Workspace\n\
             Your workspace is at: {workspace}",
            task = self.request.task,
            workspace = self.workspace.display(),
        );

        if let Some(summary) = self.request.context_summary.as_deref() {
            prompt.push_str(&format!("\n\n## Conversation Context\n{}", summary));
        }

        if let Some(user) = &self.request.user_context {
            let mut parts = Vec::new();
            if let Some(rep) = user.representation.as_deref().filter(|s| !s.trim().is_empty()) {
                parts.push(rep.to_string());
            }
            if let Some(card) = user.card.as_deref().filter(|s| !s.trim().is_empty()) {
                parts.push(card.to_string());
            }
            if !parts.is_empty() {
                prompt.push_str(&format!("\n\n## User Context\n{}", parts.join("\n\n")));
            }
        }

        if !self.request.relevant_files.is_empty() {
            let files = self
                .request
                .relevant_files
                .iter()
                .map(|f| format!("- {}", f))
                .collect::<Vec<_>>()
                .join("\n");
            prompt.push_str(&format!("\n\n## Relevant Files\n{}", files));
        }

        prompt.push_str(
            "\n\nWhen you have completed the task, provide a clear summary of your findings or actions.",
        );
        prompt
    }

    async fn announce(&self, result: &str, ok: bool) {
        let status = if ok { "completed successfully" } else { "failed" };
        let content = format!(
            "[Subagent '{}' {}]\n\nTask: {}\n\nResult:\n{}\n\n\
             Summarize this naturally for the user. Keep it brief (1-2 sentences). \
             Do not mention technical details like \"subagent\" or task IDs.",
            self.label, status, self.request.task, result
        );

        let msg = InboundMessage::system(
            "subagent",
            &self.request.origin_channel,
            &self.request.origin_chat_id,
            &content,
        )
        .with_metadata("status", if ok { "ok" } else { "error" })
        .with_metadata("task_id", &self.id);

        if let Err(e) = self.bus.publish_inbound(msg).await {
            error!(error = %e, "Failed to announce subagent result");
        }
    }
}
