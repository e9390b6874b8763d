//! The tool-call iteration loop.
//!
//! Shared by the main agent and subagents. One call drives the model until it
//! answers without tool calls, the iteration cap is hit, or the spend budget
//! runs out:
//!
//! ```text
//!   ┌──────────── budget exhausted? ──yes──> BudgetExhausted
//!   │                  │ no
//!   │            provider.chat()  ──Err──> propagate
//!   │                  │
//!   │          record spend on budget
//!   │                  │
//!   │           tool calls? ──no──> Done(content)
//!   │                  │ yes
//!   │   assistant turn + one tool result per call + nudge
//!   └──────────────────┘          (cap reached ──> MaxIterations)
//! ```

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::providers::{ChatOptions, LLMProvider};
use crate::session::{Message, ToolCall};
use crate::tools::{ToolContext, ToolRegistry};

use super::budget::SpendBudget;
use super::context::ContextBuilder;

/// Appended after each round of tool results.
pub const CONTINUATION_NUDGE: &str = "Reflect on the results and decide next steps.";

/// Model parameters for one loop run.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub max_iterations: u32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LoopSettings {
    fn chat_options(&self) -> ChatOptions {
        ChatOptions::new()
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered without requesting tools
    Done,
    /// The shared budget was exhausted before the next call
    BudgetExhausted,
    /// The iteration cap was reached while tools were still being requested
    MaxIterations,
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Final answer; only `Some` for [`StopReason::Done`]
    pub content: Option<String>,
    pub stop: StopReason,
    /// Names of every tool executed, in call order
    pub tools_used: Vec<String>,
    /// Model calls that requested tools
    pub iterations: u32,
}

/// Runs the iteration loop over `messages`, appending every turn it produces.
///
/// Tool failures never abort the loop; they come back to the model as text.
/// A provider error propagates unchanged and leaves `messages` with whatever
/// complete rounds were already appended.
pub async fn run_loop(
    messages: &mut Vec<Message>,
    tools: &ToolRegistry,
    provider: &dyn LLMProvider,
    settings: &LoopSettings,
    budget: Option<&SpendBudget>,
    cost_source: &str,
    ctx: &ToolContext,
) -> Result<LoopOutcome> {
    let definitions = tools.definitions();
    let options = settings.chat_options();
    let mut tools_used = Vec::new();
    let mut iteration = 0;

    while iteration < settings.max_iterations {
        if budget.is_some_and(|b| b.is_exhausted()) {
            info!(source = cost_source, iteration, "Budget exhausted, stopping loop");
            return Ok(LoopOutcome {
                content: None,
                stop: StopReason::BudgetExhausted,
                tools_used,
                iterations: iteration,
            });
        }

        let response = provider
            .chat(
                messages.clone(),
                definitions.clone(),
                Some(settings.model.as_str()),
                options.clone(),
            )
            .await?;

        if let Some(budget) = budget {
            budget.record(
                response.cost,
                response.prompt_tokens(),
                response.completion_tokens(),
                cost_source,
            );
        }

        if !response.has_tool_calls() {
            return Ok(LoopOutcome {
                content: Some(response.content),
                stop: StopReason::Done,
                tools_used,
                iterations: iteration,
            });
        }

        iteration += 1;
        debug!(
            iteration,
            max = settings.max_iterations,
            calls = response.tool_calls.len(),
            "Tool iteration"
        );

        ContextBuilder::add_assistant_message(
            messages,
            &response.content,
            Some(response.tool_calls.clone()),
        );

        for call in &response.tool_calls {
            let result = execute_call(tools, call, ctx).await;
            tools_used.push(call.name.clone());
            ContextBuilder::add_tool_result(messages, &call.id, &call.name, &result);
        }

        messages.push(Message::user(CONTINUATION_NUDGE));
    }

    info!(
        source = cost_source,
        iterations = iteration,
        "Tool loop reached maximum iterations"
    );
    Ok(LoopOutcome {
        content: None,
        stop: StopReason::MaxIterations,
        tools_used,
        iterations: iteration,
    })
}

async fn execute_call(tools: &ToolRegistry, call: &ToolCall, ctx: &ToolContext) -> String {
    let args = parse_arguments(call);
    info!(tool = %call.name, id = %call.id, "Executing tool");
    let start = Instant::now();
    let result = tools.execute_with_context(&call.name, args, ctx).await;
    debug!(
        tool = %call.name,
        latency_ms = start.elapsed().as_millis() as u64,
        result_len = result.len(),
        "Tool finished"
    );
    result
}

/// Arguments as JSON; anything unparsable becomes `{}`.
fn parse_arguments(call: &ToolCall) -> Value {
    if call.arguments.trim().is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(v) => v,
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Invalid JSON in tool arguments");
            Value::Object(Default::default())
        }
    }
}
