//! Context builder for agent conversations
//!
//! Assembles the system prompt (identity, workspace bootstrap documents,
//! long-term memory, external user context, skills) and the message list
//! handed to the model for one exchange.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Local;
use tracing::debug;

use crate::memory::{MemoryStore, UserContext};
use crate::session::{ContentPart, ImageUrl, Message, ToolCall};
use crate::skills::SkillsLoader;
use crate::utils::media;

/// Workspace files inlined into every system prompt, in this order.
pub const BOOTSTRAP_FILES: &[&str] = &["AGENTS.md", "SOUL.md", "USER.md", "TOOLS.md", "IDENTITY.md"];

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Builds system prompts and model message lists rooted at one workspace.
///
/// # Example
///
/// ```rust
/// use nanoclaw::agent::ContextBuilder;
///
/// let dir = tempfile::tempdir().unwrap();
/// let builder = ContextBuilder::new(dir.path());
/// let messages = builder.build_messages(vec![], "Hello", &[], Some("cli"), Some("direct"), None);
/// assert_eq!(messages.len(), 2);
/// assert!(messages[0].content.contains("Chat ID: direct"));
/// assert_eq!(messages[1].content, "Hello");
/// ```
pub struct ContextBuilder {
    workspace: PathBuf,
    memory: MemoryStore,
    skills: SkillsLoader,
}

impl ContextBuilder {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            memory: MemoryStore::new(workspace),
            skills: SkillsLoader::new(workspace),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Full system prompt, sections separated by horizontal rules.
    pub fn build_system_prompt(&self, user_context: Option<&UserContext>) -> String {
        let mut parts = vec![self.identity()];

        let bootstrap = self.load_bootstrap_files();
        if !bootstrap.is_empty() {
            parts.push(bootstrap);
        }

        if let Some(memory) = self.memory.get_memory_context() {
            parts.push(format!("# Memory\n\n{}", memory));
        }

        if let Some(user) = user_context.and_then(render_user_context) {
            parts.push(user);
        }

        let always = self.skills.get_always_skills();
        if !always.is_empty() {
            let bodies = self.skills.load_skills_for_context(&always);
            if !bodies.is_empty() {
                parts.push(format!("# Active Skills\n\n{}", bodies));
            }
        }

        let summary = self.skills.build_skills_summary();
        if !summary.is_empty() {
            parts.push(format!(
                "# Skills\n\n\
                 The following skills extend your capabilities. To use a skill, read its \
                 SKILL.md file using the read_file tool.\n\
                 Skills with available=\"false\" need dependencies installed first.\n\n{}",
                summary
            ));
        }

        parts.join(SECTION_SEPARATOR)
    }

    /// System prompt, history, then the current user message.
    pub fn build_messages(
        &self,
        history: Vec<Message>,
        current: &str,
        media: &[String],
        channel: Option<&str>,
        chat_id: Option<&str>,
        user_context: Option<&UserContext>,
    ) -> Vec<Message> {
        let mut system = self.build_system_prompt(user_context);
        if let (Some(channel), Some(chat_id)) = (channel, chat_id) {
            system.push_str(&format!(
                "\n\n## Current Session\nChannel: {}\nChat ID: {}",
                channel, chat_id
            ));
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(&system));
        messages.extend(history);
        messages.push(build_user_message(current, media));
        messages
    }

    pub fn add_assistant_message(
        messages: &mut Vec<Message>,
        content: &str,
        tool_calls: Option<Vec<ToolCall>>,
    ) {
        match tool_calls {
            Some(calls) if !calls.is_empty() => {
                messages.push(Message::assistant_with_tools(content, calls))
            }
            _ => messages.push(Message::assistant(content)),
        }
    }

    pub fn add_tool_result(messages: &mut Vec<Message>, id: &str, name: &str, result: &str) {
        messages.push(Message::tool_result(id, name, result));
    }

    fn identity(&self) -> String {
        let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
        let workspace = self.workspace.display();
        format!(
            "# nanoclaw\n\n\
             You are nanoclaw, a helpful AI assistant. You have access to tools that allow you to:\n\
             - Read, write, and edit files\n\
             - Send messages to users on chat channels\n\
             - Spawn subagents for complex background tasks\n\n\
             ## Current Time\n{now}\n\n\
             ## Runtime\n{os} {arch}, Rust\n\n\
             ## Workspace\n\
             Your workspace is at: {workspace}\n\
             - Long-term memory: {workspace}/memory/MEMORY.md\n\
             - History log: {workspace}/memory/HISTORY.md (grep-searchable)\n\
             - Custom skills: {workspace}/skills/{{skill-name}}/SKILL.md\n\n\
             Reply directly with text for conversations. Only use the 'message' tool to send \
             to a specific chat channel.\n\
             Always be helpful, accurate, and concise. When using tools, think step by step.\n\
             To remember something durable, write it to {workspace}/memory/MEMORY.md",
            now = now,
            os = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            workspace = workspace,
        )
    }

    fn load_bootstrap_files(&self) -> String {
        BOOTSTRAP_FILES
            .iter()
            .filter_map(|name| {
                let content = std::fs::read_to_string(self.workspace.join(name)).ok()?;
                Some(format!("## {}\n\n{}", name, content))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn render_user_context(ctx: &UserContext) -> Option<String> {
    let mut sections = Vec::new();
    if let Some(rep) = ctx.representation.as_deref().filter(|s| !s.trim().is_empty()) {
        sections.push(format!("## User Representation\n{}", rep));
    }
    if let Some(card) = ctx.card.as_deref().filter(|s| !s.trim().is_empty()) {
        sections.push(format!("## User Card\n{}", card));
    }
    if sections.is_empty() {
        None
    } else {
        Some(format!("# User Context\n\n{}", sections.join("\n\n")))
    }
}

/// Plain text, or images followed by the text when any image is readable.
fn build_user_message(text: &str, media_paths: &[String]) -> Message {
    let mut parts: Vec<ContentPart> = media_paths
        .iter()
        .filter_map(|p| encode_image(Path::new(p)))
        .collect();

    if parts.is_empty() {
        return Message::user(text);
    }
    parts.push(ContentPart::Text {
        text: text.to_string(),
    });
    Message::user_with_parts(text, parts)
}

fn encode_image(path: &Path) -> Option<ContentPart> {
    if !media::is_image(path) {
        debug!(path = %path.display(), "Skipping non-image media");
        return None;
    }
    let mime = media::guess_mime(path)?;
    let bytes = std::fs::read(path).ok()?;
    Some(ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: format!("data:{};base64,{}", mime, BASE64.encode(bytes)),
        },
    })
}
