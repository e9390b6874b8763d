//! Skill type definitions.

use serde::{Deserialize, Serialize};

/// A loaded skill: front matter plus Markdown body.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Absolute path of the SKILL.md file
    pub path: String,
    /// "workspace" or "builtin"
    pub source: String,
    pub metadata: SkillMetadata,
    /// Body with the front matter removed
    pub content: String,
}

/// Directory listing entry, before the file is parsed.
#[derive(Debug, Clone)]
pub struct SkillInfo {
    pub name: String,
    pub path: String,
    pub source: String,
}

/// YAML front matter of a SKILL.md.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillMetadata {
    pub name: String,
    pub description: String,
    pub version: Option<String>,
    /// Inline the full body into every system prompt.
    pub always: bool,
    /// Runtime-specific block, either an object or a JSON string.
    pub metadata: Option<serde_json::Value>,
}

/// The `nanoclaw` block inside `metadata`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClawMetadata {
    pub emoji: Option<String>,
    pub requires: SkillRequirements,
    pub always: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillRequirements {
    /// Executables that must be on PATH
    pub bins: Vec<String>,
    /// Environment variables that must be set
    pub env: Vec<String>,
}

impl SkillRequirements {
    /// Human-readable list of what is missing, empty when satisfied.
    pub fn missing(&self) -> Vec<String> {
        let bins = self
            .bins
            .iter()
            .filter(|b| !super::loader::binary_in_path(b))
            .map(|b| format!("CLI: {}", b));
        let env = self
            .env
            .iter()
            .filter(|e| std::env::var(e).is_err())
            .map(|e| format!("ENV: {}", e));
        bins.chain(env).collect()
    }
}
