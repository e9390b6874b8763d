//! Filesystem tools for NanoClaw
//!
//! Reading, writing, editing and listing files. Paths may be absolute or
//! relative to the workspace in the tool context. When a tool is built with
//! `restrict_to_workspace`, any path that normalises to a location outside
//! the workspace is rejected.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};

use crate::config::expand_home;
use crate::error::{ClawError, Result};
use crate::utils::string::preview;

use super::{Tool, ToolContext};

/// Lexically normalise `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn resolve_path(path: &str, ctx: &ToolContext, restrict: bool) -> Result<PathBuf> {
    let workspace = ctx.workspace.as_deref().map(|w| normalize(&expand_home(w)));
    let requested = expand_home(path);

    let full = match (&workspace, requested.is_absolute()) {
        (_, true) => normalize(&requested),
        (Some(ws), false) => normalize(&ws.join(&requested)),
        (None, false) => normalize(&std::env::current_dir()?.join(&requested)),
    };

    if restrict {
        let ws = workspace.ok_or_else(|| {
            ClawError::SecurityViolation(
                "Workspace not configured; restricted file tools need a workspace".to_string(),
            )
        })?;
        if !full.starts_with(&ws) {
            return Err(ClawError::SecurityViolation(format!(
                "Path '{}' is outside the workspace",
                path
            )));
        }
    }

    Ok(full)
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ClawError::Tool(format!("Missing '{}' argument", key)))
}

/// Reads a UTF-8 text file.
pub struct ReadFileTool {
    restrict_to_workspace: bool,
}

impl ReadFileTool {
    pub fn new(restrict_to_workspace: bool) -> Self {
        Self {
            restrict_to_workspace,
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the specified path"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let path = required_str(&args, "path")?;
        let full_path = resolve_path(path, ctx, self.restrict_to_workspace)?;

        tokio::fs::read_to_string(&full_path).await.map_err(|e| {
            ClawError::Tool(format!(
                "Failed to read file '{}': {}",
                full_path.display(),
                e
            ))
        })
    }
}

/// Writes a file, creating parent directories.
pub struct WriteFileTool {
    restrict_to_workspace: bool,
}

impl WriteFileTool {
    pub fn new(restrict_to_workspace: bool) -> Self {
        Self {
            restrict_to_workspace,
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file at the specified path, creating it if necessary"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let path = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        let full_path = resolve_path(path, ctx, self.restrict_to_workspace)?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ClawError::Tool(format!("Failed to create parent directories: {}", e))
            })?;
        }

        tokio::fs::write(&full_path, content).await.map_err(|e| {
            ClawError::Tool(format!(
                "Failed to write file '{}': {}",
                full_path.display(),
                e
            ))
        })?;

        Ok(format!(
            "Successfully wrote {} bytes to {}",
            content.len(),
            full_path.display()
        ))
    }
}

/// Lists a directory, one entry per line, directories suffixed with `/`.
pub struct ListDirTool {
    restrict_to_workspace: bool,
}

impl ListDirTool {
    pub fn new(restrict_to_workspace: bool) -> Self {
        Self {
            restrict_to_workspace,
        }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the contents of a directory at the specified path"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the directory to list"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let path = required_str(&args, "path")?;
        let full_path = resolve_path(path, ctx, self.restrict_to_workspace)?;

        let mut entries = tokio::fs::read_dir(&full_path).await.map_err(|e| {
            ClawError::Tool(format!(
                "Failed to read directory '{}': {}",
                full_path.display(),
                e
            ))
        })?;

        let mut items = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ClawError::Tool(format!("Failed to read directory entry: {}", e)))?
        {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let suffix = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => "/",
                Ok(ft) if ft.is_symlink() => "@",
                _ => "",
            };
            items.push(format!("{}{}", file_name, suffix));
        }

        if items.is_empty() {
            return Ok(format!("Directory {} is empty", full_path.display()));
        }
        items.sort();
        Ok(items.join("\n"))
    }
}

/// Replaces text inside a file.
pub struct EditFileTool {
    restrict_to_workspace: bool,
}

impl EditFileTool {
    pub fn new(restrict_to_workspace: bool) -> Self {
        Self {
            restrict_to_workspace,
        }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing specified text with new content"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to edit"
                },
                "old_text": {
                    "type": "string",
                    "description": "The exact text to replace"
                },
                "new_text": {
                    "type": "string",
                    "description": "The replacement text"
                }
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let path = required_str(&args, "path")?;
        let old_text = required_str(&args, "old_text")?;
        let new_text = required_str(&args, "new_text")?;
        let full_path = resolve_path(path, ctx, self.restrict_to_workspace)?;

        let content = tokio::fs::read_to_string(&full_path).await.map_err(|e| {
            ClawError::Tool(format!(
                "Failed to read file '{}': {}",
                full_path.display(),
                e
            ))
        })?;

        let replacements = content.matches(old_text).count();
        if old_text.is_empty() || replacements == 0 {
            return Err(ClawError::Tool(format!(
                "Text '{}' not found in file '{}'",
                preview(old_text, 50),
                full_path.display()
            )));
        }

        let new_content = content.replace(old_text, new_text);
        tokio::fs::write(&full_path, &new_content)
            .await
            .map_err(|e| {
                ClawError::Tool(format!(
                    "Failed to write file '{}': {}",
                    full_path.display(),
                    e
                ))
            })?;

        Ok(format!(
            "Successfully replaced {} occurrence(s) in {}",
            replacements,
            full_path.display()
        ))
    }
}
