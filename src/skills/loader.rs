//! Skills loader and parser.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;

use super::types::{ClawMetadata, Skill, SkillInfo, SkillMetadata};

/// Discovers `<dir>/<name>/SKILL.md` files.
///
/// Workspace skills shadow builtin skills of the same name.
pub struct SkillsLoader {
    workspace_dir: PathBuf,
    builtin_dir: Option<PathBuf>,
}

impl SkillsLoader {
    /// Loader over `<workspace>/skills`.
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace_dir: workspace.join("skills"),
            builtin_dir: None,
        }
    }

    pub fn with_builtin_dir(mut self, dir: PathBuf) -> Self {
        self.builtin_dir = Some(dir);
        self
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// All skills sorted by name, optionally only those whose requirements are met.
    pub fn list_skills(&self, filter_unavailable: bool) -> Vec<SkillInfo> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();

        collect_skill_infos(&self.workspace_dir, "workspace", &mut out, &mut seen);
        if let Some(builtin) = &self.builtin_dir {
            collect_skill_infos(builtin, "builtin", &mut out, &mut seen);
        }

        if filter_unavailable {
            out.retain(|info| {
                self.load_skill(&info.name)
                    .map(|skill| self.check_requirements(&skill))
                    .unwrap_or(false)
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn load_skill(&self, name: &str) -> Option<Skill> {
        let workspace = self.workspace_dir.join(name).join("SKILL.md");
        if workspace.is_file() {
            return parse_skill_file(&workspace, name, "workspace");
        }

        let builtin = self.builtin_dir.as_ref()?.join(name).join("SKILL.md");
        if builtin.is_file() {
            return parse_skill_file(&builtin, name, "builtin");
        }

        None
    }

    /// XML summary of every skill, for progressive loading by the model.
    pub fn build_skills_summary(&self) -> String {
        let skills = self.list_skills(false);
        if skills.is_empty() {
            return String::new();
        }

        let mut lines = vec!["<skills>".to_string()];
        for info in skills {
            let Some(skill) = self.load_skill(&info.name) else {
                continue;
            };
            let meta = claw_metadata(&skill);
            let missing = meta.requires.missing();

            lines.push(format!("  <skill available=\"{}\">", missing.is_empty()));
            lines.push(format!(
                "    <name>{}{}</name>",
                meta.emoji.map(|e| format!("{} ", e)).unwrap_or_default(),
                escape_xml(&skill.name)
            ));
            lines.push(format!(
                "    <description>{}</description>",
                escape_xml(&skill.description)
            ));
            lines.push(format!(
                "    <location>{}</location>",
                escape_xml(&skill.path)
            ));
            if !missing.is_empty() {
                lines.push(format!(
                    "    <requires>{}</requires>",
                    escape_xml(&missing.join(", "))
                ));
            }
            lines.push("  </skill>".to_string());
        }
        lines.push("</skills>".to_string());
        lines.join("\n")
    }

    /// Full bodies of the named skills, separated by horizontal rules.
    pub fn load_skills_for_context(&self, names: &[String]) -> String {
        names
            .iter()
            .filter_map(|name| self.load_skill(name))
            .map(|skill| format!("### Skill: {}\n\n{}", skill.name, skill.content))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }

    /// Names of available skills marked `always`.
    pub fn get_always_skills(&self) -> Vec<String> {
        self.list_skills(true)
            .into_iter()
            .filter_map(|info| self.load_skill(&info.name))
            .filter(|skill| skill.metadata.always || claw_metadata(skill).always)
            .map(|skill| skill.name)
            .collect()
    }

    pub fn check_requirements(&self, skill: &Skill) -> bool {
        claw_metadata(skill).requires.missing().is_empty()
    }
}

fn parse_skill_file(path: &Path, fallback_name: &str, source: &str) -> Option<Skill> {
    let raw = std::fs::read_to_string(path).ok()?;
    let (metadata, body) = parse_frontmatter(&raw);

    let name = if metadata.name.trim().is_empty() {
        fallback_name.to_string()
    } else {
        metadata.name.clone()
    };
    let description = if metadata.description.trim().is_empty() {
        name.clone()
    } else {
        metadata.description.clone()
    };

    Some(Skill {
        name,
        description,
        path: path.to_string_lossy().to_string(),
        source: source.to_string(),
        metadata,
        content: body,
    })
}

fn parse_frontmatter(content: &str) -> (SkillMetadata, String) {
    if let Ok(re) = Regex::new(r"(?s)^---\r?\n(.*?)\r?\n---\r?\n?") {
        if let Some(captures) = re.captures(content) {
            if let (Some(frontmatter), Some(full)) = (captures.get(1), captures.get(0)) {
                let metadata = match serde_yaml::from_str::<SkillMetadata>(frontmatter.as_str()) {
                    Ok(meta) => meta,
                    Err(e) => {
                        tracing::warn!("Failed to parse skill frontmatter: {}", e);
                        SkillMetadata::default()
                    }
                };
                let body = content[full.end()..].trim().to_string();
                return (metadata, body);
            }
        }
    }

    (SkillMetadata::default(), content.to_string())
}

/// The `nanoclaw` block of `metadata`; accepts an object or a JSON string.
fn claw_metadata(skill: &Skill) -> ClawMetadata {
    let value = match &skill.metadata.metadata {
        Some(serde_json::Value::String(raw)) => serde_json::from_str(raw).ok(),
        Some(other) => Some(other.clone()),
        None => None,
    };

    value
        .and_then(|v| {
            let scoped = v.get("nanoclaw").cloned().unwrap_or(v);
            serde_json::from_value(scoped).ok()
        })
        .unwrap_or_default()
}

fn collect_skill_infos(
    dir: &Path,
    source: &str,
    output: &mut Vec<SkillInfo>,
    seen: &mut HashSet<String>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if seen.contains(&name) {
            continue;
        }

        let skill_file = path.join("SKILL.md");
        if !skill_file.is_file() {
            continue;
        }

        seen.insert(name.clone());
        output.push(SkillInfo {
            name,
            path: skill_file.to_string_lossy().to_string(),
            source: source.to_string(),
        });
    }
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub(crate) fn binary_in_path(bin: &str) -> bool {
    if bin.trim().is_empty() {
        return false;
    }
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };

    std::env::split_paths(&path).any(|dir| {
        dir.join(bin).is_file() || (cfg!(windows) && dir.join(format!("{}.exe", bin)).is_file())
    })
}
