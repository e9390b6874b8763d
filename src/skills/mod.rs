//! Skills - Markdown instruction packs the model can load on demand.
//!
//! Each skill lives at `<workspace>/skills/<name>/SKILL.md` with optional
//! YAML front matter. Skills marked `always` are inlined into the system
//! prompt; the rest are listed in an XML summary and read with `read_file`.

mod loader;
mod types;

pub use loader::SkillsLoader;
pub use types::{ClawMetadata, Skill, SkillInfo, SkillMetadata, SkillRequirements};
