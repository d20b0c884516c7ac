//! Skills: tool-scoped prompt templates loaded from disk.
//!
//! A skill file is markdown with a YAML front-matter block naming the skill,
//! its permitted tools, the target LLM profile, and the worker turn budget;
//! the body carries one `$ARGUMENTS` placeholder. Skills are validated at
//! startup against the base tool registry; invalid files log a warning and
//! are skipped so the process still starts.

mod executor;
mod registry;

pub use executor::{SkillExecutor, SkillRun};
pub use registry::SkillRegistry;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Placeholder substituted with the structured arguments at render time.
pub const ARGUMENTS_SLOT: &str = "$ARGUMENTS";

#[derive(Debug, Error)]
pub enum SkillError {
    #[error("missing front matter in {0}")]
    MissingFrontMatter(String),
    #[error("invalid front matter in {name}: {message}")]
    FrontMatter { name: String, message: String },
    #[error("skill '{skill}' declares unknown tool '{tool}'")]
    UnknownTool { skill: String, tool: String },
    #[error("read {path}: {message}")]
    Read { path: String, message: String },
}

#[derive(Debug, Deserialize)]
struct FrontMatter {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    max_turns: Option<u32>,
}

/// One loaded skill. Immutable after load.
#[derive(Clone, Debug)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Permitted tool names, in declaration order.
    pub tools: Vec<String>,
    /// Target LLM profile; the executor falls back to its default when unset.
    pub profile: Option<String>,
    /// Worker-loop budget; falls back to the configured default when unset.
    pub max_turns: Option<u32>,
    body: String,
}

impl Skill {
    /// Parses one skill file: front-matter block between `---` fences, then
    /// the body.
    pub fn parse(source_name: &str, raw: &str) -> Result<Self, SkillError> {
        let rest = raw
            .strip_prefix("---")
            .ok_or_else(|| SkillError::MissingFrontMatter(source_name.to_string()))?;
        let (header, body) = rest
            .split_once("\n---")
            .ok_or_else(|| SkillError::MissingFrontMatter(source_name.to_string()))?;

        let front: FrontMatter =
            serde_yaml::from_str(header).map_err(|e| SkillError::FrontMatter {
                name: source_name.to_string(),
                message: e.to_string(),
            })?;

        Ok(Skill {
            name: front.name,
            description: front.description.unwrap_or_default(),
            tools: front.tools,
            profile: front.profile,
            max_turns: front.max_turns,
            body: body.trim_start_matches('\n').to_string(),
        })
    }

    /// Builds a skill directly; used by tests and embedded catalogues.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tools: Vec<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools,
            profile: None,
            max_turns: None,
            body: body.into(),
        }
    }

    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns = Some(turns);
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Renders the body, substituting the `$ARGUMENTS` slot. Objects and
    /// arrays substitute as JSON; strings substitute bare.
    pub fn render(&self, args: &Value) -> String {
        let rendered_args = match args {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        self.body.replace(ARGUMENTS_SLOT, &rendered_args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RESEARCHER: &str = r#"---
name: researcher
description: Research a topic on the web.
tools:
  - web_search
  - web_fetch
profile: researcher
max_turns: 4
---
Research the following topic and summarise findings.

Topic: $ARGUMENTS
"#;

    #[test]
    fn parses_front_matter_and_body() {
        let skill = Skill::parse("researcher.md", RESEARCHER).unwrap();
        assert_eq!(skill.name, "researcher");
        assert_eq!(skill.tools, vec!["web_search", "web_fetch"]);
        assert_eq!(skill.profile.as_deref(), Some("researcher"));
        assert_eq!(skill.max_turns, Some(4));
        assert!(skill.body.starts_with("Research the following"));
    }

    #[test]
    fn renders_string_arguments_bare_and_objects_as_json() {
        let skill = Skill::parse("researcher.md", RESEARCHER).unwrap();
        let rendered = skill.render(&json!("rust async"));
        assert!(rendered.contains("Topic: rust async"));

        let rendered = skill.render(&json!({"topic": "mcp"}));
        assert!(rendered.contains(r#"{"topic":"mcp"}"#));
    }

    #[test]
    fn file_without_front_matter_is_rejected() {
        let err = Skill::parse("plain.md", "just a prompt").unwrap_err();
        assert!(matches!(err, SkillError::MissingFrontMatter(_)));
    }
}
