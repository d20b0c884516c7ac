//! Skill registry: directory scan, validation against the base tool
//! registry, name lookup.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::tools::ToolRegistry;

use super::{Skill, SkillError};

/// Read-only index of valid skills, built once at startup.
#[derive(Default, Debug)]
pub struct SkillRegistry {
    skills: BTreeMap<String, Skill>,
}

impl SkillRegistry {
    /// Scans `dir` for skill files, parses and validates each, and indexes
    /// the valid ones. Invalid skills are logged and omitted. A missing
    /// directory yields an empty registry.
    pub fn load_dir(dir: &Path, base_tools: &ToolRegistry) -> Self {
        let mut registry = SkillRegistry::default();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                info!(dir = %dir.display(), error = %e, "no skills directory, starting without skills");
                return registry;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_skill_file = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e, "md" | "markdown" | "txt"))
                .unwrap_or(false);
            if !is_skill_file {
                continue;
            }
            let source_name = path.display().to_string();
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(file = %source_name, error = %e, "skipping unreadable skill file");
                    continue;
                }
            };
            match Skill::parse(&source_name, &raw) {
                Ok(skill) => {
                    if let Err(e) = registry.insert(skill, base_tools) {
                        warn!(file = %source_name, error = %e, "skipping invalid skill");
                    }
                }
                Err(e) => warn!(file = %source_name, error = %e, "skipping invalid skill"),
            }
        }

        info!(count = registry.len(), "skill registry loaded");
        registry
    }

    /// Builds a registry from already-constructed skills, validating each.
    pub fn from_skills(
        skills: impl IntoIterator<Item = Skill>,
        base_tools: &ToolRegistry,
    ) -> Result<Self, SkillError> {
        let mut registry = SkillRegistry::default();
        for skill in skills {
            registry.insert(skill, base_tools)?;
        }
        Ok(registry)
    }

    fn insert(&mut self, skill: Skill, base_tools: &ToolRegistry) -> Result<(), SkillError> {
        for tool in &skill.tools {
            if !base_tools.contains(tool) {
                return Err(SkillError::UnknownTool {
                    skill: skill.name.clone(),
                    tool: tool.clone(),
                });
            }
        }
        self.skills.insert(skill.name.clone(), skill);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// `(name, description)` pairs for the planner's skill catalogue, in
    /// name order.
    pub fn catalogue(&self) -> Vec<(String, String)> {
        self.skills
            .values()
            .map(|s| (s.name.clone(), s.description.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::build_base_registry;

    fn base() -> ToolRegistry {
        build_base_registry(None).unwrap()
    }

    #[test]
    fn skill_with_unknown_tool_is_rejected() {
        let skill = Skill::new(
            "bad",
            "declares a missing tool",
            vec!["no_such_tool".to_string()],
            "body",
        );
        let err = SkillRegistry::from_skills([skill], &base()).unwrap_err();
        assert!(matches!(err, SkillError::UnknownTool { .. }));
    }

    #[test]
    fn load_dir_skips_invalid_files_and_keeps_valid_ones() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("fetcher.md"),
            "---\nname: fetcher\ndescription: fetch pages\ntools:\n  - web_fetch\n---\nFetch: $ARGUMENTS\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("broken.md"),
            "---\nname: broken\ntools:\n  - ghost_tool\n---\nbody\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let registry = SkillRegistry::load_dir(dir.path(), &base());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("fetcher"));
        assert!(!registry.contains("broken"));
    }

    #[test]
    fn missing_directory_yields_empty_registry() {
        let registry =
            SkillRegistry::load_dir(Path::new("/nonexistent/skills"), &base());
        assert!(registry.is_empty());
    }
}
