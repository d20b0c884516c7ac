//! YAML-backed tool specs and base registry construction.
//!
//! Each builtin tool has one file under `hearth/tools/*.yaml`, embedded at
//! compile time and parsed when the base registry is built. Specs from YAML
//! override the Rust `spec()` for listing and execution metadata; dispatch
//! still goes to the registered Rust implementations. A deployment may layer
//! a further `tools.yaml` on top for site-local descriptions or confirmation
//! policy. Add a new line to `TOOL_YAML_FILES` when adding a builtin YAML.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{
    CurrentTimeTool, ShellTool, Tool, ToolCallContext, ToolError, ToolOutput, ToolRegistry,
    ToolSpec, WebFetchTool,
};

macro_rules! embed_tool_yaml {
    ($($path:literal),+ $(,)?) => {
        &[ $( include_str!($path) ),+ ]
    };
}

const TOOL_YAML_FILES: &[&str] = embed_tool_yaml!(
    "../../tools/web_fetch.yaml",
    "../../tools/shell.yaml",
    "../../tools/current_time.yaml",
);

/// Errors from loading tool specs or building the base registry.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to parse tool YAML ({name}): {message}")]
    Parse { name: String, message: String },
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
    #[error("spec override for unknown tool: {0}")]
    UnknownTool(String),
}

/// A registered tool whose listed spec comes from YAML instead of `spec()`.
struct SpecOverrideTool {
    inner: Arc<dyn Tool>,
    spec: ToolSpec,
}

#[async_trait]
impl Tool for SpecOverrideTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(
        &self,
        args: Value,
        ctx: Option<&ToolCallContext>,
    ) -> Result<ToolOutput, ToolError> {
        self.inner.call(args, ctx).await
    }
}

fn embedded_specs() -> Result<Vec<ToolSpec>, SpecError> {
    let mut specs = Vec::with_capacity(TOOL_YAML_FILES.len());
    for (i, yaml) in TOOL_YAML_FILES.iter().enumerate() {
        let spec: ToolSpec = serde_yaml::from_str(yaml).map_err(|e| SpecError::Parse {
            name: format!("embedded_{i}"),
            message: e.to_string(),
        })?;
        specs.push(spec);
    }
    Ok(specs)
}

/// Loads spec overrides from a deployment `tools.yaml` (a YAML list of specs).
pub fn load_spec_overrides(path: &Path) -> Result<Vec<ToolSpec>, SpecError> {
    let raw = std::fs::read_to_string(path).map_err(|e| SpecError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_yaml::from_str(&raw).map_err(|e| SpecError::Parse {
        name: path.display().to_string(),
        message: e.to_string(),
    })
}

fn apply_overrides(
    registry: &mut ToolRegistry,
    overrides: Vec<ToolSpec>,
    strict: bool,
) -> Result<(), SpecError> {
    for spec in overrides {
        match registry.get(&spec.name) {
            Some(inner) => {
                registry.register(Arc::new(SpecOverrideTool { inner, spec }));
            }
            None if strict => return Err(SpecError::UnknownTool(spec.name)),
            None => debug!(tool = %spec.name, "spec override for unregistered tool, skipping"),
        }
    }
    Ok(())
}

/// Builds the base registry: builtin tools with embedded YAML specs applied,
/// plus optional deployment overrides from `tools_yaml`. The result is the
/// immutable template the factory clones per request.
pub fn build_base_registry(tools_yaml: Option<&Path>) -> Result<ToolRegistry, SpecError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(WebFetchTool::new()));
    registry.register(Arc::new(ShellTool::new()));
    registry.register(Arc::new(CurrentTimeTool::new()));

    apply_overrides(&mut registry, embedded_specs()?, true)?;

    if let Some(path) = tools_yaml {
        let overrides = load_spec_overrides(path)?;
        apply_overrides(&mut registry, overrides, true)?;
    }
    Ok(registry)
}

/// Permission map helper: `(name → allowed)` from persisted rows.
pub fn permission_map(rows: impl IntoIterator<Item = (String, bool)>) -> HashMap<String, bool> {
    rows.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_yaml_parses_and_covers_builtins() {
        let specs = embedded_specs().expect("tools/*.yaml must parse");
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"web_fetch"), "expected web_fetch in {names:?}");
        assert!(names.contains(&"shell"), "expected shell in {names:?}");
        assert!(names.contains(&"current_time"));
    }

    #[test]
    fn base_registry_keeps_yaml_confirmation_flag() {
        let registry = build_base_registry(None).unwrap();
        let shell = registry.get("shell").unwrap();
        assert!(shell.spec().requires_confirmation);
        let fetch = registry.get("web_fetch").unwrap();
        assert!(!fetch.spec().requires_confirmation);
    }

    #[test]
    fn deployment_override_for_unknown_tool_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.yaml");
        std::fs::write(
            &path,
            "- name: nonexistent\n  input_schema:\n    type: object\n",
        )
        .unwrap();
        let err = build_base_registry(Some(&path)).unwrap_err();
        assert!(matches!(err, SpecError::UnknownTool(_)));
    }

    #[test]
    fn deployment_override_changes_description() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.yaml");
        std::fs::write(
            &path,
            concat!(
                "- name: current_time\n",
                "  description: site-local clock\n",
                "  input_schema:\n",
                "    type: object\n",
            ),
        )
        .unwrap();
        let registry = build_base_registry(Some(&path)).unwrap();
        let spec = registry.get("current_time").unwrap().spec();
        assert_eq!(spec.description.as_deref(), Some("site-local clock"));
    }
}
