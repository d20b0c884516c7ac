//! Deterministic name→tool lookup with cheap cloning and permission filtering.
//!
//! The base registry loaded at startup is never mutated after boot; the
//! factory clones it per request and filters the clone. Clones share the
//! `Arc<dyn Tool>` instances, so cloning never re-runs tool constructors.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::{Tool, ToolCallContext, ToolError, ToolOutput, ToolSpec};

/// Name→tool map. `Clone` is the shallow per-request clone: same tool values,
/// independent map.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its own name, replacing any previous entry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered names, sorted for deterministic prompts and logs.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Specs for every registered tool, sorted by name.
    pub fn list(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// Applies per-context permissions in place. Absent permission means
    /// allowed; an explicit `false` removes the entry. Idempotent.
    pub fn filter_by_permissions(&mut self, permissions: &HashMap<String, bool>) {
        self.tools
            .retain(|name, _| *permissions.get(name).unwrap_or(&true));
    }

    /// A view containing only the named tools that are present here. Used as
    /// the security seam for skill execution.
    pub fn scoped(&self, allowed: &[String]) -> ToolRegistry {
        let mut scoped = ToolRegistry::new();
        for name in allowed {
            if let Some(tool) = self.tools.get(name) {
                scoped.tools.insert(name.clone(), Arc::clone(tool));
            }
        }
        scoped
    }

    /// Looks up and invokes a tool.
    pub async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: Option<&ToolCallContext>,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        tool.call(args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedTool {
        name: String,
        reply: String,
    }

    #[async_trait]
    impl Tool for FixedTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec::new(self.name.clone(), json!({"type": "object"}))
        }

        async fn call(
            &self,
            _args: Value,
            _ctx: Option<&ToolCallContext>,
        ) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(self.reply.clone()))
        }
    }

    fn registry_with(names: &[&str]) -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        for n in names {
            reg.register(Arc::new(FixedTool {
                name: n.to_string(),
                reply: format!("{n} ran"),
            }));
        }
        reg
    }

    #[test]
    fn clone_is_independent_of_the_base() {
        let base = registry_with(&["a", "b"]);
        let mut clone = base.clone();
        clone.filter_by_permissions(&HashMap::from([("a".to_string(), false)]));
        assert!(!clone.contains("a"));
        assert!(base.contains("a"));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn empty_permission_map_filters_nothing() {
        let base = registry_with(&["a", "b"]);
        let mut clone = base.clone();
        clone.filter_by_permissions(&HashMap::new());
        assert_eq!(clone.names(), base.names());
    }

    #[test]
    fn filtering_is_idempotent() {
        let mut reg = registry_with(&["a", "b", "c"]);
        let perms = HashMap::from([("b".to_string(), false), ("c".to_string(), true)]);
        reg.filter_by_permissions(&perms);
        let after_first = reg.names();
        reg.filter_by_permissions(&perms);
        assert_eq!(reg.names(), after_first);
        assert_eq!(after_first, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn scoped_view_is_an_intersection() {
        let reg = registry_with(&["web_fetch", "shell"]);
        let scoped = reg.scoped(&[
            "web_fetch".to_string(),
            "web_search".to_string(), // declared but not present
        ]);
        assert!(scoped.contains("web_fetch"));
        assert!(!scoped.contains("web_search"));
        assert!(!scoped.contains("shell"));
    }

    #[tokio::test]
    async fn call_reports_unknown_tool() {
        let reg = registry_with(&["a"]);
        let err = reg.call("missing", json!({}), None).await.unwrap_err();
        assert!(matches!(err, ToolError::Unknown(_)));
    }
}
