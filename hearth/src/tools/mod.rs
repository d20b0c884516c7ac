//! Tools: the named callables exposed to the model.
//!
//! Each tool has a unique name, a [`ToolSpec`] (description, JSON schema for
//! arguments, category, confirmation flag, declared contextual parameters),
//! and the call logic. Tools are registered in a [`ToolRegistry`]; the base
//! registry built at startup is an immutable template and only clones are
//! filtered per request.

mod context;
mod registry;
mod shell;
mod specs;
mod time;
mod web_fetch;

pub use context::ToolCallContext;
pub use registry::ToolRegistry;
pub use shell::ShellTool;
pub use specs::{build_base_registry, load_spec_overrides, SpecError};
pub use time::CurrentTimeTool;
pub use web_fetch::WebFetchTool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Specification for one tool: what the model sees, plus execution metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema for the arguments object.
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// When set, the executor emits `confirmation_required` instead of
    /// invoking unless the request carries an authorising token.
    #[serde(default)]
    pub requires_confirmation: bool,
    /// Contextual argument names the executor resolves and injects (e.g.
    /// `working_dir`, `conversation_id`); never supplied by the model.
    #[serde(default)]
    pub context_params: Vec<String>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
            category: None,
            requires_confirmation: false,
            context_params: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Result of one tool invocation.
#[derive(Clone, Debug, Default)]
pub struct ToolOutput {
    pub text: String,
    pub truncated: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            truncated: false,
        }
    }
}

/// Errors from tool lookup or execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ToolError {
    /// Timeouts and transport failures are retry-eligible; the rest need a
    /// different plan.
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Transport(_) | ToolError::Timeout(_))
    }
}

/// A single tool callable by the LLM.
///
/// Instances may hold references to shared clients (HTTP, MCP) and must be
/// safe for concurrent invocation from multiple services sharing the same
/// base registry template.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name across the registry.
    fn name(&self) -> &str;

    /// Specification used for prompts, validation, and execution metadata.
    fn spec(&self) -> ToolSpec;

    /// Executes the tool. `args` has already had contextual parameters
    /// injected by the executor when the spec declares them.
    async fn call(
        &self,
        args: Value,
        ctx: Option<&ToolCallContext>,
    ) -> Result<ToolOutput, ToolError>;
}

/// Scrubs secret-bearing values from an arguments object before it is placed
/// in any event payload. Applies recursively; keys are matched
/// case-insensitively on common credential substrings.
pub fn redact_args(value: &Value) -> Value {
    const SENSITIVE: &[&str] = &["token", "secret", "password", "authorization", "api_key"];
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let lowered = k.to_lowercase();
                if SENSITIVE.iter().any(|s| lowered.contains(s)) {
                    out.insert(k.clone(), Value::String("[redacted]".to_string()));
                } else {
                    out.insert(k.clone(), redact_args(v));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_args).collect()),
        other => other.clone(),
    }
}
