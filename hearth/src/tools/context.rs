//! Context passed into tool calls for the current step.
//!
//! Built by the step executor before each invocation; tools that need the
//! current conversation or database read it here, and the executor uses it to
//! resolve declared contextual parameters. Tools that need nothing ignore it.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::persistence::Database;
use crate::Message;

/// Per-call context available to tools during execution.
#[derive(Clone, Default)]
pub struct ToolCallContext {
    /// Tenant the request runs under.
    pub context_id: Option<Uuid>,
    /// Conversation the request belongs to.
    pub conversation_id: Option<Uuid>,
    /// Working directory for tools that run against the filesystem.
    pub working_dir: Option<String>,
    /// Per-request database session.
    pub db: Option<Arc<dyn Database>>,
    /// Authorising token carried by a follow-up request after a
    /// `confirmation_required` round-trip.
    pub confirmation_token: Option<String>,
    /// Recent conversation turns, for tools that summarise or search them.
    pub recent_messages: Vec<Message>,
}

impl ToolCallContext {
    pub fn new(context_id: Uuid, conversation_id: Uuid) -> Self {
        Self {
            context_id: Some(context_id),
            conversation_id: Some(conversation_id),
            ..Default::default()
        }
    }

    pub fn with_db(mut self, db: Arc<dyn Database>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_confirmation_token(mut self, token: impl Into<String>) -> Self {
        self.confirmation_token = Some(token.into());
        self
    }

    /// Resolves one declared contextual parameter by name. Unknown names
    /// resolve to `None` and are left out of the injected arguments.
    pub fn resolve_param(&self, name: &str) -> Option<Value> {
        match name {
            "context_id" => self.context_id.map(|id| Value::String(id.to_string())),
            "conversation_id" => self.conversation_id.map(|id| Value::String(id.to_string())),
            "working_dir" => self.working_dir.clone().map(Value::String),
            _ => None,
        }
    }

    /// Injects every declared parameter that resolves into `args`, without
    /// overwriting values already present.
    pub fn inject_params(&self, declared: &[String], args: &mut Value) {
        let Some(obj) = args.as_object_mut() else {
            return;
        };
        for name in declared {
            if obj.contains_key(name) {
                continue;
            }
            if let Some(v) = self.resolve_param(name) {
                obj.insert(name.clone(), v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn injects_declared_params_without_overwriting() {
        let ctx = ToolCallContext::new(Uuid::new_v4(), Uuid::new_v4()).with_working_dir("/tmp/w");
        let mut args = json!({"command": "ls", "working_dir": "/explicit"});
        ctx.inject_params(
            &["working_dir".to_string(), "conversation_id".to_string()],
            &mut args,
        );
        assert_eq!(args["working_dir"], "/explicit");
        assert!(args["conversation_id"].is_string());
    }

    #[test]
    fn unknown_param_names_are_skipped() {
        let ctx = ToolCallContext::default();
        let mut args = json!({});
        ctx.inject_params(&["mystery".to_string()], &mut args);
        assert_eq!(args, json!({}));
    }
}
