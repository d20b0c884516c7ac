//! System-wide error taxonomy.
//!
//! Module boundaries keep their own `thiserror` enums (tool, store, gateway,
//! session errors); everything that crosses the pipeline or reaches an event
//! stream is classified into [`CoreError`]. Codes are stable across revisions;
//! messages are human-readable and must not contain secrets.

use thiserror::Error;

use agent_stream::AgentEvent;

/// Stable error codes surfaced in `error` events.
pub mod codes {
    pub const AUTH_MISSING_TOKEN: &str = "AUTH_MISSING_TOKEN";
    pub const AUTH_EXPIRED_TOKEN: &str = "AUTH_EXPIRED_TOKEN";
    pub const PLAN_INVALID: &str = "PLAN_INVALID";
    pub const PLAN_PARSE: &str = "PLAN_PARSE";
    pub const STEP_ABORTED: &str = "STEP_ABORTED";
    pub const STEP_TIMEOUT: &str = "STEP_TIMEOUT";
    pub const TOOL_UNKNOWN: &str = "TOOL_UNKNOWN";
    pub const TOOL_FAILED: &str = "TOOL_FAILED";
    pub const SKILL_UNKNOWN: &str = "SKILL_UNKNOWN";
    pub const GATEWAY_UNAVAILABLE: &str = "GATEWAY_UNAVAILABLE";
    pub const GATEWAY_REJECTED: &str = "GATEWAY_REJECTED";
    pub const MEMORY_UNAVAILABLE: &str = "MEMORY_UNAVAILABLE";
    pub const MCP_UNAVAILABLE: &str = "MCP_UNAVAILABLE";
    pub const PERSISTENCE_WRITE: &str = "PERSISTENCE_WRITE";
    pub const CONFIG_MISSING: &str = "CONFIG_MISSING";
    pub const CANCELLED: &str = "CANCELLED";
}

/// Classified failure. The variant is the recovery class; the code pins the
/// concrete condition for callers.
#[derive(Clone, Debug, Error)]
pub enum CoreError {
    /// Upstream timeout, rate limit, 5xx, network flake. Retry-eligible.
    #[error("{message}")]
    Transient { code: &'static str, message: String },
    /// Wrong tool, wrong arguments, off-intent output. Replan-eligible.
    #[error("{message}")]
    Semantic { code: &'static str, message: String },
    /// Missing or expired credential, context-level denial. Aborts.
    #[error("{message}")]
    Authorisation { code: &'static str, message: String },
    /// Plan parse failure, unknown tool/skill, malformed schema.
    #[error("{message}")]
    Validation { code: &'static str, message: String },
    /// Data-model corruption, persistence write failure, missing config.
    #[error("{message}")]
    Fatal { code: &'static str, message: String },
    /// Caller cancelled; terminal.
    #[error("request cancelled")]
    Cancelled,
}

impl CoreError {
    pub fn transient(code: &'static str, message: impl Into<String>) -> Self {
        CoreError::Transient {
            code,
            message: message.into(),
        }
    }

    pub fn semantic(code: &'static str, message: impl Into<String>) -> Self {
        CoreError::Semantic {
            code,
            message: message.into(),
        }
    }

    pub fn authorisation(code: &'static str, message: impl Into<String>) -> Self {
        CoreError::Authorisation {
            code,
            message: message.into(),
        }
    }

    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        CoreError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn fatal(code: &'static str, message: impl Into<String>) -> Self {
        CoreError::Fatal {
            code,
            message: message.into(),
        }
    }

    /// Missing OAuth token for a provider; the message points the user at the
    /// provider so the condition is actionable.
    pub fn missing_token(provider: &str) -> Self {
        CoreError::authorisation(
            codes::AUTH_MISSING_TOKEN,
            format!("no OAuth token for provider '{provider}'"),
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Transient { code, .. }
            | CoreError::Semantic { code, .. }
            | CoreError::Authorisation { code, .. }
            | CoreError::Validation { code, .. }
            | CoreError::Fatal { code, .. } => code,
            CoreError::Cancelled => codes::CANCELLED,
        }
    }

    /// Advisory for callers: only transient failures are worth re-issuing.
    pub fn retryable(&self) -> bool {
        matches!(self, CoreError::Transient { .. })
    }

    /// The terminal `error` event for this failure.
    pub fn to_event(&self) -> AgentEvent {
        AgentEvent::Error {
            code: self.code().to_string(),
            message: self.to_string(),
            retryable: self.retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_on_events() {
        let err = CoreError::missing_token("github");
        match err.to_event() {
            AgentEvent::Error {
                code,
                message,
                retryable,
            } => {
                assert_eq!(code, codes::AUTH_MISSING_TOKEN);
                assert!(message.contains("github"));
                assert!(!retryable);
            }
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(CoreError::transient(codes::STEP_TIMEOUT, "t").retryable());
        assert!(!CoreError::semantic(codes::PLAN_INVALID, "s").retryable());
        assert!(!CoreError::Cancelled.retryable());
    }
}
