//! Protocol-level event types: `kind` tag + payload.
//!
//! One variant per event kind an agent run can emit. Payload fields use
//! `serde_json::Value` where the shape is owned by the producer (step
//! arguments, redacted tool arguments, history messages).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One plan step as it appears inside a `plan` event payload.
///
/// `kind` is the step kind as a string (`tool` | `skill` | `memory` |
/// `completion`) so this crate stays independent of the core's step types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanStepView {
    pub index: usize,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub args: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Protocol event: wire shape for one stream event (`kind` tag + `payload`
/// object). The envelope (`seq`, `request_id`) is applied separately by the
/// sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Free-form progress text from the planner or supervisors.
    Thinking { text: String },
    /// A full plan accepted for execution.
    Plan { steps: Vec<PlanStepView> },
    /// A step is about to execute.
    StepStart {
        index: usize,
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    /// A tool invocation is starting; arguments are redacted.
    ToolStart {
        index: usize,
        tool: String,
        args_redacted: Value,
    },
    /// A tool produced output.
    ToolOutput {
        index: usize,
        tool: String,
        text: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        truncated: bool,
    },
    /// Activity inside a skill's worker loop.
    SkillActivity {
        index: usize,
        skill: String,
        phase: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// Assistant token delta. The terminal content event has an empty delta
    /// and `finish: "stop"`.
    Content {
        delta: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish: Option<String>,
    },
    /// Classified failure; closes the stream.
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
    /// Final snapshot of the persisted conversation turns for this request.
    HistorySnapshot { messages: Vec<Value> },
    /// A tool requires explicit confirmation before it may run.
    ConfirmationRequired {
        tool: String,
        args_redacted: Value,
        token_to_confirm: String,
    },
}

impl AgentEvent {
    /// Terminal `content` event: empty delta + `finish: "stop"`.
    pub fn content_finished() -> Self {
        AgentEvent::Content {
            delta: String::new(),
            finish: Some("stop".to_string()),
        }
    }

    /// Non-terminal content delta.
    pub fn content_delta(delta: impl Into<String>) -> Self {
        AgentEvent::Content {
            delta: delta.into(),
            finish: None,
        }
    }

    /// The `kind` tag this event serializes with.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AgentEvent::Thinking { .. } => "thinking",
            AgentEvent::Plan { .. } => "plan",
            AgentEvent::StepStart { .. } => "step_start",
            AgentEvent::ToolStart { .. } => "tool_start",
            AgentEvent::ToolOutput { .. } => "tool_output",
            AgentEvent::SkillActivity { .. } => "skill_activity",
            AgentEvent::Content { .. } => "content",
            AgentEvent::Error { .. } => "error",
            AgentEvent::HistorySnapshot { .. } => "history_snapshot",
            AgentEvent::ConfirmationRequired { .. } => "confirmation_required",
        }
    }

    /// True for the two stream-closing events: the terminal content marker and
    /// `error`.
    pub fn is_terminal(&self) -> bool {
        match self {
            AgentEvent::Content { finish, .. } => finish.is_some(),
            AgentEvent::Error { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_serializes_with_kind_tag_and_payload() {
        let v = serde_json::to_value(AgentEvent::content_delta("hi")).unwrap();
        assert_eq!(v["kind"], "content");
        assert_eq!(v["payload"]["delta"], "hi");
        assert!(v["payload"].get("finish").is_none());
    }

    #[test]
    fn terminal_content_carries_finish_stop() {
        let ev = AgentEvent::content_finished();
        assert!(ev.is_terminal());
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["payload"]["finish"], "stop");
        assert_eq!(v["payload"]["delta"], "");
    }

    #[test]
    fn error_is_terminal_and_tagged() {
        let ev = AgentEvent::Error {
            code: "CANCELLED".into(),
            message: "caller cancelled".into(),
            retryable: false,
        };
        assert!(ev.is_terminal());
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["kind"], "error");
        assert_eq!(v["payload"]["retryable"], false);
    }

    #[test]
    fn plan_step_omits_absent_target_and_rationale() {
        let ev = AgentEvent::Plan {
            steps: vec![PlanStepView {
                index: 0,
                kind: "completion".into(),
                target: None,
                args: json!({}),
                rationale: None,
            }],
        };
        let v = serde_json::to_value(&ev).unwrap();
        let step = &v["payload"]["steps"][0];
        assert!(step.get("target").is_none());
        assert!(step.get("rationale").is_none());
        assert_eq!(step["kind"], "completion");
    }

    #[test]
    fn kind_names_match_serde_tags() {
        let ev = AgentEvent::Thinking {
            text: "planning".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["kind"], ev.kind_name());
    }
}
