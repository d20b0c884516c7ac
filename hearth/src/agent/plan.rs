//! Plan and step types, plus parsing of the planner's structured output.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use agent_stream::PlanStepView;

use crate::error::CoreError;

/// What a step does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Tool,
    Skill,
    Memory,
    Completion,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Tool => "tool",
            StepKind::Skill => "skill",
            StepKind::Memory => "memory",
            StepKind::Completion => "completion",
        }
    }
}

/// One unit of execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub index: usize,
    pub kind: StepKind,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default = "empty_object")]
    pub args: Value,
    #[serde(default)]
    pub rationale: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Step {
    pub fn completion() -> Self {
        Step {
            index: 0,
            kind: StepKind::Completion,
            target: None,
            args: empty_object(),
            rationale: None,
        }
    }

    pub fn to_view(&self) -> PlanStepView {
        PlanStepView {
            index: self.index,
            kind: self.kind.as_str().to_string(),
            target: self.target.clone(),
            args: self.args.clone(),
            rationale: self.rationale.clone(),
        }
    }
}

/// Ordered steps; the supervisor guarantees the last is a completion.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    /// The completion-only plan used to force a final answer after replan
    /// exhaustion.
    pub fn completion_only() -> Self {
        Plan {
            steps: vec![Step::completion()],
        }
    }

    pub fn views(&self) -> Vec<PlanStepView> {
        self.steps.iter().map(Step::to_view).collect()
    }
}

/// Classified result of one non-completion step.
#[derive(Clone, Debug)]
pub enum StepOutcome {
    /// Final observation; appended to history as a tool turn.
    Success { observation: String },
    /// Transient failure; re-execute the same step once with feedback.
    Retry { feedback: String },
    /// Semantic failure; feed back to the planner.
    Replan { feedback: String },
    /// Unrecoverable; surface and stop.
    Abort { error: CoreError },
}

#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("no JSON object in planner output")]
    NoJson,
    #[error("plan JSON: {0}")]
    Json(String),
    #[error("plan has no steps")]
    Empty,
}

/// Extracts the JSON object from planner output that may be wrapped in code
/// fences or prose, and parses it into a [`Plan`] with indices assigned.
pub fn parse_plan(text: &str) -> Result<Plan, PlanParseError> {
    let start = text.find('{').ok_or(PlanParseError::NoJson)?;
    let end = text.rfind('}').ok_or(PlanParseError::NoJson)?;
    if end < start {
        return Err(PlanParseError::NoJson);
    }

    let mut plan: Plan = serde_json::from_str(&text[start..=end])
        .map_err(|e| PlanParseError::Json(e.to_string()))?;
    if plan.steps.is_empty() {
        return Err(PlanParseError::Empty);
    }
    for (i, step) in plan.steps.iter_mut().enumerate() {
        step.index = i;
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fenced_plan_and_assigns_indices() {
        let text = concat!(
            "Here is the plan:\n```json\n",
            r#"{"steps":[{"kind":"tool","target":"web_fetch","args":{"url":"https://example.org"}},"#,
            r#"{"kind":"completion"}]}"#,
            "\n```\n"
        );
        let plan = parse_plan(text).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].index, 0);
        assert_eq!(plan.steps[0].kind, StepKind::Tool);
        assert_eq!(plan.steps[0].target.as_deref(), Some("web_fetch"));
        assert_eq!(plan.steps[1].index, 1);
        assert_eq!(plan.steps[1].kind, StepKind::Completion);
        assert_eq!(plan.steps[1].args, json!({}));
    }

    #[test]
    fn rejects_output_without_json() {
        assert!(matches!(
            parse_plan("I could not produce a plan."),
            Err(PlanParseError::NoJson)
        ));
    }

    #[test]
    fn rejects_empty_steps() {
        assert!(matches!(
            parse_plan(r#"{"steps":[]}"#),
            Err(PlanParseError::Empty)
        ));
    }

    #[test]
    fn completion_only_plan_is_one_completion_step() {
        let plan = Plan::completion_only();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].kind, StepKind::Completion);
    }
}
