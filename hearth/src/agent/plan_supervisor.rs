//! Plan validation against the request's effective registries.
//!
//! Pure checks, no LLM: targets exist, the final step is the only completion,
//! and arguments satisfy the target schema's required fields (contextual
//! parameters are excluded, the executor injects those).

use serde_json::Value;

use crate::skills::SkillRegistry;
use crate::tools::{ToolRegistry, ToolSpec};

use super::{Plan, StepKind};

#[derive(Clone, Debug, PartialEq)]
pub enum PlanVerdict {
    Valid,
    Invalid(String),
}

pub struct PlanSupervisor;

impl PlanSupervisor {
    pub fn validate(plan: &Plan, tools: &ToolRegistry, skills: &SkillRegistry) -> PlanVerdict {
        if plan.steps.is_empty() {
            return PlanVerdict::Invalid("plan has no steps".to_string());
        }

        let last = plan.steps.len() - 1;
        for (i, step) in plan.steps.iter().enumerate() {
            match step.kind {
                StepKind::Completion => {
                    if i != last {
                        return PlanVerdict::Invalid(format!(
                            "completion step at index {i} before the end"
                        ));
                    }
                }
                StepKind::Tool => {
                    let Some(target) = step.target.as_deref() else {
                        return PlanVerdict::Invalid(format!("tool step {i} has no target"));
                    };
                    let Some(tool) = tools.get(target) else {
                        return PlanVerdict::Invalid(format!("unknown tool: {target}"));
                    };
                    if let Err(reason) = check_args(&step.args, &tool.spec()) {
                        return PlanVerdict::Invalid(format!("step {i} ({target}): {reason}"));
                    }
                }
                StepKind::Skill => {
                    let Some(target) = step.target.as_deref() else {
                        return PlanVerdict::Invalid(format!("skill step {i} has no target"));
                    };
                    if !skills.contains(target) {
                        return PlanVerdict::Invalid(format!("unknown skill: {target}"));
                    }
                }
                StepKind::Memory => {
                    if step.args.get("query").and_then(|q| q.as_str()).is_none() {
                        return PlanVerdict::Invalid(format!(
                            "memory step {i} has no string query"
                        ));
                    }
                }
            }
        }

        if plan.steps[last].kind != StepKind::Completion {
            return PlanVerdict::Invalid("last step is not a completion".to_string());
        }
        PlanVerdict::Valid
    }
}

/// Structural argument check: `args` must be an object carrying every field
/// the schema requires, except those the executor injects.
fn check_args(args: &Value, spec: &ToolSpec) -> Result<(), String> {
    let Some(args_obj) = args.as_object() else {
        return Err("arguments are not an object".to_string());
    };
    let required = spec
        .input_schema
        .get("required")
        .and_then(|r| r.as_array())
        .cloned()
        .unwrap_or_default();
    for field in required {
        let Some(name) = field.as_str() else { continue };
        if spec.context_params.iter().any(|p| p == name) {
            continue;
        }
        if !args_obj.contains_key(name) {
            return Err(format!("missing required argument '{name}'"));
        }
    }
    Ok(())
}
