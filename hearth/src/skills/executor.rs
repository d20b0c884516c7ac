//! Skill executor: bounded tool-calling worker loop over a scoped registry
//! view.
//!
//! The scoped view is the security seam: it holds the intersection of the
//! skill's declared tools and the request's permission-filtered clone. A tool
//! name the LLM emits outside that view produces a synthetic tool-role error
//! message and the loop continues; the tool is never invoked.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use agent_stream::{AgentEvent, EventSink};

use crate::error::{codes, CoreError};
use crate::llm::LlmGateway;
use crate::tools::{ToolCallContext, ToolRegistry};
use crate::Message;

use super::SkillRegistry;

/// Default profile for skills that do not name one.
const DEFAULT_SKILL_PROFILE: &str = "composer";

/// Outcome of one skill run.
#[derive(Clone, Debug)]
pub struct SkillRun {
    pub output: String,
    pub turns_used: u32,
    /// True when the loop hit its budget without a final text answer; the
    /// output is then the concatenated tool results with an annotation.
    pub reached_budget: bool,
}

pub struct SkillExecutor {
    gateway: Arc<dyn LlmGateway>,
    skills: Arc<SkillRegistry>,
    default_turns: u32,
}

impl SkillExecutor {
    pub fn new(gateway: Arc<dyn LlmGateway>, skills: Arc<SkillRegistry>, default_turns: u32) -> Self {
        Self {
            gateway,
            skills,
            default_turns,
        }
    }

    /// Runs one skill to completion or budget exhaustion.
    ///
    /// `registry` is the request's permission-filtered clone; `step_index` and
    /// `events` feed `skill_activity` emission.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        skill_name: &str,
        args: &Value,
        history: &[Message],
        registry: &ToolRegistry,
        tool_ctx: &ToolCallContext,
        events: &EventSink,
        step_index: usize,
    ) -> Result<SkillRun, CoreError> {
        let skill = self.skills.get(skill_name).ok_or_else(|| {
            CoreError::validation(codes::SKILL_UNKNOWN, format!("unknown skill: {skill_name}"))
        })?;

        let scoped = registry.scoped(&skill.tools);
        let scoped_specs = scoped.list();
        let profile = skill.profile.as_deref().unwrap_or(DEFAULT_SKILL_PROFILE);
        let max_turns = skill.max_turns.unwrap_or(self.default_turns).max(1);

        events
            .emit(AgentEvent::SkillActivity {
                index: step_index,
                skill: skill.name.clone(),
                phase: "start".to_string(),
                text: None,
            })
            .await;

        let mut messages: Vec<Message> = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(skill.render(args)));
        messages.extend_from_slice(history);

        let mut tool_outputs: Vec<String> = Vec::new();

        for turn in 0..max_turns {
            let response = self
                .gateway
                .complete(profile, &messages, Some(&scoped_specs))
                .await
                .map_err(CoreError::from)?;

            if response.tool_calls.is_empty() {
                events
                    .emit(AgentEvent::SkillActivity {
                        index: step_index,
                        skill: skill.name.clone(),
                        phase: "finish".to_string(),
                        text: None,
                    })
                    .await;
                return Ok(SkillRun {
                    output: response.content,
                    turns_used: turn + 1,
                    reached_budget: false,
                });
            }

            if !response.content.is_empty() {
                messages.push(Message::assistant(response.content.clone()));
            }

            for call in response.tool_calls {
                events
                    .emit(AgentEvent::SkillActivity {
                        index: step_index,
                        skill: skill.name.clone(),
                        phase: "tool_call".to_string(),
                        text: Some(call.name.clone()),
                    })
                    .await;

                let Some(tool) = scoped.get(&call.name) else {
                    debug!(skill = %skill.name, tool = %call.name, "skill requested out-of-scope tool");
                    let refusal =
                        format!("tool '{}' not available in this skill", call.name);
                    messages.push(match call.id {
                        Some(ref id) => Message::tool_with_call_id(refusal, id.clone()),
                        None => Message::tool(refusal),
                    });
                    continue;
                };

                let mut call_args: Value =
                    serde_json::from_str(&call.arguments).unwrap_or(Value::Object(Default::default()));
                tool_ctx.inject_params(&tool.spec().context_params, &mut call_args);

                let result_text = match tool.call(call_args, Some(tool_ctx)).await {
                    Ok(output) => output.text,
                    Err(e) => format!("tool '{}' failed: {e}", call.name),
                };

                events
                    .emit(AgentEvent::SkillActivity {
                        index: step_index,
                        skill: skill.name.clone(),
                        phase: "tool_result".to_string(),
                        text: Some(truncate_for_event(&result_text)),
                    })
                    .await;

                tool_outputs.push(format!("[{}] {}", call.name, result_text));
                messages.push(match call.id {
                    Some(ref id) => Message::tool_with_call_id(result_text, id.clone()),
                    None => Message::tool(result_text),
                });
            }
        }

        events
            .emit(AgentEvent::SkillActivity {
                index: step_index,
                skill: skill.name.clone(),
                phase: "turn_budget".to_string(),
                text: None,
            })
            .await;

        let mut output = tool_outputs.join("\n");
        if output.is_empty() {
            output = "no tool output".to_string();
        }
        output.push_str("\n(reached turn budget)");
        Ok(SkillRun {
            output,
            turns_used: max_turns,
            reached_budget: true,
        })
    }
}

fn truncate_for_event(text: &str) -> String {
    const MAX: usize = 400;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}…")
    }
}
