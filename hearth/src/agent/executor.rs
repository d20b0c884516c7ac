//! Step execution: dispatch by kind, surface observations.
//!
//! The executor never classifies failures; it captures them on the
//! observation for the step supervisor. Confirmation-gated tools short-circuit
//! before invocation when the request carries no authorising token.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use agent_stream::{AgentEvent, EventSink};

use crate::error::{codes, CoreError};
use crate::llm::{profiles, LlmGateway};
use crate::memory::MemoryStore;
use crate::skills::SkillExecutor;
use crate::tools::{redact_args, ToolCallContext, ToolError, ToolRegistry};
use crate::Message;

use super::{Step, StepKind};

/// A tool is waiting for explicit user confirmation.
#[derive(Clone, Debug)]
pub struct ConfirmationRequest {
    pub tool: String,
    pub args_redacted: Value,
    pub token: String,
}

/// What one step produced. At most one of `error` / `confirmation` is set.
#[derive(Debug, Default)]
pub struct StepObservation {
    pub text: String,
    pub error: Option<CoreError>,
    pub confirmation: Option<ConfirmationRequest>,
}

impl StepObservation {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn failed(error: CoreError) -> Self {
        Self {
            text: error.to_string(),
            error: Some(error),
            confirmation: None,
        }
    }

    fn needs_confirmation(request: ConfirmationRequest) -> Self {
        Self {
            text: format!("tool '{}' requires confirmation", request.tool),
            error: None,
            confirmation: Some(request),
        }
    }
}

pub struct StepExecutor {
    registry: Arc<ToolRegistry>,
    skills: SkillExecutor,
    memory: MemoryStore,
    gateway: Arc<dyn LlmGateway>,
    tool_ctx: ToolCallContext,
    tool_timeout: Duration,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        skills: SkillExecutor,
        memory: MemoryStore,
        gateway: Arc<dyn LlmGateway>,
        tool_ctx: ToolCallContext,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            skills,
            memory,
            gateway,
            tool_ctx,
            tool_timeout,
        }
    }

    /// Executes one non-completion step.
    pub async fn execute(
        &self,
        step: &Step,
        history: &[Message],
        events: &EventSink,
    ) -> StepObservation {
        match step.kind {
            StepKind::Tool => self.execute_tool(step, events).await,
            StepKind::Skill => self.execute_skill(step, history, events).await,
            StepKind::Memory => self.execute_memory(step).await,
            StepKind::Completion => StepObservation::failed(CoreError::fatal(
                codes::STEP_ABORTED,
                "completion steps are driven by the service",
            )),
        }
    }

    async fn execute_tool(&self, step: &Step, events: &EventSink) -> StepObservation {
        let Some(target) = step.target.as_deref() else {
            return StepObservation::failed(CoreError::semantic(
                codes::TOOL_UNKNOWN,
                "tool step without target",
            ));
        };
        let Some(tool) = self.registry.get(target) else {
            return StepObservation::failed(CoreError::validation(
                codes::TOOL_UNKNOWN,
                format!("unknown tool: {target}"),
            ));
        };

        let spec = tool.spec();
        let mut args = if step.args.is_object() {
            step.args.clone()
        } else {
            Value::Object(Default::default())
        };
        self.tool_ctx.inject_params(&spec.context_params, &mut args);

        if spec.requires_confirmation && self.tool_ctx.confirmation_token.is_none() {
            return StepObservation::needs_confirmation(ConfirmationRequest {
                tool: target.to_string(),
                args_redacted: redact_args(&args),
                token: Uuid::new_v4().to_string(),
            });
        }

        events
            .emit(AgentEvent::ToolStart {
                index: step.index,
                tool: target.to_string(),
                args_redacted: redact_args(&args),
            })
            .await;

        let result = tokio::time::timeout(
            self.tool_timeout,
            tool.call(args, Some(&self.tool_ctx)),
        )
        .await;

        let (text, truncated, error) = match result {
            Ok(Ok(output)) => (output.text, output.truncated, None),
            Ok(Err(e)) => {
                let core = classify_tool_error(&e);
                (e.to_string(), false, Some(core))
            }
            Err(_) => {
                let core = CoreError::transient(
                    codes::STEP_TIMEOUT,
                    format!("tool '{target}' timed out after {:?}", self.tool_timeout),
                );
                (core.to_string(), false, Some(core))
            }
        };

        events
            .emit(AgentEvent::ToolOutput {
                index: step.index,
                tool: target.to_string(),
                text: text.clone(),
                truncated,
            })
            .await;

        StepObservation {
            text,
            error,
            confirmation: None,
        }
    }

    async fn execute_skill(
        &self,
        step: &Step,
        history: &[Message],
        events: &EventSink,
    ) -> StepObservation {
        let Some(target) = step.target.as_deref() else {
            return StepObservation::failed(CoreError::semantic(
                codes::SKILL_UNKNOWN,
                "skill step without target",
            ));
        };
        match self
            .skills
            .execute(
                target,
                &step.args,
                history,
                &self.registry,
                &self.tool_ctx,
                events,
                step.index,
            )
            .await
        {
            Ok(run) => StepObservation::ok(run.output),
            Err(e) => StepObservation::failed(e),
        }
    }

    async fn execute_memory(&self, step: &Step) -> StepObservation {
        let Some(query) = step.args.get("query").and_then(|q| q.as_str()) else {
            return StepObservation::failed(CoreError::semantic(
                codes::MEMORY_UNAVAILABLE,
                "memory step without query",
            ));
        };
        let limit = step
            .args
            .get("limit")
            .and_then(|l| l.as_u64())
            .unwrap_or(5) as usize;
        let conversation_id = step
            .args
            .get("conversation_id")
            .and_then(|c| c.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        match self.memory.search(query, limit, conversation_id).await {
            Ok(hits) => StepObservation::ok(MemoryStore::format_hits(&hits)),
            Err(e) => StepObservation::failed(e.into()),
        }
    }

    /// Streams the final completion and returns the full assistant text.
    pub async fn execute_completion(
        &self,
        history: &[Message],
        events: &EventSink,
    ) -> Result<String, CoreError> {
        let mut messages: Vec<Message> = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(
            "Compose the final answer for the user from the conversation and \
             the step observations above. Answer directly and concisely.",
        ));
        messages.extend_from_slice(history);

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let stream_fut = self
            .gateway
            .stream(profiles::COMPOSER, &messages, None, Some(tx));
        let forward_fut = async {
            while let Some(delta) = rx.recv().await {
                events
                    .emit(AgentEvent::content_delta(delta.content))
                    .await;
            }
        };
        let (response, ()) = tokio::join!(stream_fut, forward_fut);
        let response = response.map_err(CoreError::from)?;
        Ok(response.content)
    }
}

fn classify_tool_error(error: &ToolError) -> CoreError {
    match error {
        ToolError::Timeout(d) => {
            CoreError::transient(codes::STEP_TIMEOUT, format!("timed out after {d:?}"))
        }
        ToolError::Transport(m) => CoreError::transient(codes::TOOL_FAILED, m.clone()),
        ToolError::Unknown(name) => {
            CoreError::validation(codes::TOOL_UNKNOWN, format!("unknown tool: {name}"))
        }
        ToolError::InvalidInput(m) => CoreError::semantic(codes::TOOL_FAILED, m.clone()),
        ToolError::Execution(m) => CoreError::semantic(codes::TOOL_FAILED, m.clone()),
    }
}
