//! Agent service: one agentic request from plan to terminal event.
//!
//! Owns the replan/retry budgets and the event stream for the request.
//! History is persisted exactly once per role turn; a dropped receiver is the
//! cancellation signal and stops the pipeline at the next emission point
//! without persisting the assistant turn.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use agent_stream::{AgentEvent, EventSink};

use crate::config::CoreConfig;
use crate::error::{codes, CoreError};
use crate::llm::LlmGateway;
use crate::memory::MemoryStore;
use crate::persistence::{Context, Conversation, Database, StoredMessage};
use crate::skills::{SkillExecutor, SkillRegistry};
use crate::tools::{ToolCallContext, ToolRegistry};
use crate::Message;

use super::{
    Plan, PlanSupervisor, PlanVerdict, Planner, Step, StepExecutor, StepKind, StepOutcome,
    StepSupervisor,
};

/// One agentic request.
#[derive(Clone, Debug)]
pub struct AgentRequest {
    pub prompt: String,
    /// Authorising token from a previous `confirmation_required` round-trip.
    pub confirmation_token: Option<String>,
}

/// Per-request service; built by the factory, never shared across requests.
pub struct AgentService {
    context: Context,
    conversation: Conversation,
    registry: Arc<ToolRegistry>,
    skills: Arc<SkillRegistry>,
    memory: MemoryStore,
    gateway: Arc<dyn LlmGateway>,
    db: Arc<dyn Database>,
    config: CoreConfig,
}

impl AgentService {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        context: Context,
        conversation: Conversation,
        registry: ToolRegistry,
        skills: Arc<SkillRegistry>,
        memory: MemoryStore,
        gateway: Arc<dyn LlmGateway>,
        db: Arc<dyn Database>,
        config: CoreConfig,
    ) -> Self {
        Self {
            context,
            conversation,
            registry: Arc::new(registry),
            skills,
            memory,
            gateway,
            db,
            config,
        }
    }

    /// The effective tool registry for this request (base clone, permission
    /// filtered, MCP tools attached).
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn planner_preamble(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(dir) = self
            .conversation
            .working_dir
            .as_deref()
            .or(self.context.default_working_dir.as_deref())
        {
            parts.push(format!("Working directory: {dir}"));
        }
        if !self.context.pinned_files.is_empty() {
            parts.push(format!(
                "Pinned files: {}",
                self.context.pinned_files.join(", ")
            ));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    fn tool_context(&self, request: &AgentRequest) -> ToolCallContext {
        let mut ctx = ToolCallContext::new(self.context.id, self.conversation.id)
            .with_db(Arc::clone(&self.db));
        if let Some(dir) = self
            .conversation
            .working_dir
            .as_deref()
            .or(self.context.default_working_dir.as_deref())
        {
            ctx = ctx.with_working_dir(dir);
        }
        if let Some(ref token) = request.confirmation_token {
            ctx = ctx.with_confirmation_token(token.clone());
        }
        ctx
    }

    async fn persist(&self, role: &str, content: &str) -> Result<(), CoreError> {
        self.db
            .append_message(&StoredMessage::new(self.conversation.id, role, content))
            .await
            .map_err(CoreError::from)
    }

    async fn emit_error(&self, events: &EventSink, error: &CoreError) {
        events.emit(error.to_event()).await;
    }

    async fn close_with_answer(
        &self,
        events: &EventSink,
        history: &[Message],
        answer: String,
    ) -> Result<(), CoreError> {
        if events.is_closed().await {
            return Err(CoreError::Cancelled);
        }
        self.persist("assistant", &answer).await?;

        let mut messages: Vec<serde_json::Value> = history
            .iter()
            .map(|m| serde_json::to_value(m).unwrap_or(json!(null)))
            .collect();
        messages.push(json!({"role": "assistant", "content": answer}));

        events.emit(AgentEvent::HistorySnapshot { messages }).await;
        events.emit(AgentEvent::content_finished()).await;
        Ok(())
    }

    /// Runs the request to completion, emitting every event on `events`.
    /// Always terminates the stream with a terminal content or an error.
    pub async fn handle(&self, request: AgentRequest, events: EventSink) {
        let mut history: Vec<Message> = match self
            .db
            .fetch_recent_messages(self.conversation.id, self.config.history_window_messages)
            .await
        {
            Ok(rows) => rows
                .iter()
                .map(|m| Message::from_role_content(&m.role, m.content.clone()))
                .collect(),
            Err(e) => {
                self.emit_error(&events, &CoreError::from(e)).await;
                return;
            }
        };

        if !events
            .emit(AgentEvent::Thinking {
                text: "planning".to_string(),
            })
            .await
        {
            return;
        }

        let planner = Planner::new(Arc::clone(&self.gateway));
        let step_supervisor = StepSupervisor::new(Arc::clone(&self.gateway));
        let skill_executor = SkillExecutor::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.skills),
            self.config.default_skill_turns,
        );
        let executor = StepExecutor::new(
            Arc::clone(&self.registry),
            skill_executor,
            self.memory.clone(),
            Arc::clone(&self.gateway),
            self.tool_context(&request),
            self.config.tool_timeout,
        );

        let tool_catalogue: Vec<(String, String)> = self
            .registry
            .list()
            .into_iter()
            .map(|s| (s.name, s.description.unwrap_or_default()))
            .collect();
        let skill_catalogue = self.skills.catalogue();
        let preamble = self.planner_preamble();

        let mut replans_used: u32 = 0;
        let mut force_continue = false;

        'replan: loop {
            let plan = if force_continue {
                Plan::completion_only()
            } else {
                match planner
                    .plan(
                        &history,
                        &request.prompt,
                        &tool_catalogue,
                        &skill_catalogue,
                        preamble.as_deref(),
                        &events,
                    )
                    .await
                {
                    Ok(plan) => plan,
                    Err(e) => {
                        self.emit_error(&events, &e).await;
                        return;
                    }
                }
            };

            if !force_continue {
                if let PlanVerdict::Invalid(reason) =
                    PlanSupervisor::validate(&plan, &self.registry, &self.skills)
                {
                    debug!(reason = %reason, "plan rejected");
                    if replans_used < self.config.max_replans {
                        replans_used += 1;
                        history.push(Message::system(format!(
                            "The previous plan was rejected: {reason}. Produce a corrected plan."
                        )));
                        events
                            .emit(AgentEvent::Thinking {
                                text: "replanning".to_string(),
                            })
                            .await;
                        continue 'replan;
                    }
                    self.emit_error(
                        &events,
                        &CoreError::validation(
                            codes::PLAN_INVALID,
                            format!("plan rejected after replan budget: {reason}"),
                        ),
                    )
                    .await;
                    return;
                }
            }

            if !events
                .emit(AgentEvent::Plan {
                    steps: plan.views(),
                })
                .await
            {
                return;
            }

            let mut index = 0;
            let mut retries_this_step: u32 = 0;
            while index < plan.steps.len() {
                let step: &Step = &plan.steps[index];
                if retries_this_step == 0
                    && !events
                        .emit(AgentEvent::StepStart {
                            index: step.index,
                            kind: step.kind.as_str().to_string(),
                            target: step.target.clone(),
                        })
                        .await
                {
                    return;
                }

                if step.kind == StepKind::Completion {
                    match executor.execute_completion(&history, &events).await {
                        Ok(answer) => match self.close_with_answer(&events, &history, answer).await
                        {
                            Ok(()) => {
                                info!(conversation = %self.conversation.id, "agentic request completed");
                            }
                            Err(CoreError::Cancelled) => {
                                debug!("request cancelled before persist");
                            }
                            Err(e) => self.emit_error(&events, &e).await,
                        },
                        Err(e) => self.emit_error(&events, &e).await,
                    }
                    return;
                }

                let observation = executor.execute(step, &history, &events).await;

                if let Some(confirmation) = observation.confirmation {
                    let summary = format!(
                        "Pending confirmation {}: tool '{}' awaits approval with arguments {}",
                        confirmation.token, confirmation.tool, confirmation.args_redacted
                    );
                    if let Err(e) = self.persist("system", &summary).await {
                        self.emit_error(&events, &e).await;
                        return;
                    }
                    events
                        .emit(AgentEvent::ConfirmationRequired {
                            tool: confirmation.tool,
                            args_redacted: confirmation.args_redacted,
                            token_to_confirm: confirmation.token,
                        })
                        .await;
                    events.emit(AgentEvent::content_finished()).await;
                    return;
                }

                let outcome = step_supervisor.classify(step, &observation).await;
                // Once the retry budget is spent, any further transient
                // failure maps to a replan rather than a second retry.
                let outcome = match outcome {
                    StepOutcome::Retry { feedback }
                        if retries_this_step >= self.config.max_retries_per_step =>
                    {
                        StepOutcome::Replan { feedback }
                    }
                    other => other,
                };

                match outcome {
                    StepOutcome::Success { observation } => {
                        history.push(Message::tool(observation));
                        index += 1;
                        retries_this_step = 0;
                    }
                    StepOutcome::Retry { feedback } => {
                        retries_this_step += 1;
                        debug!(step = index, feedback = %feedback, "retrying step");
                        history.push(Message::system(format!(
                            "Step {index} failed transiently: {feedback}. Retrying once."
                        )));
                    }
                    StepOutcome::Replan { feedback } => {
                        if replans_used < self.config.max_replans {
                            replans_used += 1;
                            history.push(Message::system(format!(
                                "Step {index} needs a different approach: {feedback}"
                            )));
                            events
                                .emit(AgentEvent::Thinking {
                                    text: "replanning".to_string(),
                                })
                                .await;
                        } else {
                            // Replan budget exhausted: force a final answer
                            // from what is known instead of stalling.
                            force_continue = true;
                            history.push(Message::system(
                                "Budgets exhausted; compose the best final answer from the observations so far.",
                            ));
                        }
                        continue 'replan;
                    }
                    StepOutcome::Abort { error } => {
                        self.emit_error(&events, &error).await;
                        return;
                    }
                }
            }

            // A validated plan always ends in a completion step, which
            // returns above; reaching here means the plan was empty.
            self.emit_error(
                &events,
                &CoreError::validation(codes::PLAN_INVALID, "plan had no completion step"),
            )
            .await;
            return;
        }
    }

    pub fn context_id(&self) -> Uuid {
        self.context.id
    }
}
