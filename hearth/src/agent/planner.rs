//! Planner: stream-prompt the LLM into a structured plan.
//!
//! Intermediate tokens surface as `thinking` events; the final text is parsed
//! once the stream ends. Parsing is retried up to twice, feeding the parse
//! error back into the prompt, before failing with a plan-parse validation
//! error.

use std::sync::Arc;

use tracing::debug;

use agent_stream::{AgentEvent, EventSink};

use crate::error::{codes, CoreError};
use crate::llm::{profiles, LlmGateway};
use crate::Message;

use super::{parse_plan, Plan};

const PARSE_RETRIES: u32 = 2;

pub struct Planner {
    gateway: Arc<dyn LlmGateway>,
}

impl Planner {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }

    fn system_prompt(
        tool_catalogue: &[(String, String)],
        skill_catalogue: &[(String, String)],
        preamble: Option<&str>,
    ) -> String {
        let mut prompt = String::from(
            "You are a planner for an assistant that executes plans step by step.\n\
             Produce a JSON object: {\"steps\": [...]}. Each step has:\n\
             - \"kind\": one of \"tool\", \"skill\", \"memory\", \"completion\"\n\
             - \"target\": tool or skill name (omit for memory and completion)\n\
             - \"args\": arguments object (for memory: {\"query\": ...})\n\
             - \"rationale\": short reason (optional)\n\
             Rules: the last step must be the only \"completion\" step; use only\n\
             the tools and skills listed below; prefer the fewest steps that\n\
             answer the request. Reply with the JSON object only.\n",
        );
        if let Some(preamble) = preamble {
            prompt.push('\n');
            prompt.push_str(preamble);
            prompt.push('\n');
        }
        prompt.push_str("\nTools:\n");
        if tool_catalogue.is_empty() {
            prompt.push_str("(none)\n");
        }
        for (name, description) in tool_catalogue {
            prompt.push_str(&format!("- {name}: {description}\n"));
        }
        prompt.push_str("\nSkills:\n");
        if skill_catalogue.is_empty() {
            prompt.push_str("(none)\n");
        }
        for (name, description) in skill_catalogue {
            prompt.push_str(&format!("- {name}: {description}\n"));
        }
        prompt
    }

    /// Produces a validated-parse plan for the request. `preamble` carries
    /// context such as the working directory and pinned files.
    pub async fn plan(
        &self,
        history: &[Message],
        prompt: &str,
        tool_catalogue: &[(String, String)],
        skill_catalogue: &[(String, String)],
        preamble: Option<&str>,
        events: &EventSink,
    ) -> Result<Plan, CoreError> {
        let system = Self::system_prompt(tool_catalogue, skill_catalogue, preamble);

        let mut messages: Vec<Message> = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system));
        messages.extend_from_slice(history);
        messages.push(Message::user(format!("Plan the steps for: {prompt}")));

        let mut last_error: Option<String> = None;
        for attempt in 0..=PARSE_RETRIES {
            if let Some(ref parse_error) = last_error {
                messages.push(Message::user(format!(
                    "The previous plan did not parse ({parse_error}). \
                     Reply again with only the JSON object."
                )));
            }

            let (tx, mut rx) = tokio::sync::mpsc::channel(16);
            let stream_fut = self
                .gateway
                .stream(profiles::PLANNER, &messages, None, Some(tx));
            let forward_fut = async {
                while let Some(delta) = rx.recv().await {
                    events
                        .emit(AgentEvent::Thinking {
                            text: delta.content,
                        })
                        .await;
                }
            };
            let (response, ()) = tokio::join!(stream_fut, forward_fut);
            let response = response.map_err(CoreError::from)?;

            match parse_plan(&response.content) {
                Ok(plan) => return Ok(plan),
                Err(e) => {
                    debug!(attempt, error = %e, "plan parse failed");
                    messages.push(Message::assistant(response.content));
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(CoreError::validation(
            codes::PLAN_PARSE,
            format!(
                "planner output did not parse after {} attempts: {}",
                PARSE_RETRIES + 1,
                last_error.unwrap_or_default()
            ),
        ))
    }
}
