//! Step supervision: classify each non-completion observation into a
//! [`StepOutcome`].
//!
//! Failures carried on the observation classify deterministically from the
//! error taxonomy; clean observations are judged by a short LLM call. Budget
//! tie-breaks (retry exhausted → replan, replans exhausted → force continue)
//! are applied by the service, which owns the counters.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::CoreError;
use crate::llm::{profiles, LlmGateway};
use crate::Message;

use super::executor::StepObservation;
use super::{Step, StepOutcome};

pub struct StepSupervisor {
    gateway: Arc<dyn LlmGateway>,
}

impl StepSupervisor {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }

    pub async fn classify(&self, step: &Step, observation: &StepObservation) -> StepOutcome {
        if let Some(ref error) = observation.error {
            return Self::classify_error(error);
        }
        self.consult(step, observation).await
    }

    fn classify_error(error: &CoreError) -> StepOutcome {
        match error {
            CoreError::Transient { .. } => StepOutcome::Retry {
                feedback: error.to_string(),
            },
            CoreError::Semantic { .. } | CoreError::Validation { .. } => StepOutcome::Replan {
                feedback: error.to_string(),
            },
            CoreError::Authorisation { .. } | CoreError::Fatal { .. } | CoreError::Cancelled => {
                StepOutcome::Abort {
                    error: error.clone(),
                }
            }
        }
    }

    async fn consult(&self, step: &Step, observation: &StepObservation) -> StepOutcome {
        let intent = step
            .rationale
            .clone()
            .or_else(|| step.target.clone())
            .unwrap_or_else(|| step.kind.as_str().to_string());

        let prompt = format!(
            "A plan step was executed.\n\
             Step intent: {intent}\n\
             Step arguments: {args}\n\
             Observation:\n{obs}\n\n\
             Did the observation satisfy the step's intent?\n\
             Reply with exactly one word: SUCCESS, RETRY (transient failure \
             worth one re-run), REPLAN (wrong approach, needs a new plan), or \
             ABORT (unrecoverable). Optionally add ': <feedback>' after the word.",
            args = step.args,
            obs = truncate(&observation.text, 2000),
        );

        let messages = [Message::user(prompt)];
        let response = match self
            .gateway
            .complete(profiles::SUPERVISOR, &messages, None)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "step supervisor unavailable, accepting observation");
                return StepOutcome::Success {
                    observation: observation.text.clone(),
                };
            }
        };

        let (word, feedback) = split_verdict(&response.content);
        debug!(verdict = %word, "step supervised");
        match word.as_str() {
            "RETRY" => StepOutcome::Retry { feedback },
            "REPLAN" => StepOutcome::Replan { feedback },
            "ABORT" => StepOutcome::Abort {
                error: CoreError::fatal(
                    crate::error::codes::STEP_ABORTED,
                    if feedback.is_empty() {
                        "supervisor aborted the step".to_string()
                    } else {
                        feedback
                    },
                ),
            },
            _ => StepOutcome::Success {
                observation: observation.text.clone(),
            },
        }
    }
}

fn split_verdict(content: &str) -> (String, String) {
    let trimmed = content.trim();
    let (word, rest) = match trimmed.split_once(':') {
        Some((w, rest)) => (w, rest.trim()),
        None => (trimmed.split_whitespace().next().unwrap_or(""), ""),
    };
    (word.trim().to_uppercase(), rest.to_string())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Step, StepKind};
    use crate::error::codes;
    use crate::llm::MockLlm;
    use serde_json::json;

    fn step() -> Step {
        Step {
            index: 0,
            kind: StepKind::Tool,
            target: Some("web_fetch".to_string()),
            args: json!({"url": "https://example.org"}),
            rationale: Some("fetch the page".to_string()),
        }
    }

    #[tokio::test]
    async fn transient_error_maps_to_retry_without_llm() {
        let llm = Arc::new(MockLlm::with_reply("never consulted"));
        let supervisor = StepSupervisor::new(Arc::clone(&llm) as Arc<dyn LlmGateway>);
        let obs = StepObservation::failed(CoreError::transient(codes::STEP_TIMEOUT, "timed out"));
        let outcome = supervisor.classify(&step(), &obs).await;
        assert!(matches!(outcome, StepOutcome::Retry { .. }));
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn authorisation_error_aborts() {
        let supervisor = StepSupervisor::new(Arc::new(MockLlm::with_reply("x")));
        let obs = StepObservation::failed(CoreError::missing_token("github"));
        match supervisor.classify(&step(), &obs).await {
            StepOutcome::Abort { error } => assert_eq!(error.code(), codes::AUTH_MISSING_TOKEN),
            other => panic!("expected abort, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn llm_verdict_with_feedback_is_parsed() {
        let llm = MockLlm::with_reply("REPLAN: the page was empty, try a search instead");
        let supervisor = StepSupervisor::new(Arc::new(llm));
        let obs = StepObservation::ok("(empty page)");
        match supervisor.classify(&step(), &obs).await {
            StepOutcome::Replan { feedback } => assert!(feedback.contains("search")),
            other => panic!("expected replan, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_verdict_defaults_to_success() {
        let llm = MockLlm::with_reply("LGTM");
        let supervisor = StepSupervisor::new(Arc::new(llm));
        let obs = StepObservation::ok("content of the page");
        match supervisor.classify(&step(), &obs).await {
            StepOutcome::Success { observation } => {
                assert_eq!(observation, "content of the page")
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
}
