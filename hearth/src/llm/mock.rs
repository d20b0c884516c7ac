//! Scripted mock gateway for tests.
//!
//! Responses are queued per profile; when a profile's queue runs dry the
//! default reply is returned. Every call is recorded so tests can assert on
//! the prompts a stage actually sent.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::tools::ToolSpec;
use crate::Message;

use super::{LlmError, LlmGateway, LlmResponse, ToolCall};

/// One recorded gateway call.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub profile: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Deterministic gateway: per-profile scripted responses plus a default.
pub struct MockLlm {
    default_reply: String,
    scripts: Mutex<HashMap<String, VecDeque<LlmResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockLlm {
    /// Mock that answers every profile with `reply` unless a script is queued.
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            default_reply: reply.into(),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a full response for one profile; responses pop in FIFO order.
    pub fn enqueue(self, profile: &str, response: LlmResponse) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(profile.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Queues a plain-text reply for one profile.
    pub fn enqueue_text(self, profile: &str, text: impl Into<String>) -> Self {
        self.enqueue(profile, LlmResponse::text(text))
    }

    /// Queues a reply carrying one tool call.
    pub fn enqueue_tool_call(
        self,
        profile: &str,
        content: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        let call = ToolCall {
            name: name.into(),
            arguments: arguments.into(),
            id: Some(format!("call-{}", uuid::Uuid::new_v4())),
        };
        self.enqueue(profile, LlmResponse::with_tool_calls(content, vec![call]))
    }

    /// All calls observed so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls made against one profile.
    pub fn calls_for(&self, profile: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.profile == profile)
            .collect()
    }
}

#[async_trait]
impl LlmGateway for MockLlm {
    async fn complete(
        &self,
        profile: &str,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
    ) -> Result<LlmResponse, LlmError> {
        self.calls.lock().unwrap().push(RecordedCall {
            profile: profile.to_string(),
            messages: messages.to_vec(),
            tool_names: tools
                .map(|t| t.iter().map(|s| s.name.clone()).collect())
                .unwrap_or_default(),
        });

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(profile)
            .and_then(|q| q.pop_front());
        Ok(scripted.unwrap_or_else(|| LlmResponse::text(self.default_reply.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_profile_pops_in_order_then_falls_back() {
        let llm = MockLlm::with_reply("default")
            .enqueue_text("planner", "first")
            .enqueue_text("planner", "second");

        let msgs = vec![Message::user("hi")];
        assert_eq!(
            llm.complete("planner", &msgs, None).await.unwrap().content,
            "first"
        );
        assert_eq!(
            llm.complete("planner", &msgs, None).await.unwrap().content,
            "second"
        );
        assert_eq!(
            llm.complete("planner", &msgs, None).await.unwrap().content,
            "default"
        );
        assert_eq!(llm.calls_for("planner").len(), 3);
    }

    #[tokio::test]
    async fn records_tool_names_passed_to_gateway() {
        let llm = MockLlm::with_reply("ok");
        let spec = ToolSpec::new("web_fetch", serde_json::json!({"type": "object"}));
        llm.complete("composer", &[Message::user("x")], Some(&[spec]))
            .await
            .unwrap();
        assert_eq!(llm.calls()[0].tool_names, vec!["web_fetch"]);
    }
}
