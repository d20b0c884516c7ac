//! LLM gateway abstraction.
//!
//! The pipeline depends on a profile-routed gateway that returns assistant
//! text and optional tool calls; this module defines the trait, the response
//! types, and a scripted mock. `profile` is an opaque routing target (planner,
//! composer, supervisor, ...); implementations map it to a concrete model.
//!
//! # Streaming
//!
//! `stream()` accepts an optional `Sender<ChatDelta>` for emitting tokens as
//! they arrive. Implementations that support streaming send deltas through the
//! channel; others use the default implementation that calls `complete()` and
//! sends the full content as one chunk.

mod mock;
mod openai;

pub use mock::MockLlm;
pub use openai::OpenAiGateway;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::tools::ToolSpec;
use crate::Message;

/// Routing targets used by the core. Skills may name their own.
pub mod profiles {
    pub const CLASSIFIER: &str = "classifier";
    pub const PLANNER: &str = "planner";
    pub const SUPERVISOR: &str = "supervisor";
    pub const COMPOSER: &str = "composer";
}

/// One streamed content delta.
#[derive(Clone, Debug)]
pub struct ChatDelta {
    pub content: String,
}

/// One tool call emitted by the model. `arguments` is the raw JSON string as
/// returned; callers parse it against the tool's schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: String,
    pub id: Option<String>,
}

/// Token usage for one call, when the gateway reports it.
#[derive(Clone, Debug, Default)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Response from one completion: assistant text plus optional tool calls.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        LlmResponse {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        LlmResponse {
            content: content.into(),
            tool_calls,
            usage: None,
        }
    }
}

/// Gateway failure, split along the HTTP status families the pipeline cares
/// about: transient (timeouts, 5xx, rate limits) vs. rejected (4xx, content
/// policy).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("gateway transport: {0}")]
    Transport(String),
    #[error("gateway rejected request: {0}")]
    Rejected(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("gateway returned no choices")]
    NoChoices,
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Transport(_) | LlmError::NoChoices)
    }
}

impl From<LlmError> for crate::error::CoreError {
    fn from(err: LlmError) -> Self {
        use crate::error::{codes, CoreError};
        if err.is_transient() {
            CoreError::transient(codes::GATEWAY_UNAVAILABLE, err.to_string())
        } else {
            CoreError::fatal(codes::GATEWAY_REJECTED, err.to_string())
        }
    }
}

/// Profile-routed LLM gateway.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// One-shot completion. When `tools` is set the model may return
    /// `tool_calls` in the response.
    async fn complete(
        &self,
        profile: &str,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
    ) -> Result<LlmResponse, LlmError>;

    /// Streaming completion. Content deltas are sent through `chunk_tx` as
    /// they arrive; the accumulated response is returned at the end. The
    /// default implementation completes non-streaming and emits one chunk.
    async fn stream(
        &self,
        profile: &str,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
        chunk_tx: Option<mpsc::Sender<ChatDelta>>,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.complete(profile, messages, tools).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx
                    .send(ChatDelta {
                        content: response.content.clone(),
                    })
                    .await;
            }
        }
        Ok(response)
    }
}
