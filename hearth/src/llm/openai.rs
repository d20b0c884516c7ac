//! OpenAI-compatible gateway implementing [`LlmGateway`].
//!
//! Routes profiles to models over one Chat Completions endpoint. Requires
//! `OPENAI_API_KEY` (or explicit config with a custom base URL for
//! compatible providers).
//!
//! # Streaming
//!
//! `stream()` uses the streaming API (`create_stream`) and forwards
//! `ChatDelta`s as tokens arrive. Tool calls are accumulated from stream
//! chunks by index; some proxies send content only in the final payload, so
//! content that produced no incremental chunk is emitted as one chunk at the
//! end.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionMessageToolCalls, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessage,
        ChatCompletionRequestUserMessage, ChatCompletionTool, ChatCompletionTools,
        CreateChatCompletionRequestArgs, FunctionObject,
    },
    Client,
};

use crate::tools::ToolSpec;
use crate::Message;

use super::{ChatDelta, LlmError, LlmGateway, LlmResponse, LlmUsage, ToolCall};

/// Profile-routed OpenAI-compatible Chat Completions client.
///
/// Unknown profiles fall back to the default model, so a skill naming its own
/// profile still completes against a configured endpoint.
pub struct OpenAiGateway {
    client: Client<OpenAIConfig>,
    default_model: String,
    routes: HashMap<String, String>,
    temperature: Option<f32>,
}

impl OpenAiGateway {
    /// Build with default config (API key from `OPENAI_API_KEY` env).
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            default_model: default_model.into(),
            routes: HashMap::new(),
            temperature: None,
        }
    }

    /// Build with custom config (e.g. custom API key or base URL).
    pub fn with_config(config: OpenAIConfig, default_model: impl Into<String>) -> Self {
        Self {
            client: Client::with_config(config),
            default_model: default_model.into(),
            routes: HashMap::new(),
            temperature: None,
        }
    }

    /// Route one profile to a model.
    pub fn with_route(mut self, profile: impl Into<String>, model: impl Into<String>) -> Self {
        self.routes.insert(profile.into(), model.into());
        self
    }

    /// Set temperature (0–2). Lower values are more deterministic.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn model_for(&self, profile: &str) -> &str {
        self.routes
            .get(profile)
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }

    /// Convert our `Message` list to request messages. Tool turns map to the
    /// tool role with their originating call id.
    fn messages_to_request(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::System { content } => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(content.as_str()),
                ),
                Message::User { content } => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(content.as_str()),
                ),
                Message::Assistant { content } => {
                    ChatCompletionRequestMessage::Assistant(content.as_str().into())
                }
                Message::Tool { content, call_id } => {
                    ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                        content: content.as_str().into(),
                        tool_call_id: call_id.clone().unwrap_or_default(),
                    })
                }
            })
            .collect()
    }

    fn specs_to_tools(tools: &[ToolSpec]) -> Vec<ChatCompletionTools> {
        tools
            .iter()
            .map(|t| {
                ChatCompletionTools::Function(ChatCompletionTool {
                    function: FunctionObject {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: Some(t.input_schema.clone()),
                        ..Default::default()
                    },
                })
            })
            .collect()
    }

    fn classify_error(err: OpenAIError) -> LlmError {
        match err {
            OpenAIError::Reqwest(e) => LlmError::Transport(e.to_string()),
            OpenAIError::ApiError(e) => {
                let message = e.message.clone();
                let lowered = message.to_lowercase();
                // Rate limits and upstream overload arrive as ApiError from
                // OpenAI-compatible proxies rather than as transport failures.
                if lowered.contains("rate limit")
                    || lowered.contains("overload")
                    || lowered.contains("timeout")
                    || lowered.contains("temporarily")
                {
                    LlmError::Transport(message)
                } else {
                    LlmError::Rejected(message)
                }
            }
            other => LlmError::Rejected(other.to_string()),
        }
    }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    async fn complete(
        &self,
        profile: &str,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
    ) -> Result<LlmResponse, LlmError> {
        let trace_id = uuid::Uuid::new_v4().to_string();
        let model = self.model_for(profile).to_string();

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model.clone());
        args.messages(Self::messages_to_request(messages));
        if let Some(tools) = tools {
            args.tools(Self::specs_to_tools(tools));
        }
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args.build().map_err(|e| LlmError::Build(e.to_string()))?;

        debug!(
            trace_id = %trace_id,
            profile = %profile,
            model = %model,
            message_count = messages.len(),
            tools_count = tools.map(|t| t.len()).unwrap_or(0),
            "chat create"
        );

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(Self::classify_error)?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::NoChoices)?;

        let msg = choice.message;
        let content = msg.content.unwrap_or_default();
        let tool_calls: Vec<ToolCall> = msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| {
                if let ChatCompletionMessageToolCalls::Function(f) = tc {
                    Some(ToolCall {
                        name: f.function.name,
                        arguments: f.function.arguments,
                        id: Some(f.id),
                    })
                } else {
                    None
                }
            })
            .collect();

        trace!(trace_id = %trace_id, content_len = content.len(), tool_calls = tool_calls.len(), "chat response");

        let usage = response.usage.map(|u| LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });
        Ok(LlmResponse {
            content,
            tool_calls,
            usage,
        })
    }

    async fn stream(
        &self,
        profile: &str,
        messages: &[Message],
        tools: Option<&[ToolSpec]>,
        chunk_tx: Option<mpsc::Sender<ChatDelta>>,
    ) -> Result<LlmResponse, LlmError> {
        let Some(chunk_tx) = chunk_tx else {
            return self.complete(profile, messages, tools).await;
        };

        let trace_id = uuid::Uuid::new_v4().to_string();
        let model = self.model_for(profile).to_string();

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model.clone());
        args.messages(Self::messages_to_request(messages));
        args.stream(true);
        if let Some(tools) = tools {
            args.tools(Self::specs_to_tools(tools));
        }
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args.build().map_err(|e| LlmError::Build(e.to_string()))?;

        debug!(
            trace_id = %trace_id,
            profile = %profile,
            model = %model,
            message_count = messages.len(),
            stream = true,
            "chat create_stream"
        );

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(Self::classify_error)?;

        let mut full_content = String::new();
        let mut sent_any_content = false;
        // Tool calls accumulate by index: (id, name, arguments) fragments.
        let mut tool_call_map: HashMap<u32, (String, String, String)> = HashMap::new();
        let mut usage: Option<LlmUsage> = None;

        while let Some(result) = stream.next().await {
            let response = result.map_err(Self::classify_error)?;

            if let Some(ref u) = response.usage {
                usage = Some(LlmUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                });
            }

            for choice in response.choices {
                let delta = &choice.delta;

                if let Some(ref content) = delta.content {
                    if !content.is_empty() {
                        full_content.push_str(content);
                        sent_any_content = true;
                        let _ = chunk_tx
                            .send(ChatDelta {
                                content: content.clone(),
                            })
                            .await;
                    }
                }

                if let Some(ref tool_calls) = delta.tool_calls {
                    for tc in tool_calls {
                        let entry = tool_call_map.entry(tc.index).or_insert_with(|| {
                            (
                                tc.id.clone().unwrap_or_default(),
                                String::new(),
                                String::new(),
                            )
                        });
                        if let Some(ref id) = tc.id {
                            if !id.is_empty() {
                                entry.0 = id.clone();
                            }
                        }
                        if let Some(ref func) = tc.function {
                            if let Some(ref name) = func.name {
                                entry.1.push_str(name);
                            }
                            if let Some(ref arguments) = func.arguments {
                                entry.2.push_str(arguments);
                            }
                        }
                    }
                }
            }
        }

        // Some proxies send content only in the final payload, not in deltas;
        // emit it as one chunk so the stream still carries assistant text.
        if !sent_any_content && !full_content.is_empty() {
            let _ = chunk_tx
                .send(ChatDelta {
                    content: full_content.clone(),
                })
                .await;
        }

        let mut indices: Vec<u32> = tool_call_map.keys().copied().collect();
        indices.sort_unstable();
        let tool_calls = indices
            .into_iter()
            .filter_map(|i| tool_call_map.remove(&i))
            .map(|(id, name, arguments)| ToolCall {
                name,
                arguments,
                id: if id.is_empty() { None } else { Some(id) },
            })
            .collect();

        Ok(LlmResponse {
            content: full_content,
            tool_calls,
            usage,
        })
    }
}
