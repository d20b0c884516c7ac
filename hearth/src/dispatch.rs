//! Unified orchestrator: the single entry point adapters call.
//!
//! Resolves the context and conversation, persists the user turn, classifies
//! intent, and routes to a direct completion stream or to a per-request agent
//! service. The returned event stream is the adapter contract; dropping it
//! cancels the underlying pipeline at its next emission point.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use agent_stream::{event_channel, AgentEvent, EventSink, EventStream};

use crate::agent::AgentRequest;
use crate::config::CoreConfig;
use crate::error::{codes, CoreError};
use crate::factory::ServiceFactory;
use crate::llm::{profiles, LlmGateway};
use crate::persistence::{Context, Conversation, Database, StoredMessage};
use crate::Message;

const CHAT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer the user directly and concisely.";

/// Route decided for one incoming message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Chat,
    Agentic,
}

/// Adapter-supplied request metadata.
#[derive(Clone, Debug, Default)]
pub struct RequestMetadata {
    /// Explicit context selection; absent means resolve-or-create a default
    /// context for the platform pair.
    pub context_name: Option<String>,
    /// Authorising token from a previous `confirmation_required` event.
    pub confirmation_token: Option<String>,
}

#[derive(Clone)]
pub struct Dispatcher {
    factory: Arc<ServiceFactory>,
    db: Arc<dyn Database>,
    gateway: Arc<dyn LlmGateway>,
    config: CoreConfig,
}

impl Dispatcher {
    pub fn new(
        factory: Arc<ServiceFactory>,
        db: Arc<dyn Database>,
        gateway: Arc<dyn LlmGateway>,
        config: CoreConfig,
    ) -> Self {
        Self {
            factory,
            db,
            gateway,
            config,
        }
    }

    /// Processes one user message and returns its event stream. The stream
    /// terminates with either a terminal content marker or an `error`.
    pub fn stream(
        &self,
        session_id: &str,
        platform: &str,
        platform_id: &str,
        message_text: &str,
        metadata: RequestMetadata,
    ) -> EventStream {
        let request_id = Uuid::new_v4().to_string();
        let (sink, stream) = event_channel(request_id.clone(), self.config.event_buffer);

        let this = self.clone();
        let platform = platform.to_string();
        let platform_id = platform_id.to_string();
        let message_text = message_text.to_string();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            debug!(request = %request_id, session = %session_id, platform = %platform, "request accepted");
            this.run(&platform, &platform_id, &message_text, metadata, sink)
                .await;
        });

        stream
    }

    async fn run(
        &self,
        platform: &str,
        platform_id: &str,
        message_text: &str,
        metadata: RequestMetadata,
        events: EventSink,
    ) {
        let (context, conversation) = match self
            .resolve(platform, platform_id, metadata.context_name.as_deref())
            .await
        {
            Ok(pair) => pair,
            Err(e) => {
                events.emit(e.to_event()).await;
                return;
            }
        };

        // The user turn must be durable before anything else happens.
        if let Err(e) = self
            .db
            .append_message(&StoredMessage::new(conversation.id, "user", message_text))
            .await
        {
            events.emit(CoreError::from(e).to_event()).await;
            return;
        }

        let intent = self.classify(&conversation, message_text).await;
        info!(conversation = %conversation.id, ?intent, "message classified");

        match intent {
            Intent::Chat => {
                let timeout = self.config.chat_timeout;
                let fut = self.run_chat(&conversation, &events);
                if tokio::time::timeout(timeout, fut).await.is_err() {
                    events
                        .emit(
                            CoreError::transient(
                                codes::STEP_TIMEOUT,
                                format!("chat request exceeded {timeout:?}"),
                            )
                            .to_event(),
                        )
                        .await;
                }
            }
            Intent::Agentic => {
                let service = match self
                    .factory
                    .create_service(&context, &conversation, Arc::clone(&self.db))
                    .await
                {
                    Ok(service) => service,
                    Err(e) => {
                        events.emit(e.to_event()).await;
                        return;
                    }
                };
                let request = AgentRequest {
                    prompt: message_text.to_string(),
                    confirmation_token: metadata.confirmation_token,
                };
                let timeout = self.config.agentic_timeout;
                if tokio::time::timeout(timeout, service.handle(request, events.clone()))
                    .await
                    .is_err()
                {
                    events
                        .emit(
                            CoreError::transient(
                                codes::STEP_TIMEOUT,
                                format!("agentic request exceeded {timeout:?}"),
                            )
                            .to_event(),
                        )
                        .await;
                }
            }
        }
    }

    /// Resolves the context (explicit name, or a default per platform pair,
    /// auto-created on first contact) and the conversation.
    async fn resolve(
        &self,
        platform: &str,
        platform_id: &str,
        context_name: Option<&str>,
    ) -> Result<(Context, Conversation), CoreError> {
        let name = context_name
            .map(String::from)
            .unwrap_or_else(|| format!("{platform}:{platform_id}"));

        let context = match self
            .db
            .find_context_by_name(&name)
            .await
            .map_err(CoreError::from)?
        {
            Some(context) => context,
            None => {
                let context = Context::new(name.clone(), "default");
                self.db
                    .create_context(&context)
                    .await
                    .map_err(CoreError::from)?;
                info!(context = %context.id, name = %name, "context auto-created");
                context
            }
        };

        let conversation = self
            .db
            .upsert_conversation(platform, platform_id, context.id)
            .await
            .map_err(CoreError::from)?;
        Ok((context, conversation))
    }

    /// CHAT vs. AGENTIC. Control-prefixed input and explicit tool mentions
    /// break the tie deterministically; otherwise a short classifier call
    /// decides, and classifier failure defaults to CHAT.
    async fn classify(&self, conversation: &Conversation, message_text: &str) -> Intent {
        let trimmed = message_text.trim();
        if trimmed.starts_with('/') {
            return Intent::Agentic;
        }
        let lowered = trimmed.to_lowercase();
        for tool in self.factory.base_tool_names() {
            if lowered.contains(&tool) {
                return Intent::Agentic;
            }
        }

        let history = self
            .db
            .fetch_recent_messages(conversation.id, 6)
            .await
            .unwrap_or_default();
        let mut prompt = String::from(
            "Classify the user's latest message. Reply with exactly one word:\n\
             AGENTIC if answering needs tools, web access, files, multiple \
             steps, or memory recall; CHAT if a direct reply suffices.\n\nRecent turns:\n",
        );
        for m in &history {
            prompt.push_str(&format!("{}: {}\n", m.role, m.content));
        }
        prompt.push_str(&format!("\nLatest message: {trimmed}"));

        match self
            .gateway
            .complete(profiles::CLASSIFIER, &[Message::user(prompt)], None)
            .await
        {
            Ok(response) if response.content.to_uppercase().contains("AGENTIC") => Intent::Agentic,
            Ok(_) => Intent::Chat,
            Err(e) => {
                warn!(error = %e, "classifier unavailable, defaulting to chat");
                Intent::Chat
            }
        }
    }

    /// Direct completion route: stream tokens, persist the assistant turn on
    /// clean close.
    async fn run_chat(&self, conversation: &Conversation, events: &EventSink) {
        let history = match self
            .db
            .fetch_recent_messages(conversation.id, self.config.history_window_messages)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                events.emit(CoreError::from(e).to_event()).await;
                return;
            }
        };

        let mut messages: Vec<Message> = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(CHAT_SYSTEM_PROMPT));
        messages.extend(
            history
                .iter()
                .map(|m| Message::from_role_content(&m.role, m.content.clone())),
        );

        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let stream_fut = self
            .gateway
            .stream(profiles::COMPOSER, &messages, None, Some(tx));
        let forward_fut = async {
            while let Some(delta) = rx.recv().await {
                events.emit(AgentEvent::content_delta(delta.content)).await;
            }
        };
        let (response, ()) = tokio::join!(stream_fut, forward_fut);

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                events.emit(CoreError::from(e).to_event()).await;
                return;
            }
        };

        if events.is_closed().await {
            debug!(conversation = %conversation.id, "chat cancelled, assistant turn not persisted");
            return;
        }
        if let Err(e) = self
            .db
            .append_message(&StoredMessage::new(
                conversation.id,
                "assistant",
                &response.content,
            ))
            .await
        {
            events.emit(CoreError::from(e).to_event()).await;
            return;
        }
        events.emit(AgentEvent::content_finished()).await;
    }
}
