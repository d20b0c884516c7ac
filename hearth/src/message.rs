//! Conversation turns: system / user / assistant / tool.
//!
//! The tool variant carries the originating call id when the result came from
//! an LLM-emitted tool call; supervisor observations appended by the pipeline
//! leave it unset.

use serde::{Deserialize, Serialize};

/// One turn in a conversation or worker transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant { content: String },
    Tool {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Message::Tool {
            content: content.into(),
            call_id: None,
        }
    }

    pub fn tool_with_call_id(content: impl Into<String>, call_id: impl Into<String>) -> Self {
        Message::Tool {
            content: content.into(),
            call_id: Some(call_id.into()),
        }
    }

    /// Role as stored in persistence and event payloads.
    pub fn role(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content }
            | Message::Tool { content, .. } => content,
        }
    }

    /// Rebuilds a message from a persisted `(role, content)` pair. Unknown
    /// roles fall back to user, matching how rows written by older schemas are
    /// read.
    pub fn from_role_content(role: &str, content: impl Into<String>) -> Self {
        match role {
            "system" => Message::system(content),
            "assistant" => Message::assistant(content),
            "tool" => Message::tool(content),
            _ => Message::user(content),
        }
    }
}
