//! Relational persistence: contexts, conversations, messages, permissions,
//! OAuth tokens.
//!
//! The pipeline consumes this as a trait; the SQLite implementation is the
//! default for local deployments. Writes are transactional; deleting a
//! context cascades to everything scoped to it.

mod sqlite;

pub use sqlite::SqliteDatabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Tenant boundary. Every user-visible entity references exactly one context.
#[derive(Clone, Debug, PartialEq)]
pub struct Context {
    pub id: Uuid,
    /// Human name; unique.
    pub name: String,
    /// Type tag (e.g. "personal", "project").
    pub kind: String,
    /// Opaque configuration map.
    pub config: Value,
    pub default_working_dir: Option<String>,
    pub pinned_files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Context {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: kind.into(),
            config: Value::Object(Default::default()),
            default_working_dir: None,
            pinned_files: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Chat thread within a context.
#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub platform: String,
    pub platform_id: String,
    pub context_id: Uuid,
    pub working_dir: Option<String>,
    pub metadata: Value,
}

/// One persisted turn.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub trace_id: Option<String>,
}

impl StoredMessage {
    pub fn new(conversation_id: Uuid, role: &str, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role: role.to_string(),
            content: content.into(),
            created_at: Utc::now(),
            trace_id: None,
        }
    }
}

/// Per-context tool allow/deny row. Absence of a row means allowed.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolPermission {
    pub context_id: Uuid,
    pub tool_name: String,
    pub allowed: bool,
}

/// Per-context provider credential. Never serialized into events.
#[derive(Clone, Debug, PartialEq)]
pub struct OAuthToken {
    pub context_id: Uuid,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database: {0}")]
    Sqlite(String),
    #[error("blocking task failed: {0}")]
    Join(String),
    #[error("row decode: {0}")]
    Decode(String),
}

impl From<DbError> for crate::error::CoreError {
    fn from(err: DbError) -> Self {
        crate::error::CoreError::fatal(crate::error::codes::PERSISTENCE_WRITE, err.to_string())
    }
}

/// CRUD surface consumed by the dispatcher, factory, and tools.
#[async_trait]
pub trait Database: Send + Sync {
    async fn create_context(&self, context: &Context) -> Result<(), DbError>;
    async fn get_context(&self, id: Uuid) -> Result<Option<Context>, DbError>;
    async fn find_context_by_name(&self, name: &str) -> Result<Option<Context>, DbError>;
    /// Deletes the context and cascades to conversations, messages, OAuth
    /// tokens, and tool permissions.
    async fn delete_context(&self, id: Uuid) -> Result<(), DbError>;

    /// Finds the conversation for `(platform, platform_id)` or creates one
    /// bound to `context_id`.
    async fn upsert_conversation(
        &self,
        platform: &str,
        platform_id: &str,
        context_id: Uuid,
    ) -> Result<Conversation, DbError>;
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, DbError>;

    async fn append_message(&self, message: &StoredMessage) -> Result<(), DbError>;
    /// The most recent `n` messages in chronological order.
    async fn fetch_recent_messages(
        &self,
        conversation_id: Uuid,
        n: usize,
    ) -> Result<Vec<StoredMessage>, DbError>;

    async fn tool_permissions(&self, context_id: Uuid) -> Result<Vec<ToolPermission>, DbError>;
    async fn set_tool_permission(&self, permission: &ToolPermission) -> Result<(), DbError>;

    async fn oauth_tokens(&self, context_id: Uuid) -> Result<Vec<OAuthToken>, DbError>;
    async fn oauth_token(
        &self,
        context_id: Uuid,
        provider: &str,
    ) -> Result<Option<OAuthToken>, DbError>;
    async fn upsert_oauth_token(&self, token: &OAuthToken) -> Result<(), DbError>;
}
