//! MCP integration: Streamable-HTTP sessions, per-context client pool, tool
//! adapter.
//!
//! Each configured provider is a URL plus a bearer token resolved per context
//! from stored OAuth credentials (with an optional static fallback). The pool
//! caches connected clients per context, revalidates liveness by ping within
//! a TTL, and guarantees single-flight connection attempts per context. A
//! context with no reachable servers simply exposes no MCP tools.

mod adapter;
mod auth;
mod client;
mod pool;
mod session;

pub use adapter::{register_mcp_tools, McpToolAdapter};
pub use auth::{StaticTokenResolver, StoredTokenResolver, TokenResolver};
pub use client::{ClientHealth, ClientStatus, McpClient};
pub use pool::{McpClientPool, McpProviderConfig, PoolHealth};
pub use session::McpHttpSession;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("initialize failed: {0}")]
    Initialize(String),
    #[error("server error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("tool call failed: {0}")]
    ToolCall(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<McpError> for crate::tools::ToolError {
    fn from(err: McpError) -> Self {
        use crate::tools::ToolError;
        match err {
            McpError::Transport(m) => ToolError::Transport(m),
            McpError::Timeout(d) => ToolError::Timeout(d),
            McpError::Rpc { code, message } => {
                ToolError::Execution(format!("mcp error {code}: {message}"))
            }
            other => ToolError::Execution(other.to_string()),
        }
    }
}
