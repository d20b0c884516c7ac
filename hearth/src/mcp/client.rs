//! One MCP client: a session plus connection state and cached tool
//! descriptors.
//!
//! Tool descriptors are cached at connect and refreshed only on reconnect;
//! liveness is ping-based and governed by the pool's TTL.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::warn;

use crate::tools::ToolSpec;

use super::session::McpHttpSession;
use super::McpError;

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Observability snapshot for one client.
#[derive(Clone, Debug)]
pub struct ClientHealth {
    pub provider: String,
    pub status: ClientStatus,
    pub last_ping_age: Option<Duration>,
    pub tool_count: usize,
}

struct ClientState {
    status: ClientStatus,
    last_ping: Option<Instant>,
    tools: Vec<ToolSpec>,
}

/// Connected MCP client for one provider. Requests are independent POSTs, so
/// concurrent tool calls are safe; state updates go through a short-lived
/// mutex with no await inside.
pub struct McpClient {
    provider: String,
    session: McpHttpSession,
    state: Mutex<ClientState>,
}

impl McpClient {
    /// Connects, performs the handshake, and caches the tool list.
    pub async fn connect(
        provider: impl Into<String>,
        url: &str,
        bearer: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self, McpError> {
        let provider = provider.into();
        let session = McpHttpSession::connect(url, bearer, connect_timeout).await?;
        let tools = session.list_tools().await?;
        Ok(Self {
            provider,
            session,
            state: Mutex::new(ClientState {
                status: ClientStatus::Connected,
                last_ping: Some(Instant::now()),
                tools,
            }),
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn status(&self) -> ClientStatus {
        self.state
            .lock()
            .map(|s| s.status)
            .unwrap_or(ClientStatus::Failed)
    }

    /// Tool descriptors cached at connect.
    pub fn tools(&self) -> Vec<ToolSpec> {
        self.state
            .lock()
            .map(|s| s.tools.clone())
            .unwrap_or_default()
    }

    /// Accepts the client when it is `Connected` and its last ping is within
    /// `ttl`; otherwise issues one bounded ping. Failing the ping marks the
    /// client `Failed`.
    pub async fn ensure_alive(&self, ttl: Duration, ping_timeout: Duration) -> bool {
        {
            let state = match self.state.lock() {
                Ok(s) => s,
                Err(_) => return false,
            };
            if state.status == ClientStatus::Connected {
                if let Some(last) = state.last_ping {
                    if last.elapsed() < ttl {
                        return true;
                    }
                }
            }
            if state.status == ClientStatus::Disconnected {
                return false;
            }
        }

        match self.session.ping(ping_timeout).await {
            Ok(()) => {
                if let Ok(mut state) = self.state.lock() {
                    state.status = ClientStatus::Connected;
                    state.last_ping = Some(Instant::now());
                }
                true
            }
            Err(e) => {
                warn!(provider = %self.provider, error = %e, "mcp ping failed");
                if let Ok(mut state) = self.state.lock() {
                    state.status = ClientStatus::Failed;
                }
                false
            }
        }
    }

    pub async fn call_tool(&self, name: &str, args: Value) -> Result<String, McpError> {
        self.session.call_tool(name, args).await
    }

    /// Marks the client disconnected; the HTTP transport has nothing to
    /// close.
    pub fn disconnect(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.status = ClientStatus::Disconnected;
            state.tools.clear();
        }
    }

    pub fn health(&self) -> ClientHealth {
        let state = self.state.lock();
        match state {
            Ok(s) => ClientHealth {
                provider: self.provider.clone(),
                status: s.status,
                last_ping_age: s.last_ping.map(|t| t.elapsed()),
                tool_count: s.tools.len(),
            },
            Err(_) => ClientHealth {
                provider: self.provider.clone(),
                status: ClientStatus::Failed,
                last_ping_age: None,
                tool_count: 0,
            },
        }
    }
}
