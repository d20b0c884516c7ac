//! MCP tool adapter: wraps each remote tool as `dyn Tool` for a registry
//! clone.
//!
//! Each MCP tool is represented by an [`McpToolAdapter`] registered under a
//! provider-prefixed name, so remote tools never collide with native ones or
//! with another provider's. `call` delegates to the shared client.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolCallContext, ToolError, ToolOutput, ToolRegistry, ToolSpec};

use super::client::McpClient;

/// One remote tool behind the `Tool` trait.
pub struct McpToolAdapter {
    /// Prefixed name as registered (`mcp_<provider>_<tool>`).
    name: String,
    /// Remote tool name for `tools/call`.
    remote_name: String,
    spec: ToolSpec,
    client: Arc<McpClient>,
}

impl McpToolAdapter {
    pub fn new(client: Arc<McpClient>, remote_spec: ToolSpec) -> Self {
        let remote_name = remote_spec.name.clone();
        let name = format!("mcp_{}_{}", client.provider(), remote_name);
        let spec = ToolSpec {
            name: name.clone(),
            ..remote_spec
        };
        Self {
            name,
            remote_name,
            spec,
            client,
        }
    }
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(
        &self,
        args: Value,
        _ctx: Option<&ToolCallContext>,
    ) -> Result<ToolOutput, ToolError> {
        let text = self
            .client
            .call_tool(&self.remote_name, args)
            .await
            .map_err(ToolError::from)?;
        Ok(ToolOutput::text(text))
    }
}

/// Registers every tool of every client into the registry clone under
/// prefixed names. Returns how many tools were added.
pub fn register_mcp_tools(registry: &mut ToolRegistry, clients: &[Arc<McpClient>]) -> usize {
    let mut added = 0;
    for client in clients {
        for spec in client.tools() {
            registry.register(Arc::new(McpToolAdapter::new(Arc::clone(client), spec)));
            added += 1;
        }
    }
    added
}
