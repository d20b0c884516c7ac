//! Per-request service construction.
//!
//! The factory owns the immutable base registry template and the process-wide
//! pools; `create_service` builds one isolated [`AgentService`] per
//! `(context, request)`: a shallow registry clone with the context's MCP
//! tools attached and its permissions applied, plus a context-scoped memory
//! view. Clones are never reinserted into the base.

use std::sync::Arc;

use tracing::debug;

use crate::agent::AgentService;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::llm::LlmGateway;
use crate::mcp::{register_mcp_tools, McpClientPool};
use crate::memory::{Embedder, MemoryStore, VectorIndex};
use crate::persistence::{Context, Conversation, Database};
use crate::skills::SkillRegistry;
use crate::tools::ToolRegistry;

/// Collection name for memory points.
const MEMORY_COLLECTION: &str = "memories";

pub struct ServiceFactory {
    base_registry: ToolRegistry,
    skills: Arc<SkillRegistry>,
    mcp_pool: Arc<McpClientPool>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    gateway: Arc<dyn LlmGateway>,
    config: CoreConfig,
}

impl ServiceFactory {
    pub fn new(
        base_registry: ToolRegistry,
        skills: Arc<SkillRegistry>,
        mcp_pool: Arc<McpClientPool>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        gateway: Arc<dyn LlmGateway>,
        config: CoreConfig,
    ) -> Self {
        Self {
            base_registry,
            skills,
            mcp_pool,
            vector_index,
            embedder,
            gateway,
            config,
        }
    }

    /// Tool names in the base template, for classification heuristics.
    pub fn base_tool_names(&self) -> Vec<String> {
        self.base_registry.names()
    }

    /// Builds the service for one request. Two concurrent requests on the
    /// same context share MCP clients through the pool but hold independent
    /// registry clones.
    pub async fn create_service(
        &self,
        context: &Context,
        conversation: &Conversation,
        db: Arc<dyn Database>,
    ) -> Result<AgentService, CoreError> {
        let mut registry = self.base_registry.clone();

        let clients = self.mcp_pool.get_clients(context.id).await;
        let mcp_tools = register_mcp_tools(&mut registry, &clients);

        let permissions: std::collections::HashMap<String, bool> = db
            .tool_permissions(context.id)
            .await
            .map_err(CoreError::from)?
            .into_iter()
            .map(|p| (p.tool_name, p.allowed))
            .collect();
        registry.filter_by_permissions(&permissions);

        debug!(
            context = %context.id,
            tools = registry.len(),
            mcp_tools,
            "service registry assembled"
        );

        let memory = MemoryStore::new(
            context.id,
            MEMORY_COLLECTION,
            Arc::clone(&self.vector_index),
            Arc::clone(&self.embedder),
        );

        Ok(AgentService::new(
            context.clone(),
            conversation.clone(),
            registry,
            Arc::clone(&self.skills),
            memory,
            Arc::clone(&self.gateway),
            db,
            self.config.clone(),
        ))
    }
}
