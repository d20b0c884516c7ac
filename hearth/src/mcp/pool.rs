//! Per-context cache of MCP clients with health and lifecycle management.
//!
//! Reads validate cached clients against the health TTL; (re)connection runs
//! under a per-context mutex so at most one attempt per provider per context
//! is in flight. Connection failures are logged and omitted, never fatal.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CoreConfig;

use super::auth::TokenResolver;
use super::client::{ClientHealth, McpClient};

/// One configured MCP server.
#[derive(Clone, Debug)]
pub struct McpProviderConfig {
    /// Provider name; also the OAuth provider key.
    pub name: String,
    /// Streamable HTTP endpoint.
    pub url: String,
    /// Static bearer used when no stored token resolves.
    pub static_token: Option<String>,
}

/// Health snapshot for one context.
#[derive(Clone, Debug)]
pub struct PoolHealth {
    pub context_id: Uuid,
    pub clients: Vec<ClientHealth>,
}

/// Concurrent connection attempts per context during a rebuild.
const CONNECT_CONCURRENCY: usize = 4;

pub struct McpClientPool {
    providers: Vec<McpProviderConfig>,
    resolver: Arc<dyn TokenResolver>,
    health_ttl: Duration,
    connect_timeout: Duration,
    ping_timeout: Duration,
    clients: DashMap<Uuid, Vec<Arc<McpClient>>>,
    locks: DashMap<Uuid, Arc<tokio::sync::Mutex<()>>>,
}

impl McpClientPool {
    pub fn new(
        providers: Vec<McpProviderConfig>,
        resolver: Arc<dyn TokenResolver>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            providers,
            resolver,
            health_ttl: config.mcp_health_ttl,
            connect_timeout: config.mcp_connect_timeout,
            ping_timeout: config.mcp_ping_timeout,
            clients: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, context_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(context_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Validated clients currently cached for the context.
    async fn validated_cached(&self, context_id: Uuid) -> Vec<Arc<McpClient>> {
        let cached: Vec<Arc<McpClient>> = self
            .clients
            .get(&context_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();

        let mut valid = Vec::with_capacity(cached.len());
        for client in cached {
            if client.ensure_alive(self.health_ttl, self.ping_timeout).await {
                valid.push(client);
            } else {
                debug!(provider = %client.provider(), context = %context_id, "dropping stale mcp client");
            }
        }
        valid
    }

    /// Returns the context's clients, connecting any missing providers.
    ///
    /// Every returned client either passed a ping within the health TTL or
    /// was freshly connected. At most one connect pass per context runs at a
    /// time; a second caller re-checks the cache after acquiring the lock.
    pub async fn get_clients(&self, context_id: Uuid) -> Vec<Arc<McpClient>> {
        if self.providers.is_empty() {
            return Vec::new();
        }

        let valid = self.validated_cached(context_id).await;
        if valid.len() == self.providers.len() {
            return valid;
        }

        let lock = self.lock_for(context_id);
        let _guard = lock.lock().await;

        // Re-check after acquiring: another request may have rebuilt the set.
        let mut valid = self.validated_cached(context_id).await;
        let missing: Vec<McpProviderConfig> = self
            .providers
            .iter()
            .filter(|p| !valid.iter().any(|c| c.provider() == p.name))
            .cloned()
            .collect();

        if !missing.is_empty() {
            let connected: Vec<Option<Arc<McpClient>>> = stream::iter(missing)
                .map(|provider| {
                    let resolver = Arc::clone(&self.resolver);
                    let connect_timeout = self.connect_timeout;
                    async move {
                        let bearer = match resolver.resolve(context_id, &provider.name).await {
                            Ok(token) => Some(token),
                            Err(e) => {
                                if provider.static_token.is_none() {
                                    warn!(provider = %provider.name, context = %context_id, error = %e, "no token for mcp provider, skipping");
                                    return None;
                                }
                                provider.static_token.clone()
                            }
                        };
                        match McpClient::connect(
                            provider.name.clone(),
                            &provider.url,
                            bearer,
                            connect_timeout,
                        )
                        .await
                        {
                            Ok(client) => {
                                info!(provider = %provider.name, context = %context_id, tools = client.tools().len(), "mcp client connected");
                                Some(Arc::new(client))
                            }
                            Err(e) => {
                                warn!(provider = %provider.name, context = %context_id, error = %e, "mcp connect failed");
                                None
                            }
                        }
                    }
                })
                .buffer_unordered(CONNECT_CONCURRENCY)
                .collect()
                .await;

            valid.extend(connected.into_iter().flatten());
            self.clients.insert(context_id, valid.clone());
        }

        valid
    }

    /// Closes and evicts every client for one context.
    pub async fn disconnect_context(&self, context_id: Uuid) {
        let lock = self.lock_for(context_id);
        let _guard = lock.lock().await;
        if let Some((_, clients)) = self.clients.remove(&context_id) {
            for client in clients {
                client.disconnect();
            }
        }
    }

    /// Disconnects every context.
    pub async fn shutdown(&self) {
        let contexts: Vec<Uuid> = self.clients.iter().map(|e| *e.key()).collect();
        for context_id in contexts {
            self.disconnect_context(context_id).await;
        }
    }

    /// Snapshot for observability surfaces.
    pub fn health_status(&self) -> Vec<PoolHealth> {
        self.clients
            .iter()
            .map(|entry| PoolHealth {
                context_id: *entry.key(),
                clients: entry.value().iter().map(|c| c.health()).collect(),
            })
            .collect()
    }
}
