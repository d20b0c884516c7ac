//! Bearer token resolution for MCP providers.
//!
//! The resolver encapsulates lookup and failure semantics: return a bearer
//! string or fail with a missing-token classification. Refresh flows live
//! behind the resolver, not in the pool.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{codes, CoreError};
use crate::persistence::Database;

/// Resolves the bearer token a context uses for one provider.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn resolve(&self, context_id: Uuid, provider: &str) -> Result<String, CoreError>;
}

/// Resolver over persisted OAuth tokens.
pub struct StoredTokenResolver {
    db: Arc<dyn Database>,
}

impl StoredTokenResolver {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenResolver for StoredTokenResolver {
    async fn resolve(&self, context_id: Uuid, provider: &str) -> Result<String, CoreError> {
        let token = self
            .db
            .oauth_token(context_id, provider)
            .await
            .map_err(CoreError::from)?
            .ok_or_else(|| CoreError::missing_token(provider))?;

        if let Some(expires_at) = token.expires_at {
            if expires_at <= Utc::now() {
                return Err(CoreError::authorisation(
                    codes::AUTH_EXPIRED_TOKEN,
                    format!("token for provider '{provider}' expired"),
                ));
            }
        }
        Ok(token.access_token)
    }
}

/// Fixed tokens per provider, for servers configured with a static secret.
#[derive(Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, String>,
}

impl StaticTokenResolver {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl TokenResolver for StaticTokenResolver {
    async fn resolve(&self, _context_id: Uuid, provider: &str) -> Result<String, CoreError> {
        self.tokens
            .get(provider)
            .cloned()
            .ok_or_else(|| CoreError::missing_token(provider))
    }
}
