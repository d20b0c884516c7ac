//! Context-scoped memory store view.
//!
//! Bound to one context at construction. Every stored point carries the
//! context id in its payload; every search applies a mandatory equality
//! filter on it, so records from other contexts are invisible regardless of
//! similarity score.

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use super::{Embedder, Filter, MemoryError, VectorIndex, VectorPoint};

/// A text fragment to remember.
#[derive(Clone, Debug)]
pub struct MemoryRecord {
    pub context_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub text: String,
    pub metadata: Value,
}

impl MemoryRecord {
    pub fn new(context_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            context_id,
            conversation_id: None,
            text: text.into(),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }
}

/// One recalled record, annotated with its conversation.
#[derive(Clone, Debug)]
pub struct MemoryHit {
    pub text: String,
    pub conversation_id: Option<Uuid>,
    pub score: f32,
    pub metadata: Value,
}

/// Per-request view over the shared index, scoped to one context.
#[derive(Clone)]
pub struct MemoryStore {
    context_id: Uuid,
    collection: String,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryStore {
    pub fn new(
        context_id: Uuid,
        collection: impl Into<String>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            context_id,
            collection: collection.into(),
            index,
            embedder,
        }
    }

    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    /// Embeds and upserts one record. The record must be bound to this
    /// store's context.
    pub async fn store(&self, record: MemoryRecord) -> Result<Uuid, MemoryError> {
        if record.context_id != self.context_id {
            return Err(MemoryError::ContextMismatch {
                record: record.context_id,
                store: self.context_id,
            });
        }

        let vectors = self.embedder.embed(&[record.text.as_str()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Embedding("embedder returned no vector".to_string()))?;

        let id = Uuid::new_v4();
        let payload = json!({
            "context_id": record.context_id.to_string(),
            "conversation_id": record.conversation_id.map(|c| c.to_string()),
            "text": record.text,
            "metadata": record.metadata,
        });
        self.index
            .upsert(&self.collection, VectorPoint { id, vector, payload })
            .await?;
        Ok(id)
    }

    /// Semantic search within this context, optionally restricted to one
    /// conversation. A fresh context returns an empty list, never an error.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        conversation_id: Option<Uuid>,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        let vectors = self.embedder.embed(&[query]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Embedding("embedder returned no vector".to_string()))?;

        let mut filter = Filter::new().must_eq("context_id", json!(self.context_id.to_string()));
        if let Some(conversation) = conversation_id {
            filter = filter.must_eq("conversation_id", json!(conversation.to_string()));
        }

        let hits = self
            .index
            .search(&self.collection, &vector, &filter, limit)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| MemoryHit {
                text: hit.payload["text"].as_str().unwrap_or_default().to_string(),
                conversation_id: hit.payload["conversation_id"]
                    .as_str()
                    .and_then(|s| Uuid::parse_str(s).ok()),
                score: hit.score,
                metadata: hit.payload.get("metadata").cloned().unwrap_or(Value::Null),
            })
            .collect())
    }

    /// Formats hits as the numbered list a memory step reports, including
    /// source attribution.
    pub fn format_hits(hits: &[MemoryHit]) -> String {
        if hits.is_empty() {
            return "No matching memories.".to_string();
        }
        let mut out = String::new();
        for (i, hit) in hits.iter().enumerate() {
            let source = hit
                .conversation_id
                .map(|c| format!("conversation {c}"))
                .unwrap_or_else(|| "no conversation".to_string());
            out.push_str(&format!("{}. {} (from {})\n", i + 1, hit.text, source));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{HashingEmbedder, InMemoryVectorIndex};

    fn store_for(context_id: Uuid, index: Arc<dyn VectorIndex>) -> MemoryStore {
        MemoryStore::new(
            context_id,
            "memories",
            index,
            Arc::new(HashingEmbedder::new(64)),
        )
    }

    #[tokio::test]
    async fn rejects_record_bound_to_other_context() {
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        let store = store_for(Uuid::new_v4(), index);
        let foreign = MemoryRecord::new(Uuid::new_v4(), "alpha");
        let err = store.store(foreign).await.unwrap_err();
        assert!(matches!(err, MemoryError::ContextMismatch { .. }));
    }

    #[tokio::test]
    async fn search_is_scoped_to_the_store_context() {
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        let ctx_a = Uuid::new_v4();
        let ctx_b = Uuid::new_v4();
        let store_a = store_for(ctx_a, Arc::clone(&index));
        let store_b = store_for(ctx_b, Arc::clone(&index));

        store_a
            .store(MemoryRecord::new(ctx_a, "alpha fact"))
            .await
            .unwrap();
        store_b
            .store(MemoryRecord::new(ctx_b, "alpha fact"))
            .await
            .unwrap();

        let hits = store_a.search("alpha fact", 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn fresh_context_searches_empty() {
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        let store = store_for(Uuid::new_v4(), index);
        let hits = store.search("anything", 5, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn conversation_filter_restricts_results() {
        let index: Arc<dyn VectorIndex> = Arc::new(InMemoryVectorIndex::new());
        let ctx = Uuid::new_v4();
        let conv = Uuid::new_v4();
        let store = store_for(ctx, index);
        store
            .store(MemoryRecord::new(ctx, "in conversation").with_conversation(conv))
            .await
            .unwrap();
        store
            .store(MemoryRecord::new(ctx, "outside conversation"))
            .await
            .unwrap();

        let hits = store.search("conversation", 10, Some(conv)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].conversation_id, Some(conv));
    }

    #[test]
    fn formatting_numbers_hits_with_attribution() {
        let conv = Uuid::new_v4();
        let hits = vec![
            MemoryHit {
                text: "first".to_string(),
                conversation_id: Some(conv),
                score: 0.9,
                metadata: Value::Null,
            },
            MemoryHit {
                text: "second".to_string(),
                conversation_id: None,
                score: 0.5,
                metadata: Value::Null,
            },
        ];
        let formatted = MemoryStore::format_hits(&hits);
        assert!(formatted.starts_with("1. first"));
        assert!(formatted.contains(&conv.to_string()));
        assert!(formatted.contains("2. second (from no conversation)"));
    }
}
