//! Vector index surface and the in-process implementation.
//!
//! Filters are equality conjunctions over payload fields; `context_id` is
//! always one of them when the index is used through [`super::MemoryStore`].

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use super::MemoryError;

/// One stored point: vector plus opaque payload.
#[derive(Clone, Debug)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Value,
}

/// One search result.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f32,
    pub payload: Value,
}

/// Equality conjunction over payload fields.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.conditions.push((field.into(), value));
        self
    }

    /// True when every condition matches the payload exactly. A payload
    /// missing a filtered field never matches.
    pub fn matches(&self, payload: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| payload.get(field) == Some(value))
    }
}

/// Consumed vector store surface.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, collection: &str, point: VectorPoint) -> Result<(), MemoryError>;

    /// Top `limit` points by similarity among those matching `filter`.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, MemoryError>;
}

/// Pure in-memory vector index. All data is lost when dropped.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    collections: DashMap<String, DashMap<Uuid, VectorPoint>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes cosine similarity between two vectors.
    ///
    /// Returns 0.0 if either vector has zero magnitude.
    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot_product / (norm_a * norm_b)
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, collection: &str, point: VectorPoint) -> Result<(), MemoryError> {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(point.id, point);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<SearchHit>, MemoryError> {
        let Some(points) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = points
            .iter()
            .filter(|entry| filter.matches(&entry.payload))
            .map(|entry| SearchHit {
                id: entry.id,
                score: Self::cosine_similarity(vector, &entry.vector),
                payload: entry.payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}
