//! Context-scoped semantic recall.
//!
//! The vector database and embedder are consumed surfaces: [`VectorIndex`]
//! and [`Embedder`] traits, with an in-process index as the default backend.
//! [`MemoryStore`] is the per-request view bound to one context; every point
//! it writes carries the context id in its payload and every search applies a
//! mandatory context filter.

mod embedder;
mod index;
mod openai_embedder;
mod store;

pub use embedder::{Embedder, HashingEmbedder};
pub use index::{Filter, InMemoryVectorIndex, SearchHit, VectorIndex, VectorPoint};
pub use openai_embedder::OpenAiEmbedder;
pub use store::{MemoryHit, MemoryRecord, MemoryStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("embedding: {0}")]
    Embedding(String),
    #[error("vector index: {0}")]
    Index(String),
    #[error("record context {record} does not match store context {store}")]
    ContextMismatch {
        record: uuid::Uuid,
        store: uuid::Uuid,
    },
}

impl From<MemoryError> for crate::error::CoreError {
    fn from(err: MemoryError) -> Self {
        use crate::error::{codes, CoreError};
        match err {
            MemoryError::ContextMismatch { .. } => {
                CoreError::fatal(codes::MEMORY_UNAVAILABLE, err.to_string())
            }
            _ => CoreError::transient(codes::MEMORY_UNAVAILABLE, err.to_string()),
        }
    }
}
