//! Embedder trait. Used to produce vectors from text for store and search.
//!
//! Implementations can wrap OpenAI-compatible endpoints or deterministic
//! local embedders for offline use and tests.

use async_trait::async_trait;

use super::MemoryError;

/// Produces fixed-size float vectors from text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds each text into a vector of dimension [`Embedder::dimension`].
    /// Returns one vector per input text in the same order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, MemoryError>;

    /// Vector dimension returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;
}

/// Deterministic token-hash embedder. No network, identical inputs produce
/// identical vectors; similarity tracks token overlap. Suitable for offline
/// deployments and tests, not for production recall quality.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, MemoryError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dimension];
                for token in text.to_lowercase().split_whitespace() {
                    let mut h: u64 = 1469598103934665603;
                    for b in token.bytes() {
                        h ^= b as u64;
                        h = h.wrapping_mul(1099511628211);
                    }
                    vector[(h % self.dimension as u64) as usize] += 1.0;
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_inputs_embed_identically() {
        let e = HashingEmbedder::new(64);
        let a = e.embed(&["alpha beta"]).await.unwrap();
        let b = e.embed(&["alpha beta"]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[tokio::test]
    async fn one_vector_per_input_in_order() {
        let e = HashingEmbedder::default();
        let out = e.embed(&["x", "y", "z"]).await.unwrap();
        assert_eq!(out.len(), 3);
    }
}
