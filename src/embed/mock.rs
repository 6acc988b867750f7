//! Deterministic hash-based embedder for tests, matching the wiring
//! `wg-ragsmith`'s integration tests exercise: same text, same vector,
//! different text, different vector, with no network or model download.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{validate_nonempty, EmbeddingProvider};
use crate::error::Result;

pub struct MockEmbeddingProvider {
    dimension: usize,
    identity: String,
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::with_dimension(32)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            identity: "mock/deterministic-hash@1".into(),
        }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        validate_nonempty(text)?;
        Ok(hash_to_vector(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_identity(&self) -> &str {
        &self.identity
    }
}

fn hash_to_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = Vec::with_capacity(dimension);
    let mut counter: u32 = 0;
    while vector.len() < dimension {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for byte in digest {
            if vector.len() == dimension {
                break;
            }
            // Map into [-1, 1] so cosine similarity behaves sensibly.
            vector.push((byte as f32 / 127.5) - 1.0);
        }
        counter += 1;
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_is_deterministic() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn different_text_differs() {
        let provider = MockEmbeddingProvider::new();
        let a = provider.embed("hello world").await.unwrap();
        let b = provider.embed("goodbye world").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn vector_has_declared_dimension() {
        let provider = MockEmbeddingProvider::with_dimension(16);
        let v = provider.embed("anything").await.unwrap();
        assert_eq!(v.len(), 16);
        assert_eq!(provider.dimension(), 16);
    }

    #[tokio::test]
    async fn rejects_empty_text() {
        let provider = MockEmbeddingProvider::new();
        assert!(provider.embed("   ").await.is_err());
    }
}
