//! Embedding provider contract and helpers.
//!
//! Embeddings are the foundation of the semantic cache: every cached
//! prompt and every lookup query is reduced to a unit-norm vector so
//! that dot product equals cosine similarity. The provider itself is
//! external and pluggable; this module defines the contract, a
//! retrying decorator for transient failures, vector math helpers, and
//! a deterministic mock for tests.

mod retry;

pub use retry::RetryingEmbedder;

use async_trait::async_trait;

use crate::{AsahiError, Result};

/// Tolerance when checking that a vector is unit-norm.
pub const NORM_EPSILON: f32 = 1e-3;

/// Produces dense vector embeddings for text.
///
/// Implementations must return L2-normalized vectors of a fixed
/// dimension. The gateway rejects vectors that are the wrong size or
/// not unit-norm rather than silently storing garbage.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logs and metrics.
    fn name(&self) -> &str;

    /// The dimension every returned vector must have.
    fn dimension(&self) -> usize;

    /// Embed a single non-empty text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts, preserving input order.
    ///
    /// The default implementation loops over [`embed_text`]; providers
    /// with a batch API should override it.
    ///
    /// [`embed_text`]: EmbeddingProvider::embed_text
    async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_text(text).await?);
        }
        Ok(out)
    }
}

/// Validate that `vector` has the expected dimension and unit norm.
pub fn validate_embedding(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(AsahiError::Embedding(format!(
            "dimension mismatch: expected {dimension}, got {}",
            vector.len()
        )));
    }
    let norm = l2_norm(vector);
    if (norm - 1.0).abs() > NORM_EPSILON {
        return Err(AsahiError::Embedding(format!(
            "vector is not unit-norm (norm = {norm:.4})"
        )));
    }
    Ok(())
}

/// L2 norm of a vector.
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = l2_norm(vector);
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity between two vectors of equal dimension, clamped
/// to [-1, 1] against floating-point drift.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(AsahiError::Embedding(format!(
            "dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let norm_a = l2_norm(a) as f64;
    let norm_b = l2_norm(b) as f64;
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Deterministic embedder for tests and offline development.
///
/// Hashes the text into a seed and expands it into a pseudo-random
/// unit vector, so the same text always embeds identically while
/// distinct texts land far apart.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn name(&self) -> &str {
        "mock"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AsahiError::Embedding("text must not be empty".to_string()));
        }
        let mut state = fxhash(text.as_bytes());
        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            // xorshift64* keeps the sequence deterministic per seed
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
            vector.push((unit * 2.0 - 1.0) as f32);
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

fn fxhash(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    // A zero seed would collapse xorshift to all zeros.
    hash | 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[tokio::test]
    async fn mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(64);
        let a = embedder.embed_text("hello world").await.unwrap();
        let b = embedder.embed_text("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn mock_embedder_returns_unit_vectors() {
        let embedder = MockEmbedder::new(64);
        let v = embedder.embed_text("some text").await.unwrap();
        assert_relative_eq!(l2_norm(&v), 1.0, epsilon = 1e-5);
        assert!(validate_embedding(&v, 64).is_ok());
    }

    #[tokio::test]
    async fn mock_embedder_rejects_empty_text() {
        let embedder = MockEmbedder::new(8);
        assert!(embedder.embed_text("   ").await.is_err());
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.6, 0.8];
        assert_relative_eq!(cosine_similarity(&v, &v).unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert_relative_eq!(cosine_similarity(&a, &b).unwrap(), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn cosine_rejects_dimension_mismatch() {
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).is_err());
    }

    #[test]
    fn validate_rejects_non_unit_vector() {
        assert!(validate_embedding(&[3.0, 4.0], 2).is_err());
    }
}
