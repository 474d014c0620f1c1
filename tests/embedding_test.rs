use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use asahi::embedding::{EmbeddingProvider, MockEmbedder, RetryingEmbedder};
use asahi::{AsahiError, Result};

/// Embedder that fails N times then delegates to the mock.
struct FailThenSucceed {
    fail_count: AtomicU32,
    total_calls: AtomicU32,
    inner: MockEmbedder,
}

impl FailThenSucceed {
    fn new(failures: u32) -> Self {
        Self {
            fail_count: AtomicU32::new(failures),
            total_calls: AtomicU32::new(0),
            inner: MockEmbedder::new(8),
        }
    }

    fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EmbeddingProvider for FailThenSucceed {
    fn name(&self) -> &str {
        "flaky"
    }

    fn dimension(&self) -> usize {
        8
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_count.load(Ordering::Relaxed) > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Err(AsahiError::Embedding("embedding API timeout".to_string()));
        }
        self.inner.embed_text(text).await
    }
}

#[tokio::test]
async fn retries_transient_failures_then_succeeds() {
    let inner = Arc::new(FailThenSucceed::new(2));
    let embedder = RetryingEmbedder::new(inner.clone(), 3)
        .with_initial_delay(Duration::from_millis(1));

    let vector = embedder.embed_text("hello").await.unwrap();
    assert_eq!(vector.len(), 8);
    assert_eq!(inner.call_count(), 3); // 2 failures + 1 success
}

#[tokio::test]
async fn gives_up_after_exhausting_retries() {
    let inner = Arc::new(FailThenSucceed::new(100));
    let embedder = RetryingEmbedder::new(inner.clone(), 2)
        .with_initial_delay(Duration::from_millis(1));

    let err = embedder.embed_text("hello").await.unwrap_err();
    assert_eq!(err.kind(), "embedding");
    assert_eq!(inner.call_count(), 3); // initial + 2 retries
}

/// Embedder that returns vectors of the wrong dimension.
struct WrongDimension;

#[async_trait]
impl EmbeddingProvider for WrongDimension {
    fn name(&self) -> &str {
        "wrong-dim"
    }

    fn dimension(&self) -> usize {
        4
    }

    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0]) // dimension 2, not 4
    }
}

#[tokio::test]
async fn dimension_mismatch_is_fatal() {
    let embedder = RetryingEmbedder::new(Arc::new(WrongDimension), 3)
        .with_initial_delay(Duration::from_millis(1));
    let err = embedder.embed_text("hello").await.unwrap_err();
    assert_eq!(err.kind(), "embedding");
}

/// Embedder returning non-normalized vectors.
struct NotNormalized;

#[async_trait]
impl EmbeddingProvider for NotNormalized {
    fn name(&self) -> &str {
        "denorm"
    }

    fn dimension(&self) -> usize {
        2
    }

    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![3.0, 4.0])
    }
}

#[tokio::test]
async fn non_unit_vectors_are_rejected() {
    let embedder = RetryingEmbedder::new(Arc::new(NotNormalized), 0);
    let err = embedder.embed_text("hello").await.unwrap_err();
    assert_eq!(err.kind(), "embedding");
}

#[tokio::test]
async fn batch_embedding_preserves_order() {
    let embedder = MockEmbedder::new(16);
    let texts = ["first", "second", "third"];
    let batch = embedder.embed_texts(&texts).await.unwrap();
    assert_eq!(batch.len(), 3);
    for (text, vector) in texts.iter().zip(&batch) {
        assert_eq!(vector, &embedder.embed_text(text).await.unwrap());
    }
}
