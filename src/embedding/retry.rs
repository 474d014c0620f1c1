//! Retry decorator for embedding providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{EmbeddingProvider, validate_embedding};
use crate::Result;

/// Decorator that wraps an [`EmbeddingProvider`] with retry logic and
/// output validation.
///
/// Transient failures are retried with exponential backoff
/// (`initial_delay * 2^attempt`) up to `max_retries` extra attempts;
/// after exhaustion the last error is surfaced as an embedding error.
/// Every returned vector is checked for the configured dimension and
/// unit norm; a malformed vector is fatal, not retried.
pub struct RetryingEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    max_retries: u32,
    initial_delay: Duration,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            initial_delay: Duration::from_secs(1),
        }
    }

    /// Override the base backoff delay (tests use millisecond delays).
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    async fn call_with_retry<F, Fut, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    if attempt < self.max_retries {
                        let delay = self.initial_delay.saturating_mul(2u32.saturating_pow(attempt));
                        warn!(
                            provider = self.inner.name(),
                            operation,
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying after transient embedding error"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            crate::AsahiError::Embedding("retry loop exhausted without an error".to_string())
        }))
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingEmbedder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self
            .call_with_retry("embed_text", || self.inner.embed_text(text))
            .await?;
        validate_embedding(&vector, self.inner.dimension())?;
        Ok(vector)
    }

    async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let vectors = self
            .call_with_retry("embed_texts", || self.inner.embed_texts(texts))
            .await?;
        for vector in &vectors {
            validate_embedding(vector, self.inner.dimension())?;
        }
        Ok(vectors)
    }
}
