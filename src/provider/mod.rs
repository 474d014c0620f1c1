//! Provider contracts.
//!
//! The gateway never talks to an LLM SDK directly; it goes through two
//! narrow seams. [`InferenceProvider`] completes one prompt against one
//! model. [`BatchExecutor`] completes a slice of queued requests in one
//! provider call; its results must line up positionally with its input,
//! and a short result list is a partial-failure signal the scheduler
//! handles.

mod retry;

pub use retry::{RetryConfig, with_retry};

use async_trait::async_trait;

use crate::Result;
use crate::batching::QueuedRequest;
use crate::registry::estimate_tokens;

/// A completed provider call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// The model's response text.
    pub text: String,
    /// Actual input token count reported by the provider.
    pub input_tokens: u64,
    /// Actual output token count reported by the provider.
    pub output_tokens: u64,
    /// Provider-side latency in milliseconds.
    pub latency_ms: u64,
}

/// Completes a single prompt against a named model.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Provider name for logs and metrics.
    fn name(&self) -> &str;

    async fn complete(&self, model: &str, prompt: &str) -> Result<ProviderResponse>;
}

/// Executes a batch of queued requests in one provider call.
///
/// `results[i]` must correspond to `batch[i]`. Returning fewer results
/// than requests signals partial failure for the tail; returning an
/// error fails the whole batch (the scheduler then retries each request
/// individually).
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn execute(&self, batch: &[QueuedRequest]) -> Result<Vec<ProviderResponse>>;
}

/// Adapter that runs a batch as sequential single-prompt calls.
///
/// The default executor when the configured provider has no native
/// batch API: batching still amortizes queue and connection overhead
/// upstream even when the provider call itself is per-request.
pub struct PerRequestExecutor {
    provider: std::sync::Arc<dyn InferenceProvider>,
}

impl PerRequestExecutor {
    pub fn new(provider: std::sync::Arc<dyn InferenceProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl BatchExecutor for PerRequestExecutor {
    async fn execute(&self, batch: &[QueuedRequest]) -> Result<Vec<ProviderResponse>> {
        let mut results = Vec::with_capacity(batch.len());
        for request in batch {
            results.push(
                self.provider
                    .complete(&request.model, &request.prompt)
                    .await?,
            );
        }
        Ok(results)
    }
}

/// Deterministic provider for tests and offline development.
///
/// Produces a canned response with token counts derived from the
/// prompt, so assertions on cost and cache behavior are stable.
pub struct MockProvider;

#[async_trait]
impl InferenceProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<ProviderResponse> {
        let input_tokens = estimate_tokens(prompt);
        let output_tokens = ((input_tokens as f64 * 0.6) as u64).max(20);
        Ok(ProviderResponse {
            text: format!(
                "[mock response from {model}] processed prompt with {input_tokens} input tokens"
            ),
            input_tokens,
            output_tokens,
            latency_ms: 10,
        })
    }
}
