use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use asahi::batching::QueuedRequest;
use asahi::config::Settings;
use asahi::embedding::EmbeddingProvider;
use asahi::provider::{BatchExecutor, InferenceProvider, MockProvider, ProviderResponse, RetryConfig};
use asahi::registry::{Availability, ModelProfile, ModelRegistry};
use asahi::types::{CacheTier, InferenceRequest};
use asahi::{Asahi, AsahiError, Gateway, Result};

fn mock_gateway() -> Gateway {
    Asahi::builder()
        .provider(Arc::new(MockProvider))
        .build()
        .unwrap()
}

#[tokio::test]
async fn repeated_prompt_is_served_from_the_exact_cache() {
    let gateway = mock_gateway();

    let first = gateway
        .infer(InferenceRequest::new("What is Python?"))
        .await
        .unwrap();
    assert_eq!(first.cache_tier, CacheTier::None);
    assert!(first.cost > 0.0);
    assert!(first.tokens_input > 0);

    let second = gateway
        .infer(InferenceRequest::new("What is Python?"))
        .await
        .unwrap();
    assert_eq!(second.cache_tier, CacheTier::Exact);
    assert_eq!(second.cost, 0.0);
    assert_eq!(second.response, first.response);
    assert_eq!(second.model_used, first.model_used);
    assert_eq!(second.tokens_input, 0);

    // Both requests were recorded; the hit is visible per tier.
    assert_eq!(gateway.collector().total_requests(), 2);
    let stats = gateway.exact_cache().stats().await;
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn empty_prompt_is_rejected_without_side_effects() {
    let gateway = mock_gateway();
    let err = gateway
        .infer(InferenceRequest::new("   "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    assert_eq!(gateway.collector().total_requests(), 0);
    let stats = gateway.exact_cache().stats().await;
    assert_eq!(stats.hits + stats.misses, 0);
    assert_eq!(stats.entry_count, 0);
}

#[tokio::test]
async fn out_of_range_fields_are_validation_errors() {
    let gateway = mock_gateway();

    for request in [
        InferenceRequest::new("ok").with_latency_budget_ms(49),
        InferenceRequest::new("ok").with_latency_budget_ms(30_001),
        InferenceRequest::new("ok").with_quality_threshold(5.5),
        InferenceRequest::new("ok").with_cost_budget(-0.01),
    ] {
        let err = gateway.infer(request).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}

/// Provider that fails specific models, counting calls per model.
struct SelectiveProvider {
    failing: Vec<&'static str>,
    calls: Mutex<HashMap<String, u32>>,
}

impl SelectiveProvider {
    fn failing(models: Vec<&'static str>) -> Self {
        Self {
            failing: models,
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn calls_for(&self, model: &str) -> u32 {
        self.calls.lock().unwrap().get(model).copied().unwrap_or(0)
    }
}

#[async_trait]
impl InferenceProvider for SelectiveProvider {
    fn name(&self) -> &str {
        "selective"
    }

    async fn complete(&self, model: &str, prompt: &str) -> Result<ProviderResponse> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_insert(0) += 1;
        if self.failing.contains(&model) {
            return Err(AsahiError::Provider(format!("{model} unreachable")));
        }
        MockProvider.complete(model, prompt).await
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig::new()
        .max_attempts(2)
        .initial_delay(Duration::from_millis(1))
}

#[tokio::test]
async fn provider_failure_falls_back_to_highest_quality_model() {
    // Default routing picks claude-3-5-sonnet (best quality/cost);
    // failing it must fall back to gpt-4-turbo (highest quality).
    let provider = Arc::new(SelectiveProvider::failing(vec!["claude-3-5-sonnet"]));
    let gateway = Asahi::builder()
        .provider(provider.clone())
        .retry(fast_retry())
        .build()
        .unwrap();

    let result = gateway
        .infer(InferenceRequest::new("hello there general assistant"))
        .await
        .unwrap();

    assert_eq!(result.model_used, "gpt-4-turbo");
    assert!(result.routing_reason.contains("fallback after claude-3-5-sonnet"));
    assert_eq!(provider.calls_for("claude-3-5-sonnet"), 2); // retried
    assert_eq!(provider.calls_for("gpt-4-turbo"), 1);
}

#[tokio::test]
async fn single_model_registry_surfaces_provider_error() {
    let registry = ModelRegistry::from_profiles(vec![ModelProfile {
        name: "only-model".to_string(),
        provider: "openai".to_string(),
        cost_per_1k_input_tokens: 0.01,
        cost_per_1k_output_tokens: 0.03,
        avg_latency_ms: 100,
        quality_score: 4.0,
        max_input_tokens: 8_000,
        max_output_tokens: 1_000,
        description: String::new(),
        availability: Availability::Available,
    }])
    .unwrap();

    let provider = Arc::new(SelectiveProvider::failing(vec!["only-model"]));
    let gateway = Asahi::builder()
        .provider(provider)
        .registry(registry)
        .retry(fast_retry())
        .build()
        .unwrap();

    let err = gateway
        .infer(InferenceRequest::new("anything at all"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "provider");
}

#[tokio::test]
async fn explicit_model_override_bypasses_routing() {
    let gateway = mock_gateway();
    let result = gateway
        .infer(
            InferenceRequest::new("explain this topic")
                .with_model_override("claude-opus-4")
                .with_latency_budget_ms(1000),
        )
        .await
        .unwrap();
    assert_eq!(result.model_used, "claude-opus-4");
    assert!(result.routing_reason.contains("user selected"));

    let err = gateway
        .infer(InferenceRequest::new("x").with_model_override("ghost-model"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "model_not_found");
}

// ---------------------------------------------------------------------------
// Semantic tier through the gateway
// ---------------------------------------------------------------------------

/// Embedder that maps known texts to fixed unit vectors.
struct TableEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    fn name(&self) -> &str {
        "table"
    }

    fn dimension(&self) -> usize {
        3
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
    }
}

#[tokio::test]
async fn paraphrase_is_served_from_the_semantic_cache() {
    let cached = "What is Python?";
    let paraphrase = "Can you explain what Python is?";
    let embedder = TableEmbedder {
        vectors: HashMap::from([
            (cached.to_string(), vec![1.0, 0.0, 0.0]),
            (
                paraphrase.to_string(),
                vec![0.85, (1.0f32 - 0.7225).sqrt(), 0.0],
            ),
        ]),
    };
    let gateway = Asahi::builder()
        .provider(Arc::new(MockProvider))
        .embedder(Arc::new(embedder))
        .build()
        .unwrap();

    let first = gateway.infer(InferenceRequest::new(cached)).await.unwrap();
    assert_eq!(first.cache_tier, CacheTier::None);

    let second = gateway
        .infer(InferenceRequest::new(paraphrase))
        .await
        .unwrap();
    assert_eq!(second.cache_tier, CacheTier::Semantic);
    assert_eq!(second.cost, 0.0);
    assert_eq!(second.response, first.response);
}

// ---------------------------------------------------------------------------
// Batch path through the gateway
// ---------------------------------------------------------------------------

struct CountingBatchExecutor {
    batch_calls: AtomicU32,
    largest_batch: AtomicU32,
}

#[async_trait]
impl BatchExecutor for CountingBatchExecutor {
    async fn execute(&self, batch: &[QueuedRequest]) -> Result<Vec<ProviderResponse>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.largest_batch
            .fetch_max(batch.len() as u32, Ordering::SeqCst);
        let mut results = Vec::with_capacity(batch.len());
        for request in batch {
            results.push(MockProvider.complete(&request.model, &request.prompt).await?);
        }
        Ok(results)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn eligible_requests_coalesce_into_one_batch() {
    let mut settings = Settings::default();
    settings.batching.max_batch_size = 5;
    settings.batching.min_batch_size = 2;
    settings.batching.poll_interval_ms = 10;

    let executor = Arc::new(CountingBatchExecutor {
        batch_calls: AtomicU32::new(0),
        largest_batch: AtomicU32::new(0),
    });
    let gateway = Arc::new(
        Asahi::builder()
            .provider(Arc::new(MockProvider))
            .batch_executor(executor.clone())
            .settings(settings)
            .build()
            .unwrap(),
    );
    gateway.start().unwrap();

    let mut handles = Vec::new();
    for i in 0..5 {
        let gateway = Arc::clone(&gateway);
        handles.push(tokio::spawn(async move {
            gateway
                .infer(
                    InferenceRequest::new(format!("summarize the quarterly report number {i}"))
                        .with_latency_budget_ms(1000),
                )
                .await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.cache_tier, CacheTier::None);
        assert!(result.cost > 0.0);
    }

    // All five summarization requests rode a single executor call.
    assert_eq!(executor.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(executor.largest_batch.load(Ordering::SeqCst), 5);

    gateway.shutdown().await;
}

#[tokio::test]
async fn tight_budget_skips_batching_entirely() {
    let executor = Arc::new(CountingBatchExecutor {
        batch_calls: AtomicU32::new(0),
        largest_batch: AtomicU32::new(0),
    });
    let gateway = Asahi::builder()
        .provider(Arc::new(MockProvider))
        .batch_executor(executor.clone())
        .build()
        .unwrap();
    gateway.start().unwrap();

    // 150ms budget is under the 200ms batching threshold.
    let result = gateway
        .infer(
            InferenceRequest::new("summarize the incident report")
                .with_latency_budget_ms(150),
        )
        .await
        .unwrap();
    assert!(result.cost > 0.0);
    assert_eq!(executor.batch_calls.load(Ordering::SeqCst), 0);

    gateway.shutdown().await;
}

#[tokio::test]
async fn declared_task_id_routes_through_the_batch_layer() {
    let executor = Arc::new(CountingBatchExecutor {
        batch_calls: AtomicU32::new(0),
        largest_batch: AtomicU32::new(0),
    });
    let mut settings = Settings::default();
    settings.batching.poll_interval_ms = 10;
    let gateway = Asahi::builder()
        .provider(Arc::new(MockProvider))
        .batch_executor(executor.clone())
        .settings(settings)
        .build()
        .unwrap();
    gateway.start().unwrap();

    // The prompt itself reads as general chat, but the declared task id
    // makes it batchable; alone in its group, it flushes on deadline.
    let result = gateway
        .infer(
            InferenceRequest::new("tell me something nice")
                .with_task_id("summarization")
                .with_latency_budget_ms(1000),
        )
        .await
        .unwrap();
    assert!(result.cost > 0.0);
    assert_eq!(executor.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(executor.largest_batch.load(Ordering::SeqCst), 1);

    gateway.shutdown().await;
}

#[tokio::test]
async fn builder_requires_a_provider() {
    let err = Asahi::builder().build().unwrap_err();
    assert_eq!(err.kind(), "configuration");
}
