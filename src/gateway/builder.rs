//! Builder for configuring gateway instances.
//!
//! Every component is injected here; nothing is process-global. The
//! only hard requirement is an inference provider — everything else
//! has an in-memory default, and the semantic tier activates when an
//! embedding provider is supplied.

use std::sync::Arc;

use crate::batching::{BatchEngine, BatchScheduler, RequestQueue};
use crate::cache::{CacheBackend, ExactCache, MemoryBackend, MismatchCalculator, SemanticCache, ThresholdTable};
use crate::config::Settings;
use crate::embedding::{EmbeddingProvider, RetryingEmbedder};
use crate::provider::{BatchExecutor, InferenceProvider, PerRequestExecutor, RetryConfig};
use crate::registry::ModelRegistry;
use crate::routing::{ConstraintInterpreter, Router, TaskDetector};
use crate::similarity::{InMemoryVectorStore, SimilarityStore};
use crate::telemetry::MetricsCollector;
use crate::{AsahiError, Result};

use super::pipeline::Gateway;

/// Main entry point for creating gateway instances.
pub struct Asahi;

impl Asahi {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> AsahiBuilder {
        AsahiBuilder::new()
    }
}

/// Builder for configuring gateway instances.
pub struct AsahiBuilder {
    settings: Option<Settings>,
    registry: Option<ModelRegistry>,
    provider: Option<Arc<dyn InferenceProvider>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    similarity_store: Option<Arc<dyn SimilarityStore>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    executor: Option<Arc<dyn BatchExecutor>>,
    retry: Option<RetryConfig>,
}

impl AsahiBuilder {
    pub fn new() -> Self {
        Self {
            settings: None,
            registry: None,
            provider: None,
            embedder: None,
            similarity_store: None,
            cache_backend: None,
            executor: None,
            retry: None,
        }
    }

    /// Use a parsed configuration instead of the defaults.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Use a specific model catalog instead of the built-in defaults.
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Configure the inference provider (required).
    pub fn provider(mut self, provider: Arc<dyn InferenceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Enable the semantic cache tier with this embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use an external similarity store instead of the in-memory scan.
    pub fn similarity_store(mut self, store: Arc<dyn SimilarityStore>) -> Self {
        self.similarity_store = Some(store);
        self
    }

    /// Back the exact cache with an external key-value store.
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    /// Use a provider-native batch executor instead of sequential
    /// per-request calls.
    pub fn batch_executor(mut self, executor: Arc<dyn BatchExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Override retry behaviour for direct provider calls.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Assemble the gateway.
    ///
    /// The batch scheduler is created but not started; call
    /// [`Gateway::start`] once the gateway is in place.
    pub fn build(self) -> Result<Gateway> {
        let settings = self.settings.unwrap_or_default();
        let provider = self
            .provider
            .ok_or_else(|| AsahiError::Configuration("no inference provider configured".to_string()))?;
        let registry = Arc::new(match self.registry {
            Some(registry) => registry,
            None => ModelRegistry::with_defaults(),
        });
        if registry.is_empty() {
            return Err(AsahiError::NoModelsAvailable);
        }

        let collector = Arc::new(MetricsCollector::new(&settings.observability));

        let cache_backend = self
            .cache_backend
            .unwrap_or_else(|| Arc::new(MemoryBackend::new()));
        let exact_cache = Arc::new(ExactCache::with_backend(
            cache_backend,
            settings.cache.ttl_seconds,
        ));

        let semantic_cache = self.embedder.map(|embedder| {
            let embedder: Arc<dyn EmbeddingProvider> = Arc::new(RetryingEmbedder::new(
                embedder,
                settings.embeddings.max_retries,
            ));
            let store = self
                .similarity_store
                .clone()
                .unwrap_or_else(|| Arc::new(InMemoryVectorStore::new()));
            Arc::new(SemanticCache::with_config(
                embedder,
                store,
                settings.cache.ttl_seconds,
                ThresholdTable::default(),
                MismatchCalculator::new(settings.optimization.quality_penalty_weight),
                settings.optimization.semantic_top_k,
                settings.embeddings.memo_max_entries,
            ))
        });

        let router = Router::new(Arc::clone(&registry));
        let interpreter = ConstraintInterpreter::new(settings.routing.clone());
        let detector = TaskDetector::new();

        let queue = Arc::new(RequestQueue::new());
        let batch_engine = BatchEngine::new(settings.batching.clone(), Arc::clone(&registry));
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(PerRequestExecutor::new(Arc::clone(&provider))));
        let scheduler = Arc::new(
            BatchScheduler::new(
                Arc::clone(&queue),
                executor,
                settings.batching.clone(),
            )
            .with_collector(Arc::clone(&collector)),
        );

        Ok(Gateway::new(
            settings,
            registry,
            router,
            interpreter,
            detector,
            exact_cache,
            semantic_cache,
            provider,
            queue,
            batch_engine,
            scheduler,
            collector,
            self.retry.unwrap_or_default(),
        ))
    }
}

impl Default for AsahiBuilder {
    fn default() -> Self {
        Self::new()
    }
}
