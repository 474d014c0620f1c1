//! The request-handling pipeline.
//!
//! One [`Gateway`] owns a request's whole lifecycle: validate, check
//! the exact cache, check the semantic cache against the live
//! recompute estimate, route under constraints, batch or call the
//! provider directly, account the cost, repopulate both cache tiers,
//! and record the inference event. The gateway is reentrant and may be
//! called from many tasks concurrently.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::batching::{BatchEligibility, BatchEngine, BatchScheduler, QueuedRequest, RequestQueue};
use crate::cache::{ExactCache, SemanticCache, SemanticLookup};
use crate::config::Settings;
use crate::provider::{InferenceProvider, ProviderResponse, RetryConfig, with_retry};
use crate::registry::{ModelRegistry, calculate_cost, estimate_tokens};
use crate::routing::{ConstraintInterpreter, Router, RoutingConstraints, RoutingDecision, TaskDetector};
use crate::telemetry::{InferenceEvent, MetricsCollector};
use crate::types::{CacheTier, InferenceRequest, InferenceResult, TaskType};
use crate::{AsahiError, Result};

/// The cost-optimizing inference gateway.
///
/// Construct via [`Asahi::builder()`](crate::gateway::Asahi::builder).
pub struct Gateway {
    settings: Settings,
    registry: Arc<ModelRegistry>,
    router: Router,
    interpreter: ConstraintInterpreter,
    detector: TaskDetector,
    exact_cache: Arc<ExactCache>,
    semantic_cache: Option<Arc<SemanticCache>>,
    provider: Arc<dyn InferenceProvider>,
    queue: Arc<RequestQueue>,
    batch_engine: BatchEngine,
    scheduler: Arc<BatchScheduler>,
    collector: Arc<MetricsCollector>,
    retry: RetryConfig,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway").finish_non_exhaustive()
    }
}

impl Gateway {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        settings: Settings,
        registry: Arc<ModelRegistry>,
        router: Router,
        interpreter: ConstraintInterpreter,
        detector: TaskDetector,
        exact_cache: Arc<ExactCache>,
        semantic_cache: Option<Arc<SemanticCache>>,
        provider: Arc<dyn InferenceProvider>,
        queue: Arc<RequestQueue>,
        batch_engine: BatchEngine,
        scheduler: Arc<BatchScheduler>,
        collector: Arc<MetricsCollector>,
        retry: RetryConfig,
    ) -> Self {
        Self {
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
            retry,
        }
    }

    /// Start the background batch scheduler.
    pub fn start(&self) -> Result<()> {
        self.scheduler.start()
    }

    /// Stop the scheduler, draining queued requests.
    pub async fn shutdown(&self) {
        self.scheduler.stop(Duration::from_secs(5)).await;
    }

    /// Run one request through the full pipeline.
    pub async fn infer(&self, request: InferenceRequest) -> Result<InferenceResult> {
        let request_id = Uuid::new_v4().simple().to_string();
        // Validation failures cause no cache traffic and no event.
        request.validate().inspect_err(|e| {
            warn!(request_id = %request_id, error = %e, "request rejected");
        })?;

        let started = Instant::now();
        let tenant = request.tenant_id.as_deref();

        // Tier 1: exact match.
        let t1_start = Instant::now();
        if let Some(entry) = self.exact_cache.get(&request.prompt, tenant).await {
            let lookup_ms = elapsed_ms(t1_start);
            self.collector
                .record_cache_event(CacheTier::Exact, true, lookup_ms as f64);
            self.collector.record_savings("caching", entry.cost);
            let task = self.classify(&request);
            let result = InferenceResult {
                request_id: request_id.clone(),
                response: entry.response,
                model_used: entry.model,
                tokens_input: 0,
                tokens_output: 0,
                cost: 0.0,
                latency_ms: elapsed_ms(started),
                cache_tier: CacheTier::Exact,
                routing_reason: "cache hit (exact match)".to_string(),
            };
            self.record_event(&request, &result, task, None);
            return Ok(result);
        }
        self.collector
            .record_cache_event(CacheTier::Exact, false, elapsed_ms(t1_start) as f64);

        let task = self.classify(&request);

        // Route before the semantic lookup so the admission rule can
        // compare against what recomputing would actually cost.
        let constraints = self.interpreter.apply_task_overrides(
            RoutingConstraints {
                min_quality: request.quality_threshold,
                max_latency_ms: request.latency_budget_ms,
                max_cost_per_request: request.cost_budget,
            },
            task,
        );
        let route_start = Instant::now();
        let mut decision = match &request.model_override {
            Some(model) => {
                let explicit = self.router.route_explicit(model, &request.prompt)?;
                RoutingDecision {
                    model_name: explicit.model_name,
                    score: 0.0,
                    reason: explicit.reason,
                    candidates_considered: explicit.alternatives.len() + 1,
                    fallback_used: false,
                }
            }
            None => self.router.select_model(&constraints)?,
        };
        self.collector
            .record_routing_decision(&decision.model_name, elapsed_ms(route_start) as f64);

        let recompute_cost = self.estimate_recompute_cost(&decision.model_name, &request.prompt)?;

        // Tier 2: semantic similarity.
        if let Some(semantic) = &self.semantic_cache {
            let t2_start = Instant::now();
            match semantic
                .lookup(&request.prompt, task, request.cost_sensitivity, recompute_cost)
                .await
            {
                SemanticLookup::Hit(hit) => {
                    self.collector.record_cache_event(
                        CacheTier::Semantic,
                        true,
                        elapsed_ms(t2_start) as f64,
                    );
                    self.collector.record_savings("caching", hit.original_cost);
                    let result = InferenceResult {
                        request_id: request_id.clone(),
                        response: hit.response,
                        model_used: hit.model,
                        tokens_input: 0,
                        tokens_output: 0,
                        cost: 0.0,
                        latency_ms: elapsed_ms(started),
                        cache_tier: CacheTier::Semantic,
                        routing_reason: hit.reason,
                    };
                    self.record_event(&request, &result, task, None);
                    return Ok(result);
                }
                SemanticLookup::Miss { reason } => {
                    self.collector.record_cache_event(
                        CacheTier::Semantic,
                        false,
                        elapsed_ms(t2_start) as f64,
                    );
                    tracing::debug!(request_id = %request_id, reason = %reason, "semantic miss");
                }
            }
        }

        // Execute: coalesce into a batch when eligible, else call the
        // provider directly. Explicit model choices skip batching.
        let eligibility = if request.model_override.is_some() {
            BatchEligibility::Ineligible {
                reason: "explicit model override".to_string(),
            }
        } else {
            self.batch_engine.evaluate(
                &request.prompt,
                task,
                &decision.model_name,
                request.latency_budget_ms,
            )
        };

        let response = match eligibility {
            BatchEligibility::Eligible {
                batch_group,
                max_wait_ms,
            } if self.scheduler.is_running() => {
                self.execute_batched(
                    &request_id,
                    &request.prompt,
                    &decision.model_name,
                    batch_group,
                    max_wait_ms,
                )
                .await?
            }
            _ => {
                let (response, final_decision) = self
                    .execute_direct(&request_id, &request.prompt, decision)
                    .await?;
                decision = final_decision;
                response
            }
        };

        // Account, repopulate caches, record.
        let profile = self.registry.get(&decision.model_name)?;
        let cost = calculate_cost(profile, response.input_tokens, response.output_tokens);

        if let Err(e) = self
            .exact_cache
            .set(&request.prompt, &response.text, &decision.model_name, cost, tenant)
            .await
        {
            warn!(request_id = %request_id, error = %e, "exact cache set rejected");
        }
        if let Some(semantic) = &self.semantic_cache {
            semantic
                .insert(&request.prompt, &response.text, &decision.model_name, cost, task)
                .await;
        }

        let result = InferenceResult {
            request_id: request_id.clone(),
            response: response.text,
            model_used: decision.model_name.clone(),
            tokens_input: response.input_tokens,
            tokens_output: response.output_tokens,
            cost,
            latency_ms: elapsed_ms(started),
            cache_tier: CacheTier::None,
            routing_reason: decision.reason.clone(),
        };
        self.record_event(&request, &result, task, Some(profile.quality_score));
        info!(
            request_id = %request_id,
            model = %result.model_used,
            cost = result.cost,
            latency_ms = result.latency_ms,
            "inference completed"
        );
        Ok(result)
    }

    /// Enqueue into the batch layer and wait for the handle.
    async fn execute_batched(
        &self,
        request_id: &str,
        prompt: &str,
        model: &str,
        batch_group: String,
        max_wait_ms: u64,
    ) -> Result<ProviderResponse> {
        let deadline = Utc::now() + chrono::Duration::milliseconds(max_wait_ms as i64);
        let (queued, receiver) =
            QueuedRequest::new(request_id, prompt, model, batch_group, deadline);
        self.queue.enqueue(queued)?;
        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(AsahiError::Batching(
                "completion handle dropped before resolution".to_string(),
            )),
        }
    }

    /// Direct provider call with retries and one cross-model fallback.
    async fn execute_direct(
        &self,
        request_id: &str,
        prompt: &str,
        decision: RoutingDecision,
    ) -> Result<(ProviderResponse, RoutingDecision)> {
        let primary = decision.model_name.clone();
        match with_retry(&self.retry, self.provider.name(), "complete", || {
            self.provider.complete(&primary, prompt)
        })
        .await
        {
            Ok(response) => Ok((response, decision)),
            Err(primary_err) => {
                self.collector.record_error(primary_err.kind(), "gateway");
                warn!(
                    request_id,
                    failed_model = %primary,
                    error = %primary_err,
                    "primary model failed, attempting fallback"
                );
                let fallback = self.router.highest_quality_available()?;
                if fallback.name == primary {
                    return Err(primary_err);
                }
                let fallback_name = fallback.name.clone();
                let response = with_retry(&self.retry, self.provider.name(), "complete", || {
                    self.provider.complete(&fallback_name, prompt)
                })
                .await
                .inspect_err(|e| {
                    self.collector.record_error(e.kind(), "gateway");
                })?;
                let fallback_decision = RoutingDecision {
                    model_name: fallback_name.clone(),
                    score: 0.0,
                    reason: format!("fallback after {primary} failed"),
                    candidates_considered: decision.candidates_considered,
                    fallback_used: true,
                };
                Ok((response, fallback_decision))
            }
        }
    }

    /// A task id naming a known task type is an explicit declaration;
    /// otherwise the detector classifies the prompt.
    fn classify(&self, request: &InferenceRequest) -> TaskType {
        request
            .task_id
            .as_deref()
            .and_then(TaskType::parse)
            .unwrap_or_else(|| self.detector.detect_or_general(&request.prompt))
    }

    /// Expected cost of serving this prompt fresh on the chosen model.
    fn estimate_recompute_cost(&self, model: &str, prompt: &str) -> Result<f64> {
        let profile = self.registry.get(model)?;
        let input_tokens = estimate_tokens(prompt);
        let output_tokens = ((input_tokens as f64 * 0.6) as u64).max(20);
        Ok(calculate_cost(profile, input_tokens, output_tokens))
    }

    fn record_event(
        &self,
        request: &InferenceRequest,
        result: &InferenceResult,
        task: TaskType,
        quality_score: Option<f64>,
    ) {
        let event = InferenceEvent {
            request_id: result.request_id.clone(),
            timestamp: Utc::now(),
            tenant_id: request.tenant_id.clone(),
            user_id: request.user_id.clone(),
            task_type: task,
            model: result.model_used.clone(),
            cache_tier: result.cache_tier,
            input_tokens: result.tokens_input,
            output_tokens: result.tokens_output,
            total_tokens: result.tokens_input + result.tokens_output,
            latency_ms: result.latency_ms,
            cost: result.cost,
            routing_reason: result.routing_reason.clone(),
            quality_score,
        };
        self.collector.record_inference(&event);
    }

    // ------------------------------------------------------------------
    // Component access
    // ------------------------------------------------------------------

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn exact_cache(&self) -> &ExactCache {
        &self.exact_cache
    }

    pub fn semantic_cache(&self) -> Option<&SemanticCache> {
        self.semantic_cache.as_deref()
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }

    /// Remove a queued request by id (cancellation). Has no effect on
    /// an already-dispatched batch.
    pub fn cancel_queued(&self, request_id: &str) -> bool {
        self.queue.remove(request_id)
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
