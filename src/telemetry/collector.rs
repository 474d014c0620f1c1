//! Central metrics collector.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::event::InferenceEvent;
use super::names;
use crate::config::ObservabilitySettings;
use crate::types::{CacheTier, TaskType};

/// Histogram bucket boundaries for latency in milliseconds.
pub const LATENCY_BUCKETS: [f64; 11] = [
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Histogram bucket boundaries for token counts.
pub const TOKEN_BUCKETS: [f64; 9] = [
    10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Histogram bucket boundaries for batch sizes.
pub const BATCH_SIZE_BUCKETS: [f64; 8] = [1.0, 2.0, 3.0, 5.0, 8.0, 10.0, 15.0, 20.0];

/// A timestamped latency observation.
#[derive(Debug, Clone, Copy)]
pub struct LatencySample {
    pub at: DateTime<Utc>,
    pub value_ms: f64,
}

/// A reduced view of one inference event, as consumed by analytics.
#[derive(Debug, Clone)]
pub struct EventSample {
    pub at: DateTime<Utc>,
    pub model: String,
    pub task_type: TaskType,
    pub cache_tier: CacheTier,
    pub user_id: Option<String>,
    pub cost: f64,
    pub latency_ms: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Per-tier cache counters.
#[derive(Debug, Clone, Copy)]
pub struct TierCacheStats {
    pub tier: CacheTier,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// An error counter row.
#[derive(Debug, Clone)]
pub struct ErrorCount {
    pub error_type: String,
    pub component: String,
    pub count: u64,
}

/// Aggregated summary over a recent time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSummary {
    pub window_minutes: i64,
    pub total_requests: usize,
    pub total_cost: f64,
    pub avg_latency_ms: f64,
    pub cache_hit_rate: f64,
    pub error_count: u64,
    /// Most-used models in the window, descending by request count.
    pub top_models: Vec<(String, u64)>,
}

#[derive(Default)]
struct CollectorState {
    // (model, task_type, cache_tier) -> count
    requests_total: HashMap<(String, &'static str, &'static str), u64>,
    cost_total: HashMap<String, f64>,
    savings_total: HashMap<String, f64>,
    cache_hits: HashMap<&'static str, u64>,
    cache_misses: HashMap<&'static str, u64>,
    cache_hit_rate: HashMap<&'static str, f64>,
    errors_total: HashMap<(String, String), u64>,
    latency_observations: Vec<LatencySample>,
    token_observations: Vec<(DateTime<Utc>, f64)>,
    batch_size_observations: Vec<(DateTime<Utc>, f64)>,
    quality_scores: HashMap<String, Vec<f64>>,
    events: Vec<EventSample>,
}

/// Thread-safe aggregation hub for all Asahi operational metrics.
///
/// One mutex guards the whole state; recording methods keep their
/// critical sections short and never hold the lock across I/O.
pub struct MetricsCollector {
    enabled: bool,
    retention: Duration,
    inner: Mutex<CollectorState>,
}

impl MetricsCollector {
    pub fn new(settings: &ObservabilitySettings) -> Self {
        info!(enabled = settings.enabled, "metrics collector initialised");
        Self {
            enabled: settings.enabled,
            retention: Duration::hours(settings.retention_hours as i64),
            inner: Mutex::new(CollectorState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CollectorState> {
        // A poisoned telemetry lock should not take the gateway down.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Record a completed inference event.
    ///
    /// Windows and trends operate on the event's own timestamp; events
    /// are appended in the order the collector observes them.
    pub fn record_inference(&self, event: &InferenceEvent) {
        if !self.enabled {
            return;
        }
        let tier = event.cache_tier.as_str();
        let task = event.task_type.as_str();

        {
            let mut state = self.lock();
            *state
                .requests_total
                .entry((event.model.clone(), task, tier))
                .or_insert(0) += 1;
            *state.cost_total.entry(event.model.clone()).or_insert(0.0) += event.cost;

            state.latency_observations.push(LatencySample {
                at: event.timestamp,
                value_ms: event.latency_ms as f64,
            });
            state
                .token_observations
                .push((event.timestamp, event.input_tokens as f64));
            state
                .token_observations
                .push((event.timestamp, event.output_tokens as f64));

            if let Some(quality) = event.quality_score {
                state
                    .quality_scores
                    .entry(event.model.clone())
                    .or_default()
                    .push(quality);
            }

            state.events.push(EventSample {
                at: event.timestamp,
                model: event.model.clone(),
                task_type: event.task_type,
                cache_tier: event.cache_tier,
                user_id: event.user_id.clone(),
                cost: event.cost,
                latency_ms: event.latency_ms as f64,
                input_tokens: event.input_tokens,
                output_tokens: event.output_tokens,
            });
        }

        metrics::counter!(
            names::REQUESTS_TOTAL,
            "model" => event.model.clone(),
            "task_type" => task,
            "cache_tier" => tier,
        )
        .increment(1);
        metrics::histogram!(names::LATENCY_MS).record(event.latency_ms as f64);

        debug!(model = %event.model, cost = event.cost, "inference event recorded");
    }

    /// Record a cache lookup result.
    pub fn record_cache_event(&self, tier: CacheTier, hit: bool, latency_ms: f64) {
        if !self.enabled {
            return;
        }
        let label = tier.as_str();
        {
            let mut state = self.lock();
            if hit {
                *state.cache_hits.entry(label).or_insert(0) += 1;
            } else {
                *state.cache_misses.entry(label).or_insert(0) += 1;
            }
            let hits = state.cache_hits.get(label).copied().unwrap_or(0);
            let misses = state.cache_misses.get(label).copied().unwrap_or(0);
            let total = hits + misses;
            state.cache_hit_rate.insert(
                label,
                if total > 0 {
                    hits as f64 / total as f64
                } else {
                    0.0
                },
            );
            state.latency_observations.push(LatencySample {
                at: Utc::now(),
                value_ms: latency_ms,
            });
        }

        let name = if hit {
            names::CACHE_HITS_TOTAL
        } else {
            names::CACHE_MISSES_TOTAL
        };
        metrics::counter!(name, "tier" => label).increment(1);
    }

    /// Record a routing decision's deliberation latency.
    pub fn record_routing_decision(&self, model: &str, latency_ms: f64) {
        if !self.enabled {
            return;
        }
        self.lock().latency_observations.push(LatencySample {
            at: Utc::now(),
            value_ms: latency_ms,
        });
        debug!(model, latency_ms, "routing decision recorded");
    }

    /// Record a batch execution.
    pub fn record_batch_event(&self, batch_size: usize, savings: f64) {
        if !self.enabled {
            return;
        }
        {
            let mut state = self.lock();
            state
                .batch_size_observations
                .push((Utc::now(), batch_size as f64));
            if savings != 0.0 {
                *state
                    .savings_total
                    .entry("batching".to_string())
                    .or_insert(0.0) += savings;
            }
        }
        metrics::histogram!(names::BATCH_SIZE).record(batch_size as f64);
    }

    /// Record an error occurrence.
    pub fn record_error(&self, error_type: &str, component: &str) {
        if !self.enabled {
            return;
        }
        *self
            .lock()
            .errors_total
            .entry((error_type.to_string(), component.to_string()))
            .or_insert(0) += 1;
        metrics::counter!(
            names::ERRORS_TOTAL,
            "error_type" => error_type.to_string(),
            "component" => component.to_string(),
        )
        .increment(1);
    }

    /// Record dollar savings attributed to a phase.
    pub fn record_savings(&self, phase: &str, amount: f64) {
        if !self.enabled {
            return;
        }
        *self
            .lock()
            .savings_total
            .entry(phase.to_string())
            .or_insert(0.0) += amount;
    }

    // ------------------------------------------------------------------
    // Prometheus exposition
    // ------------------------------------------------------------------

    /// All metrics in Prometheus text exposition format.
    pub fn exposition(&self) -> String {
        let state = self.lock();
        let mut out = String::new();

        out.push_str("# HELP asahi_requests_total Total inference requests\n");
        out.push_str("# TYPE asahi_requests_total counter\n");
        let mut request_rows: Vec<_> = state.requests_total.iter().collect();
        request_rows.sort_by(|a, b| a.0.cmp(b.0));
        for ((model, task, tier), value) in request_rows {
            let _ = writeln!(
                out,
                "asahi_requests_total{{model=\"{model}\",task_type=\"{task}\",cache_tier=\"{tier}\"}} {value}"
            );
        }

        out.push_str("# HELP asahi_cost_dollars_total Total cost in dollars\n");
        out.push_str("# TYPE asahi_cost_dollars_total counter\n");
        let mut cost_rows: Vec<_> = state.cost_total.iter().collect();
        cost_rows.sort_by(|a, b| a.0.cmp(b.0));
        for (model, value) in cost_rows {
            let _ = writeln!(out, "asahi_cost_dollars_total{{model=\"{model}\"}} {value:.6}");
        }

        out.push_str("# HELP asahi_savings_dollars_total Total savings\n");
        out.push_str("# TYPE asahi_savings_dollars_total counter\n");
        let mut savings_rows: Vec<_> = state.savings_total.iter().collect();
        savings_rows.sort_by(|a, b| a.0.cmp(b.0));
        for (phase, value) in savings_rows {
            let _ = writeln!(
                out,
                "asahi_savings_dollars_total{{phase=\"{phase}\"}} {value:.6}"
            );
        }

        out.push_str("# HELP asahi_cache_hits_total Cache hits by tier\n");
        out.push_str("# TYPE asahi_cache_hits_total counter\n");
        let mut hit_rows: Vec<_> = state.cache_hits.iter().collect();
        hit_rows.sort_by(|a, b| a.0.cmp(b.0));
        for (tier, value) in hit_rows {
            let _ = writeln!(out, "asahi_cache_hits_total{{tier=\"{tier}\"}} {value}");
        }

        out.push_str("# HELP asahi_cache_misses_total Cache misses by tier\n");
        out.push_str("# TYPE asahi_cache_misses_total counter\n");
        let mut miss_rows: Vec<_> = state.cache_misses.iter().collect();
        miss_rows.sort_by(|a, b| a.0.cmp(b.0));
        for (tier, value) in miss_rows {
            let _ = writeln!(out, "asahi_cache_misses_total{{tier=\"{tier}\"}} {value}");
        }

        out.push_str("# HELP asahi_cache_hit_rate Rolling cache hit rate\n");
        out.push_str("# TYPE asahi_cache_hit_rate gauge\n");
        let mut rate_rows: Vec<_> = state.cache_hit_rate.iter().collect();
        rate_rows.sort_by(|a, b| a.0.cmp(b.0));
        for (tier, value) in rate_rows {
            let _ = writeln!(out, "asahi_cache_hit_rate{{tier=\"{tier}\"}} {value:.4}");
        }

        out.push_str("# HELP asahi_errors_total Error counts\n");
        out.push_str("# TYPE asahi_errors_total counter\n");
        let mut error_rows: Vec<_> = state.errors_total.iter().collect();
        error_rows.sort_by(|a, b| a.0.cmp(b.0));
        for ((error_type, component), value) in error_rows {
            let _ = writeln!(
                out,
                "asahi_errors_total{{error_type=\"{error_type}\",component=\"{component}\"}} {value}"
            );
        }

        format_histogram(
            &mut out,
            names::LATENCY_MS,
            "Request latency distribution in ms",
            state.latency_observations.iter().map(|o| o.value_ms),
            &LATENCY_BUCKETS,
        );
        format_histogram(
            &mut out,
            names::TOKEN_COUNT,
            "Token count distribution",
            state.token_observations.iter().map(|(_, v)| *v),
            &TOKEN_BUCKETS,
        );
        format_histogram(
            &mut out,
            names::BATCH_SIZE,
            "Batch size distribution",
            state.batch_size_observations.iter().map(|(_, v)| *v),
            &BATCH_SIZE_BUCKETS,
        );

        out.push_str("# HELP asahi_quality_score Rolling quality average per model\n");
        out.push_str("# TYPE asahi_quality_score gauge\n");
        let mut quality_rows: Vec<_> = state.quality_scores.iter().collect();
        quality_rows.sort_by(|a, b| a.0.cmp(b.0));
        for (model, scores) in quality_rows {
            if !scores.is_empty() {
                let avg = scores.iter().sum::<f64>() / scores.len() as f64;
                let _ = writeln!(out, "asahi_quality_score{{model=\"{model}\"}} {avg:.4}");
            }
        }

        out
    }

    // ------------------------------------------------------------------
    // Windowed summary
    // ------------------------------------------------------------------

    /// Aggregate the last `window_minutes` of activity.
    pub fn summary(&self, window_minutes: i64) -> WindowSummary {
        let cutoff = Utc::now() - Duration::minutes(window_minutes);
        let state = self.lock();

        let window_events: Vec<&EventSample> =
            state.events.iter().filter(|e| e.at >= cutoff).collect();
        let window_latencies: Vec<f64> = state
            .latency_observations
            .iter()
            .filter(|o| o.at >= cutoff)
            .map(|o| o.value_ms)
            .collect();

        let total_cost: f64 = window_events.iter().map(|e| e.cost).sum();
        let avg_latency = if window_latencies.is_empty() {
            0.0
        } else {
            window_latencies.iter().sum::<f64>() / window_latencies.len() as f64
        };

        let mut model_counts: HashMap<&str, u64> = HashMap::new();
        for event in &window_events {
            *model_counts.entry(event.model.as_str()).or_insert(0) += 1;
        }
        let mut top_models: Vec<(String, u64)> = model_counts
            .into_iter()
            .map(|(m, c)| (m.to_string(), c))
            .collect();
        top_models.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_models.truncate(5);

        let total_hits: u64 = state.cache_hits.values().sum();
        let total_misses: u64 = state.cache_misses.values().sum();
        let total_cache = total_hits + total_misses;

        WindowSummary {
            window_minutes,
            total_requests: window_events.len(),
            total_cost: crate::registry::round6(total_cost),
            avg_latency_ms: (avg_latency * 100.0).round() / 100.0,
            cache_hit_rate: if total_cache > 0 {
                total_hits as f64 / total_cache as f64
            } else {
                0.0
            },
            error_count: state.errors_total.values().sum(),
            top_models,
        }
    }

    // ------------------------------------------------------------------
    // Typed readers (for analytics / anomaly / forecasting)
    // ------------------------------------------------------------------

    /// Raw event samples, optionally bounded by an inclusive time range.
    pub fn events(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Vec<EventSample> {
        self.lock()
            .events
            .iter()
            .filter(|e| since.is_none_or(|s| e.at >= s))
            .filter(|e| until.is_none_or(|u| e.at <= u))
            .cloned()
            .collect()
    }

    /// Latency observations, optionally bounded below.
    pub fn latency_samples(&self, since: Option<DateTime<Utc>>) -> Vec<LatencySample> {
        self.lock()
            .latency_observations
            .iter()
            .filter(|o| since.is_none_or(|s| o.at >= s))
            .copied()
            .collect()
    }

    /// Per-tier cache statistics for both tiers.
    pub fn cache_stats(&self) -> Vec<TierCacheStats> {
        let state = self.lock();
        [CacheTier::Exact, CacheTier::Semantic]
            .into_iter()
            .map(|tier| {
                let hits = state.cache_hits.get(tier.as_str()).copied().unwrap_or(0);
                let misses = state.cache_misses.get(tier.as_str()).copied().unwrap_or(0);
                let total = hits + misses;
                TierCacheStats {
                    tier,
                    hits,
                    misses,
                    hit_rate: if total > 0 {
                        hits as f64 / total as f64
                    } else {
                        0.0
                    },
                }
            })
            .collect()
    }

    /// Error counter rows.
    pub fn error_counts(&self) -> Vec<ErrorCount> {
        self.lock()
            .errors_total
            .iter()
            .map(|((error_type, component), count)| ErrorCount {
                error_type: error_type.clone(),
                component: component.clone(),
                count: *count,
            })
            .collect()
    }

    /// Per-model quality score lists.
    pub fn quality_scores(&self) -> HashMap<String, Vec<f64>> {
        self.lock().quality_scores.clone()
    }

    /// Total number of recorded inference events.
    pub fn total_requests(&self) -> usize {
        self.lock().events.len()
    }

    /// Total accumulated cost across all events.
    pub fn total_cost(&self) -> f64 {
        self.lock().cost_total.values().sum()
    }

    /// Total savings recorded for a phase.
    pub fn savings_for_phase(&self, phase: &str) -> f64 {
        self.lock().savings_total.get(phase).copied().unwrap_or(0.0)
    }

    // ------------------------------------------------------------------
    // Pruning
    // ------------------------------------------------------------------

    /// Remove data points older than the retention horizon.
    pub fn prune(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let mut removed = 0usize;
        {
            let mut state = self.lock();

            let before = state.events.len();
            state.events.retain(|e| e.at >= cutoff);
            removed += before - state.events.len();

            let before = state.latency_observations.len();
            state.latency_observations.retain(|o| o.at >= cutoff);
            removed += before - state.latency_observations.len();

            let before = state.token_observations.len();
            state.token_observations.retain(|(at, _)| *at >= cutoff);
            removed += before - state.token_observations.len();

            let before = state.batch_size_observations.len();
            state.batch_size_observations.retain(|(at, _)| *at >= cutoff);
            removed += before - state.batch_size_observations.len();
        }
        if removed > 0 {
            info!(removed, "pruned old metric points");
        }
        removed
    }
}

fn format_histogram(
    out: &mut String,
    name: &str,
    help: &str,
    values: impl Iterator<Item = f64>,
    buckets: &[f64],
) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} histogram");

    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return;
    }
    let sum: f64 = values.iter().sum();
    let count = values.len();

    for bound in buckets {
        let bucket_count = values.iter().filter(|v| **v <= *bound).count();
        let _ = writeln!(out, "{name}_bucket{{le=\"{bound}\"}} {bucket_count}");
    }
    let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {count}");
    let _ = writeln!(out, "{name}_sum {sum:.6}");
    let _ = writeln!(out, "{name}_count {count}");
}
