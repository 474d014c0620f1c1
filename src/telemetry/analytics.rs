//! Analytical queries over collected metrics.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::collector::MetricsCollector;
use crate::config::TrackingSettings;
use crate::types::CacheTier;
use crate::{AsahiError, Result};

/// Time windows supported by breakdowns and trends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Hour,
    Day,
    Week,
    Month,
}

impl Period {
    fn to_duration(self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::days(1),
            Self::Week => Duration::weeks(1),
            Self::Month => Duration::days(30),
        }
    }
}

/// Dimension to group a cost breakdown by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Model,
    TaskType,
    User,
    Tier,
}

/// Metrics that can be trended over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendMetric {
    Cost,
    Latency,
    Requests,
    CacheHitRate,
}

/// One bucket of a time-series trend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Comparison of actual spend against an everything-through-the-baseline
/// counterfactual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub baseline_cost: f64,
    pub actual_cost: f64,
    pub savings: f64,
    pub savings_pct: f64,
    pub baseline_model: String,
    /// Share of the savings attributable to cache hits.
    pub cache_contribution_pct: f64,
}

/// A high-cost (model, task) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostDriver {
    pub model: String,
    pub task_type: String,
    pub total_cost: f64,
    pub request_count: u64,
    pub avg_cost: f64,
}

/// Per-tier and overall cache performance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePerformance {
    pub exact: TierPerformance,
    pub semantic: TierPerformance,
    pub overall_hit_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierPerformance {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Latency percentiles across all observations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Runs analytical queries over a [`MetricsCollector`]'s readers.
pub struct AnalyticsEngine<'a> {
    collector: &'a MetricsCollector,
    baseline_input_rate: f64,
    baseline_output_rate: f64,
}

const BASELINE_MODEL: &str = "gpt-4";

impl<'a> AnalyticsEngine<'a> {
    pub fn new(collector: &'a MetricsCollector, tracking: &TrackingSettings) -> Self {
        Self {
            collector,
            baseline_input_rate: tracking.baseline_input_rate,
            baseline_output_rate: tracking.baseline_output_rate,
        }
    }

    /// Break down total cost over a period by a grouping dimension,
    /// descending by cost.
    pub fn cost_breakdown(&self, period: Period, group_by: GroupBy) -> Vec<(String, f64)> {
        let since = Utc::now() - period.to_duration();
        let events = self.collector.events(Some(since), None);

        let mut breakdown: HashMap<String, f64> = HashMap::new();
        for event in &events {
            let key = match group_by {
                GroupBy::Model => event.model.clone(),
                GroupBy::TaskType => event.task_type.as_str().to_string(),
                GroupBy::User => event
                    .user_id
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
                GroupBy::Tier => event.cache_tier.as_str().to_string(),
            };
            *breakdown.entry(key).or_insert(0.0) += event.cost;
        }

        let mut rows: Vec<(String, f64)> = breakdown
            .into_iter()
            .map(|(k, v)| (k, crate::registry::round6(v)))
            .collect();
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        debug!(groups = rows.len(), "cost breakdown computed");
        rows
    }

    /// Time-series trend for a metric, split into `intervals` buckets.
    pub fn trend(
        &self,
        metric: TrendMetric,
        period: Period,
        intervals: usize,
    ) -> Result<Vec<TrendPoint>> {
        if intervals == 0 {
            return Err(AsahiError::Observability(
                "trend requires at least one interval".to_string(),
            ));
        }
        let now = Utc::now();
        let since = now - period.to_duration();
        let bucket = (now - since) / intervals as i32;

        let events = self.collector.events(Some(since), None);
        let latencies = self.collector.latency_samples(Some(since));

        let mut points = Vec::with_capacity(intervals);
        for i in 0..intervals {
            let bucket_start = since + bucket * i as i32;
            let bucket_end = bucket_start + bucket;

            let value = match metric {
                TrendMetric::Cost => events
                    .iter()
                    .filter(|e| e.at >= bucket_start && e.at < bucket_end)
                    .map(|e| e.cost)
                    .sum(),
                TrendMetric::Requests => events
                    .iter()
                    .filter(|e| e.at >= bucket_start && e.at < bucket_end)
                    .count() as f64,
                TrendMetric::Latency => {
                    let bucket_values: Vec<f64> = latencies
                        .iter()
                        .filter(|o| o.at >= bucket_start && o.at < bucket_end)
                        .map(|o| o.value_ms)
                        .collect();
                    if bucket_values.is_empty() {
                        0.0
                    } else {
                        bucket_values.iter().sum::<f64>() / bucket_values.len() as f64
                    }
                }
                TrendMetric::CacheHitRate => {
                    let bucket_events: Vec<_> = events
                        .iter()
                        .filter(|e| e.at >= bucket_start && e.at < bucket_end)
                        .collect();
                    if bucket_events.is_empty() {
                        0.0
                    } else {
                        let hits = bucket_events
                            .iter()
                            .filter(|e| e.cache_tier != CacheTier::None)
                            .count();
                        hits as f64 / bucket_events.len() as f64
                    }
                }
            };

            points.push(TrendPoint {
                timestamp: bucket_start,
                value: crate::registry::round6(value),
            });
        }
        Ok(points)
    }

    /// Compare actual cost to routing everything through the baseline
    /// model at the configured rates.
    pub fn compare_to_baseline(&self) -> BaselineComparison {
        let events = self.collector.events(None, None);

        let actual_cost: f64 = events.iter().map(|e| e.cost).sum();
        let mut baseline_cost = 0.0;
        let mut cache_savings = 0.0;
        for event in &events {
            baseline_cost += (event.input_tokens as f64 * self.baseline_input_rate
                + event.output_tokens as f64 * self.baseline_output_rate)
                / 1000.0;
            if event.cache_tier != CacheTier::None {
                cache_savings += event.cost;
            }
        }

        let savings = baseline_cost - actual_cost;
        BaselineComparison {
            baseline_cost: crate::registry::round6(baseline_cost),
            actual_cost: crate::registry::round6(actual_cost),
            savings: crate::registry::round6(savings),
            savings_pct: if baseline_cost > 0.0 {
                (savings / baseline_cost * 10_000.0).round() / 100.0
            } else {
                0.0
            },
            baseline_model: BASELINE_MODEL.to_string(),
            cache_contribution_pct: if savings > 0.0 {
                (cache_savings / savings * 10_000.0).round() / 100.0
            } else {
                0.0
            },
        }
    }

    /// The highest-cost (model, task) pairs, descending.
    pub fn top_cost_drivers(&self, limit: usize) -> Vec<CostDriver> {
        let events = self.collector.events(None, None);

        let mut groups: HashMap<(String, &'static str), (f64, u64)> = HashMap::new();
        for event in &events {
            let entry = groups
                .entry((event.model.clone(), event.task_type.as_str()))
                .or_insert((0.0, 0));
            entry.0 += event.cost;
            entry.1 += 1;
        }

        let mut drivers: Vec<CostDriver> = groups
            .into_iter()
            .map(|((model, task), (total_cost, count))| CostDriver {
                model,
                task_type: task.to_string(),
                total_cost: crate::registry::round6(total_cost),
                request_count: count,
                avg_cost: if count > 0 {
                    crate::registry::round6(total_cost / count as f64)
                } else {
                    0.0
                },
            })
            .collect();
        drivers.sort_by(|a, b| b.total_cost.total_cmp(&a.total_cost));
        drivers.truncate(limit);
        drivers
    }

    /// Per-tier and overall cache performance.
    pub fn cache_performance(&self) -> CachePerformance {
        let stats = self.collector.cache_stats();
        let mut exact = TierPerformance {
            hits: 0,
            misses: 0,
            hit_rate: 0.0,
        };
        let mut semantic = exact.clone();
        let mut total_hits = 0u64;
        let mut total_misses = 0u64;

        for tier in stats {
            let perf = TierPerformance {
                hits: tier.hits,
                misses: tier.misses,
                hit_rate: (tier.hit_rate * 10_000.0).round() / 10_000.0,
            };
            total_hits += tier.hits;
            total_misses += tier.misses;
            match tier.tier {
                CacheTier::Exact => exact = perf,
                CacheTier::Semantic => semantic = perf,
                CacheTier::None => {}
            }
        }

        let total = total_hits + total_misses;
        CachePerformance {
            exact,
            semantic,
            overall_hit_rate: if total > 0 {
                ((total_hits as f64 / total as f64) * 10_000.0).round() / 10_000.0
            } else {
                0.0
            },
        }
    }

    /// Latency percentiles by sort-and-index over all observations.
    pub fn latency_percentiles(&self) -> LatencyPercentiles {
        let mut values: Vec<f64> = self
            .collector
            .latency_samples(None)
            .into_iter()
            .map(|o| o.value_ms)
            .collect();

        if values.is_empty() {
            return LatencyPercentiles {
                p50: 0.0,
                p75: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
            };
        }
        values.sort_by(f64::total_cmp);

        LatencyPercentiles {
            p50: percentile(&values, 50.0),
            p75: percentile(&values, 75.0),
            p90: percentile(&values, 90.0),
            p95: percentile(&values, 95.0),
            p99: percentile(&values, 99.0),
        }
    }
}

/// Percentile over a pre-sorted slice by index.
pub(crate) fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let idx = ((pct / 100.0 * n as f64) as usize)
        .saturating_sub(1)
        .min(n - 1);
    (sorted[idx] * 100.0).round() / 100.0
}
