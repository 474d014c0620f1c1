//! Anomaly detection over rolling baselines.
//!
//! Each detector compares the last hour against the rolling baseline
//! window (default 24h) and reports when a configured multiplier is
//! exceeded. Detectors read the collector only through its typed
//! readers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::analytics::percentile;
use super::collector::MetricsCollector;
use crate::config::AnomalySettings;

/// Minimum observations before latency baselines are trusted.
const MIN_BASELINE_LATENCIES: usize = 5;
const MIN_RECENT_LATENCIES: usize = 3;
/// Minimum quality scores before a drop is reported.
const MIN_QUALITY_SAMPLES: usize = 5;
/// Expected hit rate once caches are warm.
const BASELINE_HIT_RATE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

/// A detected anomaly with context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    /// Category, e.g. `cost_spike`, `latency_spike`.
    pub anomaly_type: String,
    pub severity: Severity,
    /// The metric that triggered the alert.
    pub metric_name: String,
    pub current_value: f64,
    pub expected_value: f64,
    /// Deviation from expected, as a percentage.
    pub deviation_pct: f64,
    pub message: String,
    pub detected_at: DateTime<Utc>,
}

/// Detects unusual patterns in cost, latency, errors, cache
/// performance, and quality.
pub struct AnomalyDetector<'a> {
    collector: &'a MetricsCollector,
    settings: AnomalySettings,
}

impl<'a> AnomalyDetector<'a> {
    pub fn new(collector: &'a MetricsCollector, settings: AnomalySettings) -> Self {
        Self {
            collector,
            settings,
        }
    }

    /// Run every detector and collect the findings.
    pub fn check(&self) -> Vec<Anomaly> {
        let anomalies: Vec<Anomaly> = [
            self.check_cost(),
            self.check_latency(),
            self.check_error_rate(),
            self.check_cache_performance(),
            self.check_quality(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if !anomalies.is_empty() {
            warn!(count = anomalies.len(), "anomalies detected");
        }
        anomalies
    }

    /// Average cost per request in the last hour vs the older part of
    /// the rolling window.
    pub fn check_cost(&self) -> Option<Anomaly> {
        let now = Utc::now();
        let baseline_start = now - Duration::hours(self.settings.rolling_window_hours as i64);
        let recent_start = now - Duration::hours(1);

        let baseline = self
            .collector
            .events(Some(baseline_start), Some(recent_start));
        let recent = self.collector.events(Some(recent_start), None);
        if baseline.is_empty() || recent.is_empty() {
            return None;
        }

        let baseline_avg = baseline.iter().map(|e| e.cost).sum::<f64>() / baseline.len() as f64;
        let recent_avg = recent.iter().map(|e| e.cost).sum::<f64>() / recent.len() as f64;
        if baseline_avg <= 0.0 {
            return None;
        }

        let ratio = recent_avg / baseline_avg;
        if ratio < self.settings.cost_spike_threshold {
            return None;
        }

        Some(Anomaly {
            anomaly_type: "cost_spike".to_string(),
            severity: severity_for(ratio, self.settings.cost_spike_threshold),
            metric_name: super::names::COST_TOTAL.to_string(),
            current_value: crate::registry::round6(recent_avg),
            expected_value: crate::registry::round6(baseline_avg),
            deviation_pct: round2((ratio - 1.0) * 100.0),
            message: format!(
                "average request cost (${recent_avg:.4}) is {ratio:.1}x the baseline (${baseline_avg:.4})"
            ),
            detected_at: now,
        })
    }

    /// P95 latency of the last hour vs the older part of the window.
    pub fn check_latency(&self) -> Option<Anomaly> {
        let now = Utc::now();
        let window_start = now - Duration::hours(self.settings.rolling_window_hours as i64);
        let recent_start = now - Duration::hours(1);

        let samples = self.collector.latency_samples(Some(window_start));
        let mut baseline: Vec<f64> = samples
            .iter()
            .filter(|o| o.at < recent_start)
            .map(|o| o.value_ms)
            .collect();
        let mut recent: Vec<f64> = samples
            .iter()
            .filter(|o| o.at >= recent_start)
            .map(|o| o.value_ms)
            .collect();

        if baseline.len() < MIN_BASELINE_LATENCIES || recent.len() < MIN_RECENT_LATENCIES {
            return None;
        }
        baseline.sort_by(f64::total_cmp);
        recent.sort_by(f64::total_cmp);

        let baseline_p95 = percentile(&baseline, 95.0);
        let recent_p95 = percentile(&recent, 95.0);
        if baseline_p95 <= 0.0 {
            return None;
        }

        let ratio = recent_p95 / baseline_p95;
        if ratio < self.settings.latency_spike_threshold {
            return None;
        }

        Some(Anomaly {
            anomaly_type: "latency_spike".to_string(),
            severity: severity_for(ratio, self.settings.latency_spike_threshold),
            metric_name: super::names::LATENCY_MS.to_string(),
            current_value: round2(recent_p95),
            expected_value: round2(baseline_p95),
            deviation_pct: round2((ratio - 1.0) * 100.0),
            message: format!(
                "p95 latency ({recent_p95:.0}ms) is {ratio:.1}x the baseline ({baseline_p95:.0}ms)"
            ),
            detected_at: now,
        })
    }

    /// Errors over total requests vs the configured rate threshold.
    pub fn check_error_rate(&self) -> Option<Anomaly> {
        let total_requests = self.collector.total_requests();
        if total_requests == 0 {
            return None;
        }

        let total_errors: u64 = self.collector.error_counts().iter().map(|e| e.count).sum();
        let error_rate = total_errors as f64 / total_requests as f64;
        if error_rate < self.settings.error_rate_threshold {
            return None;
        }

        let threshold = self.settings.error_rate_threshold;
        let deviation = (error_rate - threshold) / threshold.max(0.001) * 100.0;
        Some(Anomaly {
            anomaly_type: "error_rate".to_string(),
            severity: if error_rate >= threshold * 5.0 {
                Severity::Critical
            } else {
                Severity::Warning
            },
            metric_name: super::names::ERRORS_TOTAL.to_string(),
            current_value: round4(error_rate),
            expected_value: round4(threshold),
            deviation_pct: round2(deviation),
            message: format!(
                "error rate ({:.2}%) exceeds threshold ({:.2}%)",
                error_rate * 100.0,
                threshold * 100.0
            ),
            detected_at: Utc::now(),
        })
    }

    /// Overall hit rate vs the warm-cache baseline expectation.
    pub fn check_cache_performance(&self) -> Option<Anomaly> {
        let stats = self.collector.cache_stats();
        let total_hits: u64 = stats.iter().map(|t| t.hits).sum();
        let total_misses: u64 = stats.iter().map(|t| t.misses).sum();
        let total = total_hits + total_misses;
        if total == 0 {
            return None;
        }

        let overall = total_hits as f64 / total as f64;
        let drop_fraction = (BASELINE_HIT_RATE - overall) / BASELINE_HIT_RATE;
        if drop_fraction < self.settings.cache_degradation_threshold {
            return None;
        }

        Some(Anomaly {
            anomaly_type: "cache_degradation".to_string(),
            severity: if drop_fraction >= 0.75 {
                Severity::Critical
            } else {
                Severity::Warning
            },
            metric_name: super::names::CACHE_HIT_RATE.to_string(),
            current_value: round4(overall),
            expected_value: round4(BASELINE_HIT_RATE),
            deviation_pct: round2(drop_fraction * 100.0),
            message: format!(
                "cache hit rate ({:.1}%) has dropped {:.0}% from baseline ({:.1}%)",
                overall * 100.0,
                drop_fraction * 100.0,
                BASELINE_HIT_RATE * 100.0
            ),
            detected_at: Utc::now(),
        })
    }

    /// Recent quality (last 25% of observations) vs the overall average.
    pub fn check_quality(&self) -> Option<Anomaly> {
        let scores = self.collector.quality_scores();
        let all: Vec<f64> = scores.values().flatten().copied().collect();
        if all.len() < MIN_QUALITY_SAMPLES {
            return None;
        }

        let overall_avg = all.iter().sum::<f64>() / all.len() as f64;
        let recent_count = (all.len() / 4).max(1);
        let recent = &all[all.len() - recent_count..];
        let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;

        let drop = overall_avg - recent_avg;
        if drop < self.settings.quality_drop_threshold {
            return None;
        }

        Some(Anomaly {
            anomaly_type: "quality_degradation".to_string(),
            severity: if drop >= self.settings.quality_drop_threshold * 2.0 {
                Severity::Critical
            } else {
                Severity::Warning
            },
            metric_name: super::names::QUALITY_SCORE.to_string(),
            current_value: round4(recent_avg),
            expected_value: round4(overall_avg),
            deviation_pct: if overall_avg > 0.0 {
                round2(drop / overall_avg * 100.0)
            } else {
                0.0
            },
            message: format!(
                "recent quality ({recent_avg:.2}) has dropped {drop:.2} points from the average ({overall_avg:.2})"
            ),
            detected_at: Utc::now(),
        })
    }
}

fn severity_for(ratio: f64, threshold: f64) -> Severity {
    if ratio >= threshold * 1.5 {
        Severity::Critical
    } else {
        Severity::Warning
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
