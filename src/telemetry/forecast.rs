//! Cost and cache-rate forecasting.
//!
//! Exponential moving average for short horizons (within the EMA span),
//! ordinary-least-squares regression for longer projections. Confidence
//! intervals scale with the z-score of the requested confidence level
//! and the standard deviation of the daily series.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::collector::MetricsCollector;
use crate::config::ForecastSettings;

/// Direction of a cost trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// A cost prediction with confidence bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    /// Horizon description, e.g. `"30 days"`.
    pub period: String,
    pub predicted_cost: f64,
    pub confidence_low: f64,
    pub confidence_high: f64,
    pub trend: Trend,
    pub warning: Option<String>,
}

/// Predicted hit rates per tier and overall.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheRateForecast {
    pub exact: f64,
    pub semantic: f64,
    pub overall: f64,
}

/// Predicts future costs from the collector's event history.
pub struct ForecastingModel<'a> {
    collector: &'a MetricsCollector,
    settings: ForecastSettings,
}

impl<'a> ForecastingModel<'a> {
    pub fn new(collector: &'a MetricsCollector, settings: ForecastSettings) -> Self {
        Self {
            collector,
            settings,
        }
    }

    /// Predict total cost over the next `horizon_days`.
    ///
    /// EMA for horizons within the configured span, OLS regression
    /// beyond it. With fewer than `min_data_points` days of history the
    /// forecast is zero with a warning rather than an error.
    pub fn predict_cost(&self, horizon_days: u32, confidence: f64) -> Forecast {
        let daily_costs = self.daily_costs();

        if daily_costs.len() < self.settings.min_data_points {
            warn!(
                data_points = daily_costs.len(),
                min_required = self.settings.min_data_points,
                "insufficient data for cost forecast"
            );
            return Forecast {
                period: format!("{horizon_days} days"),
                predicted_cost: 0.0,
                confidence_low: 0.0,
                confidence_high: 0.0,
                trend: Trend::Stable,
                warning: Some(format!(
                    "insufficient data: {} days available, need at least {}",
                    daily_costs.len(),
                    self.settings.min_data_points
                )),
            };
        }

        let predicted_daily = if horizon_days <= self.settings.ema_span_days {
            self.ema(&daily_costs)
        } else {
            linear_predict(&daily_costs, horizon_days as usize)
        };

        let predicted_total = predicted_daily * horizon_days as f64;
        let margin = z_score(confidence) * std_dev(&daily_costs) * (horizon_days as f64).sqrt();
        let trend = self.classify_trend(&daily_costs);

        let warning = if trend == Trend::Increasing && horizon_days >= 14 {
            Some(format!(
                "costs are trending upward; projected spend over {horizon_days} days: ${predicted_total:.2}"
            ))
        } else {
            None
        };

        let forecast = Forecast {
            period: format!("{horizon_days} days"),
            predicted_cost: round4(predicted_total),
            confidence_low: round4((predicted_total - margin).max(0.0)),
            confidence_high: round4(predicted_total + margin),
            trend,
            warning,
        };
        info!(
            horizon_days,
            predicted_cost = forecast.predicted_cost,
            trend = ?forecast.trend,
            "cost forecast generated"
        );
        forecast
    }

    /// Extrapolate current per-tier hit rates forward.
    pub fn predict_cache_hit_rate(&self) -> CacheRateForecast {
        let stats = self.collector.cache_stats();
        let mut exact = 0.0;
        let mut semantic = 0.0;
        let mut total_hits = 0u64;
        let mut total = 0u64;
        for tier in stats {
            let rate = round4(tier.hit_rate);
            match tier.tier {
                crate::types::CacheTier::Exact => exact = rate,
                crate::types::CacheTier::Semantic => semantic = rate,
                crate::types::CacheTier::None => {}
            }
            total_hits += tier.hits;
            total += tier.hits + tier.misses;
        }
        CacheRateForecast {
            exact,
            semantic,
            overall: if total > 0 {
                round4(total_hits as f64 / total as f64)
            } else {
                0.0
            },
        }
    }

    /// Warn when the 30-day projection threatens a monthly budget.
    pub fn detect_budget_risk(&self, monthly_budget: f64) -> Option<String> {
        let forecast = self.predict_cost(30, 0.95);
        if forecast.warning.as_deref().is_some_and(|w| w.starts_with("insufficient data")) {
            return None;
        }

        if forecast.predicted_cost > monthly_budget {
            let overage = forecast.predicted_cost - monthly_budget;
            return Some(format!(
                "projected 30-day spend (${:.2}) exceeds monthly budget (${monthly_budget:.2}) \
                 by ${overage:.2}; consider tightening routing or cache settings",
                forecast.predicted_cost
            ));
        }
        if forecast.confidence_high > monthly_budget {
            return Some(format!(
                "projected spend (${:.2}) is within budget, but the worst-case estimate \
                 (${:.2}) exceeds the ${monthly_budget:.2} monthly budget",
                forecast.predicted_cost, forecast.confidence_high
            ));
        }
        None
    }

    /// Event costs aggregated per UTC day, oldest first.
    fn daily_costs(&self) -> Vec<f64> {
        let events = self.collector.events(None, None);
        let mut daily: BTreeMap<String, f64> = BTreeMap::new();
        for event in events {
            let day = event.at.format("%Y-%m-%d").to_string();
            *daily.entry(day).or_insert(0.0) += event.cost;
        }
        daily.into_values().collect()
    }

    fn ema(&self, values: &[f64]) -> f64 {
        let Some(&first) = values.first() else {
            return 0.0;
        };
        let span = (self.settings.ema_span_days as usize).min(values.len());
        let alpha = 2.0 / (span as f64 + 1.0);
        values[1..]
            .iter()
            .fold(first, |ema, &value| alpha * value + (1.0 - alpha) * ema)
    }

    fn classify_trend(&self, values: &[f64]) -> Trend {
        if values.len() < 2 {
            return Trend::Stable;
        }
        let (slope, y_mean) = ols_slope(values);
        if y_mean == 0.0 {
            return Trend::Stable;
        }
        let daily_change_pct = (slope / y_mean).abs() * 100.0;
        if daily_change_pct < self.settings.stable_threshold_pct {
            Trend::Stable
        } else if slope > 0.0 {
            Trend::Increasing
        } else {
            Trend::Decreasing
        }
    }
}

/// OLS prediction of the daily value `steps_ahead` past the series end.
/// Never predicts a negative daily cost.
fn linear_predict(values: &[f64], steps_ahead: usize) -> f64 {
    let n = values.len();
    if n < 2 {
        return values.last().copied().unwrap_or(0.0);
    }
    let (slope, y_mean) = ols_slope(values);
    let x_mean = (n - 1) as f64 / 2.0;
    let intercept = y_mean - slope * x_mean;
    let future_x = (n + steps_ahead - 1) as f64;
    (intercept + slope * future_x).max(0.0)
}

/// Regression slope and series mean over indices 0..n.
fn ols_slope(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &value) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (value - y_mean);
        denominator += dx * dx;
    }
    if denominator == 0.0 {
        (0.0, y_mean)
    } else {
        (numerator / denominator, y_mean)
    }
}

/// Sample standard deviation; 0.0 for fewer than two values.
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Approximate z-score for a confidence level, nearest table entry.
fn z_score(confidence: f64) -> f64 {
    const TABLE: [(f64, f64); 5] = [
        (0.80, 1.282),
        (0.85, 1.440),
        (0.90, 1.645),
        (0.95, 1.960),
        (0.99, 2.576),
    ];
    TABLE
        .iter()
        .min_by(|a, b| (a.0 - confidence).abs().total_cmp(&(b.0 - confidence).abs()))
        .map(|(_, z)| *z)
        .unwrap_or(1.960)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
