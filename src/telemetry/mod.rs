//! Telemetry subsystem.
//!
//! The [`MetricsCollector`] is the aggregation point for everything the
//! gateway observes: inference events, cache lookups, routing
//! decisions, batch executions, errors, and savings. It exposes a
//! Prometheus text format with stable `asahi_*` metric names, windowed
//! summaries, and typed readers that the analytics, anomaly-detection,
//! and forecasting layers consume — those layers never reach into the
//! collector's internals.
//!
//! Alongside its own aggregation the collector emits to the `metrics`
//! facade using the same names; consumers that install a recorder get
//! the counters for free, and without one the facade calls are no-ops.

mod analytics;
mod anomaly;
mod collector;
mod event;
mod forecast;

pub mod names;

pub use analytics::{
    AnalyticsEngine, BaselineComparison, CachePerformance, CostDriver, GroupBy,
    LatencyPercentiles, Period, TierPerformance, TrendMetric, TrendPoint,
};
pub use anomaly::{Anomaly, AnomalyDetector, Severity};
pub use collector::{
    ErrorCount, EventSample, LatencySample, MetricsCollector, TierCacheStats, WindowSummary,
};
pub use event::InferenceEvent;
pub use forecast::{CacheRateForecast, Forecast, ForecastingModel, Trend};
