//! Telemetry metric name constants.
//!
//! Centralised names for the Prometheus exposition and the `metrics`
//! facade. These are a stable wire contract: dashboards and scrapers
//! key on them, so they never change.
//!
//! # Common labels
//!
//! - `model` — model name
//! - `task_type` — task category (e.g. "faq", "coding")
//! - `tier` / `cache_tier` — cache tier ("exact" | "semantic")
//! - `error_type`, `component` — error classification

/// Total inference requests.
///
/// Labels: `model`, `task_type`, `cache_tier`.
pub const REQUESTS_TOTAL: &str = "asahi_requests_total";

/// Total cost in dollars.
///
/// Labels: `model`.
pub const COST_TOTAL: &str = "asahi_cost_dollars_total";

/// Total dollar savings.
///
/// Labels: `phase` ("caching" | "routing" | "batching").
pub const SAVINGS_TOTAL: &str = "asahi_savings_dollars_total";

/// Cache hits by tier.
///
/// Labels: `tier`.
pub const CACHE_HITS_TOTAL: &str = "asahi_cache_hits_total";

/// Cache misses by tier.
///
/// Labels: `tier`.
pub const CACHE_MISSES_TOTAL: &str = "asahi_cache_misses_total";

/// Rolling cache hit rate gauge.
///
/// Labels: `tier`.
pub const CACHE_HIT_RATE: &str = "asahi_cache_hit_rate";

/// Error counts.
///
/// Labels: `error_type`, `component`.
pub const ERRORS_TOTAL: &str = "asahi_errors_total";

/// Request latency distribution in milliseconds (histogram).
pub const LATENCY_MS: &str = "asahi_latency_ms";

/// Token count distribution (histogram).
pub const TOKEN_COUNT: &str = "asahi_token_count";

/// Batch size distribution (histogram).
pub const BATCH_SIZE: &str = "asahi_batch_size";

/// Rolling quality average per model (gauge).
///
/// Labels: `model`.
pub const QUALITY_SCORE: &str = "asahi_quality_score";
