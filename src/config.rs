//! Configuration loading for the Asahi gateway.
//!
//! Configuration is a TOML document with one table per subsystem. Every
//! section and every field carries a default, so an empty document is a
//! valid configuration. After parsing, [`Settings::apply_env_overrides`]
//! lets deployments override any scalar field through environment
//! variables named `ASAHI_<SECTION>_<FIELD>` (e.g.
//! `ASAHI_CACHE_TTL_SECONDS=3600`).
//!
//! Nothing in this module is process-global: the parsed [`Settings`] is
//! handed to the builder and injected into components from there.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AsahiError, Result};

/// Top-level settings container.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub routing: RoutingSettings,
    #[serde(default)]
    pub tracking: TrackingSettings,
    #[serde(default)]
    pub observability: ObservabilitySettings,
    #[serde(default)]
    pub embeddings: EmbeddingsSettings,
    #[serde(default)]
    pub batching: BatchingSettings,
    #[serde(default)]
    pub feature_store: FeatureStoreSettings,
    #[serde(default)]
    pub optimization: OptimizationSettings,
    #[serde(default)]
    pub governance: GovernanceSettings,
}

/// API-facing limits and baseline pricing for savings comparisons.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
    /// Per-1k-token input rate of the baseline model used for the
    /// all-GPT-4 counterfactual in analytics.
    #[serde(default = "default_baseline_input_rate")]
    pub baseline_input_rate: f64,
    #[serde(default = "default_baseline_output_rate")]
    pub baseline_output_rate: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_entries")]
    pub max_entries: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

/// Routing preference maps and per-task overrides.
///
/// The maps translate human preferences into numeric constraints; the
/// overrides raise quality floors and tighten latency budgets for tasks
/// that demand it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingSettings {
    #[serde(default = "default_quality_threshold")]
    pub default_quality_threshold: f64,
    #[serde(default = "default_latency_budget")]
    pub default_latency_budget_ms: u64,
    #[serde(default = "default_quality_map")]
    pub quality_map: HashMap<String, f64>,
    #[serde(default = "default_latency_map")]
    pub latency_map: HashMap<String, u64>,
    #[serde(default = "default_task_overrides")]
    pub task_overrides: HashMap<String, TaskOverride>,
}

/// Per-task constraint floor/ceiling.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TaskOverride {
    pub min_quality: f64,
    pub max_latency_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingSettings {
    #[serde(default = "default_baseline_input_rate")]
    pub baseline_input_rate: f64,
    #[serde(default = "default_baseline_output_rate")]
    pub baseline_output_rate: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilitySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_collection_interval")]
    pub collection_interval_seconds: u64,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,
    #[serde(default)]
    pub anomaly: AnomalySettings,
    #[serde(default)]
    pub forecasting: ForecastSettings,
}

/// Thresholds for the anomaly detectors, expressed as multipliers over
/// the rolling baseline.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct AnomalySettings {
    #[serde(default = "default_spike_threshold")]
    pub cost_spike_threshold: f64,
    #[serde(default = "default_spike_threshold")]
    pub latency_spike_threshold: f64,
    #[serde(default = "default_error_rate")]
    pub error_rate_threshold: f64,
    #[serde(default = "default_cache_degradation")]
    pub cache_degradation_threshold: f64,
    #[serde(default = "default_quality_drop")]
    pub quality_drop_threshold: f64,
    #[serde(default = "default_rolling_window")]
    pub rolling_window_hours: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ForecastSettings {
    #[serde(default = "default_ema_span")]
    pub ema_span_days: u32,
    #[serde(default = "default_min_data_points")]
    pub min_data_points: usize,
    #[serde(default = "default_stable_threshold")]
    pub stable_threshold_pct: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingsSettings {
    #[serde(default = "default_embedding_model")]
    pub model_name: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_embed_batch")]
    pub batch_size: usize,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Entries in the per-gateway embedding memo cache.
    #[serde(default = "default_memo_entries")]
    pub memo_max_entries: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchingSettings {
    #[serde(default = "default_min_batch")]
    pub min_batch_size: usize,
    #[serde(default = "default_max_batch")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,
    #[serde(default = "default_latency_threshold")]
    pub latency_threshold_ms: u64,
    #[serde(default = "default_eligible_tasks")]
    pub eligible_task_types: Vec<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureStoreSettings {
    #[serde(default = "default_fs_provider")]
    pub provider: String,
    #[serde(default = "default_fs_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub fallback_on_timeout: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptimizationSettings {
    #[serde(default = "default_quality_penalty")]
    pub quality_penalty_weight: f64,
    #[serde(default = "default_top_k")]
    pub semantic_top_k: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GovernanceSettings {
    #[serde(default = "default_key_env")]
    pub encryption_key_env: String,
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
    #[serde(default = "default_salt_length")]
    pub salt_length: usize,
}

impl Settings {
    /// Parse settings from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AsahiError::Configuration(format!("invalid TOML: {e}")))
    }

    /// Load settings from a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            AsahiError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut settings = Self::from_toml_str(&raw)?;
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// Override scalar fields from `ASAHI_<SECTION>_<FIELD>` variables.
    ///
    /// Unset variables leave the field untouched; a set-but-unparsable
    /// variable is a configuration error so typos fail loudly at startup
    /// instead of silently keeping the default.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        override_var(&mut self.api.host, "ASAHI_API_HOST")?;
        override_var(&mut self.api.port, "ASAHI_API_PORT")?;
        override_var(&mut self.api.rate_limit_per_minute, "ASAHI_API_RATE_LIMIT_PER_MINUTE")?;
        override_var(&mut self.api.baseline_input_rate, "ASAHI_API_BASELINE_INPUT_RATE")?;
        override_var(&mut self.api.baseline_output_rate, "ASAHI_API_BASELINE_OUTPUT_RATE")?;

        override_var(&mut self.cache.ttl_seconds, "ASAHI_CACHE_TTL_SECONDS")?;
        override_var(&mut self.cache.max_entries, "ASAHI_CACHE_MAX_ENTRIES")?;
        override_var(&mut self.cache.cleanup_interval_seconds, "ASAHI_CACHE_CLEANUP_INTERVAL_SECONDS")?;

        override_var(&mut self.routing.default_quality_threshold, "ASAHI_ROUTING_DEFAULT_QUALITY_THRESHOLD")?;
        override_var(&mut self.routing.default_latency_budget_ms, "ASAHI_ROUTING_DEFAULT_LATENCY_BUDGET_MS")?;

        override_var(&mut self.tracking.baseline_input_rate, "ASAHI_TRACKING_BASELINE_INPUT_RATE")?;
        override_var(&mut self.tracking.baseline_output_rate, "ASAHI_TRACKING_BASELINE_OUTPUT_RATE")?;

        override_var(&mut self.observability.enabled, "ASAHI_OBSERVABILITY_ENABLED")?;
        override_var(&mut self.observability.collection_interval_seconds, "ASAHI_OBSERVABILITY_COLLECTION_INTERVAL_SECONDS")?;
        override_var(&mut self.observability.retention_hours, "ASAHI_OBSERVABILITY_RETENTION_HOURS")?;
        override_var(&mut self.observability.anomaly.cost_spike_threshold, "ASAHI_OBSERVABILITY_COST_SPIKE_THRESHOLD")?;
        override_var(&mut self.observability.anomaly.latency_spike_threshold, "ASAHI_OBSERVABILITY_LATENCY_SPIKE_THRESHOLD")?;
        override_var(&mut self.observability.anomaly.error_rate_threshold, "ASAHI_OBSERVABILITY_ERROR_RATE_THRESHOLD")?;
        override_var(&mut self.observability.anomaly.cache_degradation_threshold, "ASAHI_OBSERVABILITY_CACHE_DEGRADATION_THRESHOLD")?;
        override_var(&mut self.observability.anomaly.quality_drop_threshold, "ASAHI_OBSERVABILITY_QUALITY_DROP_THRESHOLD")?;
        override_var(&mut self.observability.anomaly.rolling_window_hours, "ASAHI_OBSERVABILITY_ROLLING_WINDOW_HOURS")?;
        override_var(&mut self.observability.forecasting.ema_span_days, "ASAHI_OBSERVABILITY_EMA_SPAN_DAYS")?;
        override_var(&mut self.observability.forecasting.min_data_points, "ASAHI_OBSERVABILITY_MIN_DATA_POINTS")?;
        override_var(&mut self.observability.forecasting.stable_threshold_pct, "ASAHI_OBSERVABILITY_STABLE_THRESHOLD_PCT")?;

        override_var(&mut self.embeddings.model_name, "ASAHI_EMBEDDINGS_MODEL_NAME")?;
        override_var(&mut self.embeddings.dimension, "ASAHI_EMBEDDINGS_DIMENSION")?;
        override_var(&mut self.embeddings.batch_size, "ASAHI_EMBEDDINGS_BATCH_SIZE")?;
        override_var(&mut self.embeddings.timeout_seconds, "ASAHI_EMBEDDINGS_TIMEOUT_SECONDS")?;
        override_var(&mut self.embeddings.max_retries, "ASAHI_EMBEDDINGS_MAX_RETRIES")?;
        override_var(&mut self.embeddings.memo_max_entries, "ASAHI_EMBEDDINGS_MEMO_MAX_ENTRIES")?;

        override_var(&mut self.batching.min_batch_size, "ASAHI_BATCHING_MIN_BATCH_SIZE")?;
        override_var(&mut self.batching.max_batch_size, "ASAHI_BATCHING_MAX_BATCH_SIZE")?;
        override_var(&mut self.batching.max_wait_ms, "ASAHI_BATCHING_MAX_WAIT_MS")?;
        override_var(&mut self.batching.latency_threshold_ms, "ASAHI_BATCHING_LATENCY_THRESHOLD_MS")?;
        override_var(&mut self.batching.poll_interval_ms, "ASAHI_BATCHING_POLL_INTERVAL_MS")?;

        override_var(&mut self.feature_store.provider, "ASAHI_FEATURE_STORE_PROVIDER")?;
        override_var(&mut self.feature_store.timeout_ms, "ASAHI_FEATURE_STORE_TIMEOUT_MS")?;
        override_var(&mut self.feature_store.fallback_on_timeout, "ASAHI_FEATURE_STORE_FALLBACK_ON_TIMEOUT")?;

        override_var(&mut self.optimization.quality_penalty_weight, "ASAHI_OPTIMIZATION_QUALITY_PENALTY_WEIGHT")?;
        override_var(&mut self.optimization.semantic_top_k, "ASAHI_OPTIMIZATION_SEMANTIC_TOP_K")?;

        override_var(&mut self.governance.encryption_key_env, "ASAHI_GOVERNANCE_ENCRYPTION_KEY_ENV")?;
        override_var(&mut self.governance.pbkdf2_iterations, "ASAHI_GOVERNANCE_PBKDF2_ITERATIONS")?;
        override_var(&mut self.governance.salt_length, "ASAHI_GOVERNANCE_SALT_LENGTH")?;

        Ok(())
    }
}

fn override_var<T>(field: &mut T, key: &str) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => {
            *field = raw
                .parse()
                .map_err(|e| AsahiError::Configuration(format!("{key}={raw}: {e}")))?;
            Ok(())
        }
        Err(_) => Ok(()),
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            rate_limit_per_minute: default_rate_limit(),
            baseline_input_rate: default_baseline_input_rate(),
            baseline_output_rate: default_baseline_output_rate(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
            max_entries: default_cache_entries(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            default_quality_threshold: default_quality_threshold(),
            default_latency_budget_ms: default_latency_budget(),
            quality_map: default_quality_map(),
            latency_map: default_latency_map(),
            task_overrides: default_task_overrides(),
        }
    }
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            baseline_input_rate: default_baseline_input_rate(),
            baseline_output_rate: default_baseline_output_rate(),
        }
    }
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            collection_interval_seconds: default_collection_interval(),
            retention_hours: default_retention_hours(),
            anomaly: AnomalySettings::default(),
            forecasting: ForecastSettings::default(),
        }
    }
}

impl Default for AnomalySettings {
    fn default() -> Self {
        Self {
            cost_spike_threshold: default_spike_threshold(),
            latency_spike_threshold: default_spike_threshold(),
            error_rate_threshold: default_error_rate(),
            cache_degradation_threshold: default_cache_degradation(),
            quality_drop_threshold: default_quality_drop(),
            rolling_window_hours: default_rolling_window(),
        }
    }
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            ema_span_days: default_ema_span(),
            min_data_points: default_min_data_points(),
            stable_threshold_pct: default_stable_threshold(),
        }
    }
}

impl Default for EmbeddingsSettings {
    fn default() -> Self {
        Self {
            model_name: default_embedding_model(),
            dimension: default_dimension(),
            batch_size: default_embed_batch(),
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            memo_max_entries: default_memo_entries(),
        }
    }
}

impl Default for BatchingSettings {
    fn default() -> Self {
        Self {
            min_batch_size: default_min_batch(),
            max_batch_size: default_max_batch(),
            max_wait_ms: default_max_wait(),
            latency_threshold_ms: default_latency_threshold(),
            eligible_task_types: default_eligible_tasks(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for FeatureStoreSettings {
    fn default() -> Self {
        Self {
            provider: default_fs_provider(),
            timeout_ms: default_fs_timeout(),
            fallback_on_timeout: true,
        }
    }
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            quality_penalty_weight: default_quality_penalty(),
            semantic_top_k: default_top_k(),
        }
    }
}

impl Default for GovernanceSettings {
    fn default() -> Self {
        Self {
            encryption_key_env: default_key_env(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
            salt_length: default_salt_length(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_rate_limit() -> u32 {
    100
}

fn default_baseline_input_rate() -> f64 {
    0.010
}

fn default_baseline_output_rate() -> f64 {
    0.030
}

fn default_cache_ttl() -> u64 {
    86_400
}

fn default_cache_entries() -> u64 {
    10_000
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_quality_threshold() -> f64 {
    3.5
}

fn default_latency_budget() -> u64 {
    300
}

fn default_quality_map() -> HashMap<String, f64> {
    HashMap::from([
        ("low".to_string(), 3.0),
        ("medium".to_string(), 3.5),
        ("high".to_string(), 4.0),
        ("max".to_string(), 4.5),
    ])
}

fn default_latency_map() -> HashMap<String, u64> {
    HashMap::from([
        ("slow".to_string(), 2000),
        ("normal".to_string(), 500),
        ("fast".to_string(), 300),
        ("instant".to_string(), 150),
    ])
}

fn default_task_overrides() -> HashMap<String, TaskOverride> {
    HashMap::from([
        (
            "coding".to_string(),
            TaskOverride {
                min_quality: 4.0,
                max_latency_ms: 500,
            },
        ),
        (
            "reasoning".to_string(),
            TaskOverride {
                min_quality: 4.0,
                max_latency_ms: 500,
            },
        ),
        (
            "legal".to_string(),
            TaskOverride {
                min_quality: 4.2,
                max_latency_ms: 2000,
            },
        ),
    ])
}

fn default_true() -> bool {
    true
}

fn default_collection_interval() -> u64 {
    10
}

fn default_retention_hours() -> u64 {
    168
}

fn default_spike_threshold() -> f64 {
    2.0
}

fn default_error_rate() -> f64 {
    0.01
}

fn default_cache_degradation() -> f64 {
    0.5
}

fn default_quality_drop() -> f64 {
    0.5
}

fn default_rolling_window() -> u64 {
    24
}

fn default_ema_span() -> u32 {
    7
}

fn default_min_data_points() -> usize {
    3
}

fn default_stable_threshold() -> f64 {
    5.0
}

fn default_embedding_model() -> String {
    "embed-english-v3.0".to_string()
}

fn default_dimension() -> usize {
    1024
}

fn default_embed_batch() -> usize {
    96
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_memo_entries() -> u64 {
    10_000
}

fn default_min_batch() -> usize {
    2
}

fn default_max_batch() -> usize {
    10
}

fn default_max_wait() -> u64 {
    500
}

fn default_latency_threshold() -> u64 {
    200
}

fn default_eligible_tasks() -> Vec<String> {
    vec![
        "summarization".to_string(),
        "faq".to_string(),
        "translation".to_string(),
    ]
}

fn default_poll_interval() -> u64 {
    50
}

fn default_fs_provider() -> String {
    "local".to_string()
}

fn default_fs_timeout() -> u64 {
    200
}

fn default_quality_penalty() -> f64 {
    2.0
}

fn default_top_k() -> usize {
    5
}

fn default_key_env() -> String {
    "ASAHI_ENCRYPTION_KEY".to_string()
}

fn default_pbkdf2_iterations() -> u32 {
    480_000
}

fn default_salt_length() -> usize {
    16
}
