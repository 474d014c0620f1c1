//! Inference result output.

use serde::{Deserialize, Serialize};

/// Which cache tier, if any, served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Fresh inference; no cache was involved.
    None,
    /// Tier 1, fingerprint-identical prompt.
    Exact,
    /// Tier 2, embedding similarity with economic admission.
    Semantic,
}

impl CacheTier {
    /// Stable label for metrics and event records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Exact => "exact",
            Self::Semantic => "semantic",
        }
    }
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The completed result of an inference request.
///
/// Immutable snapshot returned by the gateway; cache hits report
/// `cost = 0.0` and the tier that served them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    /// Identifier for tracing this request across logs and events.
    pub request_id: String,
    /// The LLM response text.
    pub response: String,
    /// Model that produced (or originally produced) the response.
    pub model_used: String,
    /// Actual input token count (0 on cache hits).
    pub tokens_input: u64,
    /// Actual output token count (0 on cache hits).
    pub tokens_output: u64,
    /// Dollar cost of this request.
    pub cost: f64,
    /// End-to-end latency in milliseconds.
    pub latency_ms: u64,
    /// Which cache tier served the request, if any.
    pub cache_tier: CacheTier,
    /// Why this model was chosen.
    pub routing_reason: String,
}
