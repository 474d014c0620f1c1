//! Inference request input.

use serde::{Deserialize, Serialize};

use crate::{AsahiError, Result};

/// Maximum accepted prompt length in bytes.
pub const MAX_PROMPT_LEN: usize = 100_000;

/// Accepted latency budget range in milliseconds.
pub const LATENCY_BUDGET_RANGE: std::ops::RangeInclusive<u64> = 50..=30_000;

/// How aggressively the semantic cache may trade quality for cost.
///
/// `High` sensitivity to cost means looser similarity thresholds
/// (cache aggressively); `Low` means stricter ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSensitivity {
    High,
    Medium,
    Low,
}

impl CostSensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// A single inference request submitted to the gateway.
///
/// Build with [`InferenceRequest::new`] and the `with_*` setters, then
/// pass to [`Gateway::infer`](crate::gateway::Gateway::infer), which
/// validates before doing any work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// The user query (1..100_000 bytes, not blank).
    pub prompt: String,
    /// Optional task identifier for tracking.
    pub task_id: Option<String>,
    /// Maximum acceptable end-to-end latency (50..30_000 ms).
    pub latency_budget_ms: u64,
    /// Minimum quality score (0.0..5.0).
    pub quality_threshold: f64,
    /// Optional maximum dollar cost for this request.
    pub cost_budget: Option<f64>,
    /// Optional caller identity.
    pub user_id: Option<String>,
    /// Optional tenant scope; when set, exact-cache keys are namespaced.
    pub tenant_id: Option<String>,
    /// How aggressively the semantic cache may reuse near matches.
    pub cost_sensitivity: CostSensitivity,
    /// Force a specific model instead of routing.
    pub model_override: Option<String>,
}

impl InferenceRequest {
    /// Create a request with default constraints (quality 3.5, 300 ms).
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            task_id: None,
            latency_budget_ms: 300,
            quality_threshold: 3.5,
            cost_budget: None,
            user_id: None,
            tenant_id: None,
            cost_sensitivity: CostSensitivity::Medium,
            model_override: None,
        }
    }

    pub fn with_latency_budget_ms(mut self, ms: u64) -> Self {
        self.latency_budget_ms = ms;
        self
    }

    pub fn with_quality_threshold(mut self, quality: f64) -> Self {
        self.quality_threshold = quality;
        self
    }

    pub fn with_cost_budget(mut self, dollars: f64) -> Self {
        self.cost_budget = Some(dollars);
        self
    }

    pub fn with_task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn with_user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn with_tenant_id(mut self, id: impl Into<String>) -> Self {
        self.tenant_id = Some(id.into());
        self
    }

    pub fn with_cost_sensitivity(mut self, sensitivity: CostSensitivity) -> Self {
        self.cost_sensitivity = sensitivity;
        self
    }

    pub fn with_model_override(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    /// Check field ranges; called by the gateway before any cache or
    /// provider traffic.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(AsahiError::validation("prompt", "must not be empty"));
        }
        if self.prompt.len() > MAX_PROMPT_LEN {
            return Err(AsahiError::validation(
                "prompt",
                format!("exceeds {MAX_PROMPT_LEN} bytes"),
            ));
        }
        if !LATENCY_BUDGET_RANGE.contains(&self.latency_budget_ms) {
            return Err(AsahiError::validation(
                "latency_budget_ms",
                format!(
                    "{} outside {}..{} ms",
                    self.latency_budget_ms,
                    LATENCY_BUDGET_RANGE.start(),
                    LATENCY_BUDGET_RANGE.end()
                ),
            ));
        }
        if !(0.0..=5.0).contains(&self.quality_threshold) {
            return Err(AsahiError::validation(
                "quality_threshold",
                format!("{} outside 0.0..5.0", self.quality_threshold),
            ));
        }
        if let Some(budget) = self.cost_budget
            && budget < 0.0
        {
            return Err(AsahiError::validation("cost_budget", "must be >= 0"));
        }
        Ok(())
    }
}
