//! Routing constraints and the preference interpreter.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RoutingSettings;
use crate::types::TaskType;
use crate::{AsahiError, Result};

/// Constraints the router must satisfy when selecting a model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoutingConstraints {
    /// Minimum acceptable quality score (0.0..5.0).
    pub min_quality: f64,
    /// Maximum acceptable average latency in milliseconds.
    pub max_latency_ms: u64,
    /// Maximum dollar cost per request, if bounded.
    pub max_cost_per_request: Option<f64>,
}

impl Default for RoutingConstraints {
    fn default() -> Self {
        Self {
            min_quality: 3.5,
            max_latency_ms: 300,
            max_cost_per_request: None,
        }
    }
}

/// The outcome of a routing decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// The selected model's canonical name.
    pub model_name: String,
    /// Quality-per-dollar score used for ranking.
    pub score: f64,
    /// Human-readable explanation of the decision.
    pub reason: String,
    /// Number of models that passed the filter.
    pub candidates_considered: usize,
    /// True when no model passed filtering and the router fell back to
    /// the highest-quality available model.
    pub fallback_used: bool,
}

/// User quality preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreference {
    Low,
    Medium,
    High,
    Max,
}

impl QualityPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Max => "max",
        }
    }

    /// Parse a preference string; unknown values are a validation error.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "max" => Ok(Self::Max),
            other => Err(AsahiError::validation(
                "quality_preference",
                format!("'{other}' (allowed: low, medium, high, max)"),
            )),
        }
    }
}

/// User latency preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyPreference {
    Slow,
    Normal,
    Fast,
    Instant,
}

impl LatencyPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Slow => "slow",
            Self::Normal => "normal",
            Self::Fast => "fast",
            Self::Instant => "instant",
        }
    }

    /// Parse a preference string; unknown values are a validation error.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "slow" => Ok(Self::Slow),
            "normal" => Ok(Self::Normal),
            "fast" => Ok(Self::Fast),
            "instant" => Ok(Self::Instant),
            other => Err(AsahiError::validation(
                "latency_preference",
                format!("'{other}' (allowed: slow, normal, fast, instant)"),
            )),
        }
    }
}

/// Converts human-friendly preferences into numeric routing constraints.
///
/// After the preference maps resolve, per-task overrides apply: quality
/// floors are raised (`max`) and latency budgets are tightened (`min`)
/// where the task demands it.
pub struct ConstraintInterpreter {
    settings: RoutingSettings,
}

impl ConstraintInterpreter {
    pub fn new(settings: RoutingSettings) -> Self {
        Self { settings }
    }

    /// Resolve preferences (defaulting to medium/normal) plus task-type
    /// overrides into concrete constraints.
    pub fn interpret(
        &self,
        quality: Option<QualityPreference>,
        latency: Option<LatencyPreference>,
        task: TaskType,
    ) -> RoutingConstraints {
        let quality = quality.unwrap_or(QualityPreference::Medium);
        let latency = latency.unwrap_or(LatencyPreference::Normal);

        let mut min_quality = self
            .settings
            .quality_map
            .get(quality.as_str())
            .copied()
            .unwrap_or(self.settings.default_quality_threshold);
        let mut max_latency_ms = self
            .settings
            .latency_map
            .get(latency.as_str())
            .copied()
            .unwrap_or(self.settings.default_latency_budget_ms);

        if let Some(overrides) = self.settings.task_overrides.get(task.as_str()) {
            min_quality = min_quality.max(overrides.min_quality);
            max_latency_ms = max_latency_ms.min(overrides.max_latency_ms);
            debug!(
                task = %task,
                min_quality,
                max_latency_ms,
                "task-type override applied"
            );
        }

        RoutingConstraints {
            min_quality,
            max_latency_ms,
            max_cost_per_request: None,
        }
    }

    /// Apply task-type overrides to constraints that arrived as numbers
    /// rather than preferences (the orchestrator path).
    pub fn apply_task_overrides(
        &self,
        mut constraints: RoutingConstraints,
        task: TaskType,
    ) -> RoutingConstraints {
        if let Some(overrides) = self.settings.task_overrides.get(task.as_str()) {
            constraints.min_quality = constraints.min_quality.max(overrides.min_quality);
            constraints.max_latency_ms = constraints.max_latency_ms.min(overrides.max_latency_ms);
            debug!(
                task = %task,
                min_quality = constraints.min_quality,
                max_latency_ms = constraints.max_latency_ms,
                "task-type override applied"
            );
        }
        constraints
    }
}
