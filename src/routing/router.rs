//! Filter-score-select routing over the model registry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::constraints::{RoutingConstraints, RoutingDecision};
use crate::registry::{Availability, ModelProfile, ModelRegistry, calculate_cost, estimate_tokens};
use crate::{AsahiError, Result};

/// Guard against division by a free model's zero cost.
const COST_EPSILON: f64 = 1e-6;

/// An alternative model suggestion for explicit routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAlternative {
    pub model: String,
    pub estimated_cost: f64,
    pub estimated_quality: f64,
    /// Percentage saved versus the explicitly chosen model.
    pub savings_percent: f64,
}

/// Result of an explicit model selection, with what it would have cost
/// to pick something else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplicitDecision {
    pub model_name: String,
    pub reason: String,
    pub alternatives: Vec<ModelAlternative>,
}

/// Routes inference requests to the cheapest model that satisfies the
/// constraints.
///
/// Filter-score-select: drop models that miss quality, latency, or
/// cost constraints; score the rest by quality per dollar; take the
/// argmax (ties broken by higher quality, then by name).
pub struct Router {
    registry: Arc<ModelRegistry>,
}

impl Router {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Select the optimal model for the given constraints.
    ///
    /// An empty registry is fatal. When no model passes the filter, the
    /// decision falls back to the highest-quality available model with
    /// `fallback_used = true`.
    pub fn select_model(&self, constraints: &RoutingConstraints) -> Result<RoutingDecision> {
        if self.registry.is_empty() {
            return Err(AsahiError::NoModelsAvailable);
        }

        let candidates = self.filter(constraints);

        if candidates.is_empty() {
            warn!(
                min_quality = constraints.min_quality,
                max_latency_ms = constraints.max_latency_ms,
                "no models pass constraints; falling back to highest quality"
            );
            let best = self.highest_quality_available()?;
            return Ok(RoutingDecision {
                model_name: best.name.clone(),
                score: 0.0,
                reason: format!(
                    "fallback to {}: no models met constraints (quality>={}, latency<={}ms)",
                    best.name, constraints.min_quality, constraints.max_latency_ms
                ),
                candidates_considered: 0,
                fallback_used: true,
            });
        }

        let count = candidates.len();
        let (best, score) = select(score_candidates(candidates));

        Ok(RoutingDecision {
            model_name: best.name.clone(),
            score: (score * 10_000.0).round() / 10_000.0,
            reason: format!(
                "best quality/cost ratio among {count} candidates (score={score:.2})"
            ),
            candidates_considered: count,
            fallback_used: false,
        })
    }

    /// Honor an explicit model choice, reporting what the alternatives
    /// would have cost.
    pub fn route_explicit(&self, model_name: &str, prompt: &str) -> Result<ExplicitDecision> {
        let chosen = self.registry.get(model_name)?;
        if chosen.availability == Availability::Unavailable {
            return Err(AsahiError::ModelNotFound(format!(
                "{model_name} is currently unavailable"
            )));
        }

        let input_tokens = estimate_tokens(prompt);
        let output_tokens = ((input_tokens as f64 * 0.6) as u64).max(20);
        let chosen_cost = calculate_cost(chosen, input_tokens, output_tokens);

        let mut alternatives: Vec<ModelAlternative> = self
            .registry
            .all()
            .into_iter()
            .filter(|p| p.name != model_name)
            .map(|p| {
                let alt_cost = calculate_cost(p, input_tokens, output_tokens);
                let savings = if chosen_cost > 0.0 {
                    (chosen_cost - alt_cost) / chosen_cost * 100.0
                } else {
                    0.0
                };
                ModelAlternative {
                    model: p.name.clone(),
                    estimated_cost: alt_cost,
                    estimated_quality: p.quality_score,
                    savings_percent: (savings * 10.0).round() / 10.0,
                }
            })
            .collect();
        alternatives.sort_by(|a, b| b.savings_percent.total_cmp(&a.savings_percent));

        Ok(ExplicitDecision {
            model_name: model_name.to_string(),
            reason: format!(
                "user selected {model_name}; {} alternatives available",
                alternatives.len()
            ),
            alternatives,
        })
    }

    /// The highest-quality model that is not unavailable.
    pub fn highest_quality_available(&self) -> Result<&ModelProfile> {
        self.registry
            .all()
            .into_iter()
            .filter(|p| p.availability != Availability::Unavailable)
            .max_by(|a, b| {
                a.quality_score
                    .total_cmp(&b.quality_score)
                    .then_with(|| b.name.cmp(&a.name))
            })
            .ok_or(AsahiError::NoModelsAvailable)
    }

    fn filter(&self, constraints: &RoutingConstraints) -> Vec<&ModelProfile> {
        let mut candidates = self
            .registry
            .filter(constraints.min_quality, constraints.max_latency_ms);
        if let Some(budget) = constraints.max_cost_per_request {
            candidates.retain(|p| p.avg_cost() <= budget);
        }
        candidates
    }
}

fn score_candidates(candidates: Vec<&ModelProfile>) -> Vec<(&ModelProfile, f64)> {
    candidates
        .into_iter()
        .map(|p| {
            let score = p.quality_score / p.avg_cost().max(COST_EPSILON);
            (p, score)
        })
        .collect()
}

/// Argmax by score; ties broken by higher quality, then lexicographic
/// model name.
fn select<'a>(scored: Vec<(&'a ModelProfile, f64)>) -> (&'a ModelProfile, f64) {
    let mut best = scored[0];
    for (profile, score) in scored.into_iter().skip(1) {
        let better = score
            .total_cmp(&best.1)
            .then_with(|| profile.quality_score.total_cmp(&best.0.quality_score))
            .then_with(|| best.0.name.cmp(&profile.name));
        if better == std::cmp::Ordering::Greater {
            best = (profile, score);
        }
    }
    best
}
