//! Batch eligibility rules.

use std::sync::Arc;

use tracing::debug;

use crate::config::BatchingSettings;
use crate::registry::{ModelRegistry, estimate_tokens};
use crate::types::TaskType;

/// Result of batch eligibility evaluation.
#[derive(Debug, Clone)]
pub enum BatchEligibility {
    Eligible {
        /// Group key, e.g. `summarization:claude-3-5-sonnet`.
        batch_group: String,
        /// How long this request can wait for a batch to form.
        max_wait_ms: u64,
    },
    Ineligible { reason: String },
}

impl BatchEligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible { .. })
    }
}

/// Evaluates whether requests can be coalesced into provider batches.
///
/// Rules, in order: the latency budget must leave room to wait, the
/// task type must be in the configured eligible set, and the prompt
/// must fit in the model's per-request share of a full batch.
pub struct BatchEngine {
    settings: BatchingSettings,
    registry: Arc<ModelRegistry>,
}

impl BatchEngine {
    pub fn new(settings: BatchingSettings, registry: Arc<ModelRegistry>) -> Self {
        Self { settings, registry }
    }

    pub fn evaluate(
        &self,
        prompt: &str,
        task: TaskType,
        model: &str,
        latency_budget_ms: u64,
    ) -> BatchEligibility {
        if latency_budget_ms <= self.settings.latency_threshold_ms {
            debug!(
                latency_budget_ms,
                threshold_ms = self.settings.latency_threshold_ms,
                "ineligible: latency budget too tight"
            );
            return BatchEligibility::Ineligible {
                reason: format!(
                    "latency budget {latency_budget_ms}ms does not exceed threshold {}ms",
                    self.settings.latency_threshold_ms
                ),
            };
        }

        if !self
            .settings
            .eligible_task_types
            .iter()
            .any(|t| t == task.as_str())
        {
            debug!(task = %task, "ineligible: task type not batchable");
            return BatchEligibility::Ineligible {
                reason: format!(
                    "task type '{task}' is not eligible for batching (eligible: {})",
                    self.settings.eligible_task_types.join(", ")
                ),
            };
        }

        let token_count = estimate_tokens(prompt);
        if let Ok(profile) = self.registry.get(model) {
            let per_request_limit = profile.max_input_tokens / self.settings.max_batch_size as u64;
            if token_count > per_request_limit {
                debug!(
                    token_count,
                    per_request_limit,
                    model,
                    "ineligible: prompt too large for batching"
                );
                return BatchEligibility::Ineligible {
                    reason: format!(
                        "prompt token count ({token_count}) exceeds per-request batch limit \
                         ({per_request_limit}) for model '{model}'"
                    ),
                };
            }
        }

        let estimated_inference_ms = self
            .registry
            .get(model)
            .map(|p| p.avg_latency_ms)
            .unwrap_or(100);
        let max_wait_ms = latency_budget_ms
            .saturating_sub(estimated_inference_ms)
            .min(self.settings.max_wait_ms);

        let batch_group = format!("{task}:{model}");
        debug!(batch_group = %batch_group, max_wait_ms, token_count, "eligible for batching");

        BatchEligibility::Eligible {
            batch_group,
            max_wait_ms,
        }
    }
}
