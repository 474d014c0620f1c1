//! The inference event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CacheTier, TaskType};

/// An immutable log record for one completed inference request.
///
/// Appended to the collector after every completed request and
/// retained in memory up to the configured horizon. All fields are
/// named and typed; nothing downstream inspects string-keyed maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceEvent {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub task_type: TaskType,
    /// Model that handled (or originally produced) the response.
    pub model: String,
    pub cache_tier: CacheTier,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub latency_ms: u64,
    /// Computed dollar cost.
    pub cost: f64,
    pub routing_reason: String,
    /// Predicted or measured quality, when known.
    pub quality_score: Option<f64>,
}

impl InferenceEvent {
    /// Start building an event for a model with a fresh id and the
    /// current timestamp.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now(),
            tenant_id: None,
            user_id: None,
            task_type: TaskType::General,
            model: model.into(),
            cache_tier: CacheTier::None,
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            latency_ms: 0,
            cost: 0.0,
            routing_reason: String::new(),
            quality_score: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_round_trip_preserves_every_field() {
        let mut event = InferenceEvent::new("claude-3-5-sonnet");
        event.tenant_id = Some("acme".to_string());
        event.user_id = Some("u-42".to_string());
        event.task_type = TaskType::Coding;
        event.cache_tier = CacheTier::Semantic;
        event.input_tokens = 120;
        event.output_tokens = 340;
        event.total_tokens = 460;
        event.latency_ms = 187;
        event.cost = 0.004321;
        event.routing_reason = "best quality/cost ratio".to_string();
        event.quality_score = Some(4.2);

        let json = serde_json::to_string(&event).unwrap();
        let back: InferenceEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(back.request_id, event.request_id);
        assert_eq!(back.timestamp, event.timestamp);
        assert_eq!(back.tenant_id, event.tenant_id);
        assert_eq!(back.user_id, event.user_id);
        assert_eq!(back.task_type, event.task_type);
        assert_eq!(back.model, event.model);
        assert_eq!(back.cache_tier, event.cache_tier);
        assert_eq!(back.input_tokens, event.input_tokens);
        assert_eq!(back.output_tokens, event.output_tokens);
        assert_eq!(back.total_tokens, event.total_tokens);
        assert_eq!(back.latency_ms, event.latency_ms);
        assert_eq!(back.cost, event.cost);
        assert_eq!(back.routing_reason, event.routing_reason);
        assert_eq!(back.quality_score, event.quality_score);
    }
}
