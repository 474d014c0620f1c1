//! Task classification.

use serde::{Deserialize, Serialize};

/// The category of work a prompt asks for.
///
/// Drives similarity thresholds, mismatch weights, constraint
/// overrides, and batch eligibility. A closed set: unknown or
/// low-confidence detections map to [`TaskType::General`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Faq,
    Summarization,
    Reasoning,
    Coding,
    Translation,
    Classification,
    Creative,
    Legal,
    General,
}

impl TaskType {
    /// Stable lowercase name, used in batch group keys, config tables,
    /// and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Faq => "faq",
            Self::Summarization => "summarization",
            Self::Reasoning => "reasoning",
            Self::Coding => "coding",
            Self::Translation => "translation",
            Self::Classification => "classification",
            Self::Creative => "creative",
            Self::Legal => "legal",
            Self::General => "general",
        }
    }

    /// Parse a stable name back into a task type.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "faq" => Some(Self::Faq),
            "summarization" => Some(Self::Summarization),
            "reasoning" => Some(Self::Reasoning),
            "coding" => Some(Self::Coding),
            "translation" => Some(Self::Translation),
            "classification" => Some(Self::Classification),
            "creative" => Some(Self::Creative),
            "legal" => Some(Self::Legal),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    /// Sensitivity weight for the mismatch-cost calculation.
    ///
    /// Lower weight = more aggressive semantic reuse; higher = more
    /// conservative.
    pub fn mismatch_weight(&self) -> f64 {
        match self {
            Self::Faq | Self::Classification => 1.0,
            Self::Summarization | Self::Translation | Self::General => 1.5,
            Self::Creative => 2.0,
            Self::Reasoning => 2.5,
            Self::Coding => 3.0,
            Self::Legal => 4.0,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_variant() {
        for task in [
            TaskType::Faq,
            TaskType::Summarization,
            TaskType::Reasoning,
            TaskType::Coding,
            TaskType::Translation,
            TaskType::Classification,
            TaskType::Creative,
            TaskType::Legal,
            TaskType::General,
        ] {
            assert_eq!(TaskType::parse(task.as_str()), Some(task));
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(TaskType::parse("poetry-slam"), None);
    }
}
