//! Task type detection from prompt text.
//!
//! Keyword/pattern matching, not a classifier model: cheap enough to
//! run on every request and predictable enough to test. Confidence is
//! proportional to the number of distinct pattern matches.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::types::TaskType;

/// Result of task type detection.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetection {
    pub task_type: TaskType,
    /// Detection confidence in 0.0..1.0.
    pub confidence: f64,
    /// Brief description of the detected intent.
    pub intent: &'static str,
}

struct Pattern {
    regex: Regex,
    task: TaskType,
    intent: &'static str,
}

static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    let defs: [(&str, TaskType, &str); 8] = [
        (
            r"(?i)\b(summarize|summary|summarise|tldr|brief|overview|recap)\b",
            TaskType::Summarization,
            "summarize content",
        ),
        (
            r"(?i)\b(why|explain|reason|analyze|analyse|because|cause|understand)\b",
            TaskType::Reasoning,
            "explain or reason about something",
        ),
        (
            r"(?i)\b(how do i|what is|what are|who is|where is|when did|help with|tell me about)\b",
            TaskType::Faq,
            "answer a factual question",
        ),
        (
            r"(?i)\b(write code|implement|function|class|def |import |python|javascript|typescript|java\b|debug|fix this code|refactor|algorithm)\b",
            TaskType::Coding,
            "write or modify code",
        ),
        (
            r"(?i)\b(translate|convert to|in spanish|in french|in german|in japanese|in chinese|in korean|translation)\b",
            TaskType::Translation,
            "translate text between languages",
        ),
        (
            r"(?i)\b(classify|categorize|categorise|sentiment|label|tag)\b",
            TaskType::Classification,
            "classify or categorize content",
        ),
        (
            r"(?i)\b(write a poem|write a story|creative|haiku|limerick|fiction|compose|lyrics)\b",
            TaskType::Creative,
            "generate creative content",
        ),
        (
            r"(?i)\b(legal|contract|statute|regulation|compliance|attorney|lawyer)\b",
            TaskType::Legal,
            "legal analysis or review",
        ),
    ];
    defs.into_iter()
        .map(|(pattern, task, intent)| Pattern {
            // Patterns are static literals, known to compile.
            regex: Regex::new(pattern).unwrap_or_else(|e| {
                panic!("invalid built-in task pattern for {task}: {e}")
            }),
            task,
            intent,
        })
        .collect()
});

/// Detects the task category of a prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskDetector;

impl TaskDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify a prompt.
    ///
    /// Confidence scales from 0.3 (one match) to 0.95 (four or more),
    /// damped by 10% when multiple task types matched. Blank prompts
    /// and no-match prompts fall back to [`TaskType::General`].
    pub fn detect(&self, prompt: &str) -> TaskDetection {
        if prompt.trim().is_empty() {
            return TaskDetection {
                task_type: TaskType::General,
                confidence: 0.0,
                intent: "empty or blank prompt",
            };
        }

        let mut best: Option<(TaskType, usize, &'static str)> = None;
        let mut matched_types = 0usize;

        for pattern in PATTERNS.iter() {
            let count = pattern.regex.find_iter(prompt).count();
            if count == 0 {
                continue;
            }
            matched_types += 1;
            match best {
                Some((_, best_count, _)) if count <= best_count => {}
                _ => best = Some((pattern.task, count, pattern.intent)),
            }
        }

        let Some((task, count, intent)) = best else {
            return TaskDetection {
                task_type: TaskType::General,
                confidence: 0.1,
                intent: "no strong pattern match; defaulting to general",
            };
        };

        let mut confidence = (0.3 + (count.saturating_sub(1)) as f64 * 0.2).min(0.95);
        if matched_types > 1 {
            confidence *= 0.9;
        }
        confidence = (confidence * 100.0).round() / 100.0;

        debug!(task = %task, confidence, "task type detected");

        TaskDetection {
            task_type: task,
            confidence,
            intent,
        }
    }

    /// Detect with the low-confidence fallback applied: detections
    /// below 0.3 collapse to [`TaskType::General`].
    pub fn detect_or_general(&self, prompt: &str) -> TaskType {
        let detection = self.detect(prompt);
        if detection.confidence < 0.3 {
            TaskType::General
        } else {
            detection.task_type
        }
    }
}
