//! Semantic cache (Tier 2).
//!
//! Reuses prior responses for semantically similar prompts. Admission
//! is economic, not just geometric: a candidate must clear the per-task
//! similarity threshold AND its expected mismatch cost must undercut
//! the cost of recomputing. The formula:
//!
//! ```text
//! mismatch_cost = (1 - similarity) * quality_penalty_weight
//!                 * task_weight * recompute_cost
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::similarity::{SimilarityStore, VectorEntry, VectorMetadata};
use crate::types::{CostSensitivity, TaskType};
use crate::{AsahiError, Result};

/// Per-task, per-sensitivity similarity thresholds.
///
/// Higher-stakes tasks (coding, legal) get stricter thresholds; FAQ
/// and summarization reuse more aggressively. `CostSensitivity::High`
/// (cost matters most) lowers the bar, `Low` raises it.
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    thresholds: HashMap<TaskType, [f64; 3]>,
    default: [f64; 3],
}

// Index order matches CostSensitivity::{High, Medium, Low}.
fn sensitivity_index(sensitivity: CostSensitivity) -> usize {
    match sensitivity {
        CostSensitivity::High => 0,
        CostSensitivity::Medium => 1,
        CostSensitivity::Low => 2,
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        let thresholds = HashMap::from([
            (TaskType::Faq, [0.70, 0.80, 0.90]),
            (TaskType::Summarization, [0.80, 0.85, 0.92]),
            (TaskType::Reasoning, [0.85, 0.90, 0.95]),
            (TaskType::Coding, [0.90, 0.93, 0.97]),
            (TaskType::Legal, [0.88, 0.92, 0.96]),
        ]);
        Self {
            thresholds,
            default: [0.80, 0.85, 0.92],
        }
    }
}

impl ThresholdTable {
    /// Threshold for a task and sensitivity; unlisted tasks use the
    /// default row.
    pub fn get(&self, task: TaskType, sensitivity: CostSensitivity) -> f64 {
        let row = self.thresholds.get(&task).unwrap_or(&self.default);
        row[sensitivity_index(sensitivity)]
    }

    /// Update a single threshold at runtime.
    pub fn update(
        &mut self,
        task: TaskType,
        sensitivity: CostSensitivity,
        threshold: f64,
    ) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AsahiError::validation(
                "threshold",
                format!("{threshold} outside 0.0..1.0"),
            ));
        }
        let row = self.thresholds.entry(task).or_insert(self.default);
        row[sensitivity_index(sensitivity)] = threshold;
        info!(task = %task, sensitivity = sensitivity.as_str(), threshold, "threshold updated");
        Ok(())
    }
}

/// Economic engine behind Tier 2 admission.
#[derive(Debug, Clone, Copy)]
pub struct MismatchCalculator {
    quality_penalty_weight: f64,
}

impl MismatchCalculator {
    pub fn new(quality_penalty_weight: f64) -> Self {
        Self {
            quality_penalty_weight,
        }
    }

    /// Dollar cost of the quality risk from reusing a near-match.
    pub fn mismatch_cost(&self, similarity: f64, task: TaskType, recompute_cost: f64) -> f64 {
        (1.0 - similarity) * self.quality_penalty_weight * task.mismatch_weight() * recompute_cost
    }

    /// Whether reuse is cheaper than recomputing, with the reasoning.
    pub fn should_use_cache(
        &self,
        similarity: f64,
        task: TaskType,
        recompute_cost: f64,
    ) -> (bool, String) {
        let mc = self.mismatch_cost(similarity, task, recompute_cost);
        if mc < recompute_cost {
            (
                true,
                format!(
                    "using cache: mismatch cost ${mc:.6} < recompute cost ${recompute_cost:.6} \
                     (similarity={similarity:.3}, task={task})"
                ),
            )
        } else {
            (
                false,
                format!(
                    "recomputing: mismatch cost ${mc:.6} >= recompute cost ${recompute_cost:.6} \
                     (similarity={similarity:.3}, task={task})"
                ),
            )
        }
    }
}

impl Default for MismatchCalculator {
    fn default() -> Self {
        Self::new(2.0)
    }
}

/// A successful Tier 2 lookup.
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub response: String,
    pub similarity: f64,
    pub cached_prompt: String,
    pub model: String,
    /// Cost of the original inference, i.e. what the hit saved.
    pub original_cost: f64,
    pub reason: String,
}

/// Outcome of a Tier 2 lookup.
#[derive(Debug, Clone)]
pub enum SemanticLookup {
    Hit(SemanticHit),
    Miss { reason: String },
}

impl SemanticLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Tier 2 cache statistics.
#[derive(Debug, Clone)]
pub struct SemanticStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entry_count: usize,
}

/// Embedding-backed semantic cache with economic admission.
///
/// Embedding and store failures never fail a request: the lookup
/// degrades to a miss and the gateway takes the slow path.
pub struct SemanticCache {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn SimilarityStore>,
    thresholds: ThresholdTable,
    mismatch: MismatchCalculator,
    ttl: Duration,
    top_k: usize,
    /// Embeddings are deterministic, so the vector computed during a
    /// lookup miss is reused when the same prompt is inserted moments
    /// later.
    embed_memo: moka::sync::Cache<String, Vec<f32>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SemanticCache {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn SimilarityStore>,
        ttl_seconds: u64,
    ) -> Self {
        Self::with_config(
            embedder,
            store,
            ttl_seconds,
            ThresholdTable::default(),
            MismatchCalculator::default(),
            5,
            10_000,
        )
    }

    pub fn with_config(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn SimilarityStore>,
        ttl_seconds: u64,
        thresholds: ThresholdTable,
        mismatch: MismatchCalculator,
        top_k: usize,
        memo_max_entries: u64,
    ) -> Self {
        Self {
            embedder,
            store,
            thresholds,
            mismatch,
            ttl: Duration::seconds(ttl_seconds as i64),
            top_k,
            embed_memo: moka::sync::Cache::new(memo_max_entries),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a semantically similar cached response.
    pub async fn lookup(
        &self,
        query: &str,
        task: TaskType,
        sensitivity: CostSensitivity,
        recompute_cost: f64,
    ) -> SemanticLookup {
        let embedding = match self.embed_memoized(query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                error!(error = %e, "failed to embed query for semantic lookup");
                return self.miss(format!("embedding failed: {e}"));
            }
        };

        let candidates = match self.store.query(&embedding, self.top_k, None).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "similarity store query failed");
                return self.miss(format!("similarity store failed: {e}"));
            }
        };

        if candidates.is_empty() {
            return self.miss("no entries in similarity store".to_string());
        }

        let best_score = candidates[0].score;
        let query_threshold = self.thresholds.get(task, sensitivity);
        let now = Utc::now();

        for candidate in &candidates {
            if candidate.metadata.expires_at <= now {
                debug!(id = %candidate.id, "skipping expired semantic entry");
                continue;
            }

            // When the cached entry was classified as a different task,
            // the more lenient of the two thresholds decides. Handles
            // "What is X?" vs "Explain X" landing in different buckets.
            let mut threshold = query_threshold;
            if candidate.metadata.task_type != task {
                let cached_threshold = self.thresholds.get(candidate.metadata.task_type, sensitivity);
                threshold = threshold.min(cached_threshold);
            }
            if candidate.score < threshold {
                continue;
            }

            let (admit, reason) =
                self.mismatch
                    .should_use_cache(candidate.score, task, recompute_cost);
            if admit {
                self.hits.fetch_add(1, Ordering::Relaxed);
                info!(
                    similarity = candidate.score,
                    task = %task,
                    cached_prompt = %truncate(&candidate.metadata.prompt, 40),
                    "semantic cache hit"
                );
                return SemanticLookup::Hit(SemanticHit {
                    response: candidate.metadata.response.clone(),
                    similarity: candidate.score,
                    cached_prompt: candidate.metadata.prompt.clone(),
                    model: candidate.metadata.model.clone(),
                    original_cost: candidate.metadata.cost,
                    reason,
                });
            }
        }

        self.miss(format!(
            "no sufficiently similar cached query (best={best_score:.3}, threshold={query_threshold})"
        ))
    }

    /// Store a prompt/response pair.
    ///
    /// Failures are logged and swallowed; the gateway never fails a
    /// request because the semantic cache could not be populated.
    pub async fn insert(
        &self,
        prompt: &str,
        response: &str,
        model: &str,
        cost: f64,
        task: TaskType,
    ) {
        let embedding = match self.embed_memoized(prompt).await {
            Ok(embedding) => embedding,
            Err(e) => {
                error!(error = %e, "failed to embed prompt for semantic insert");
                return;
            }
        };

        let now = Utc::now();
        let entry = VectorEntry {
            id: Uuid::new_v4().simple().to_string(),
            embedding,
            metadata: VectorMetadata {
                prompt: prompt.to_string(),
                response: response.to_string(),
                model: model.to_string(),
                cost,
                task_type: task,
                created_at: now,
                expires_at: now + self.ttl,
            },
        };

        match self.store.upsert(vec![entry]).await {
            Ok(_) => debug!(task = %task, "semantic cache set"),
            Err(e) => error!(error = %e, "similarity store upsert failed"),
        }
    }

    /// Remove the entry closest to a prompt, if it is a near-exact
    /// match (score > 0.99).
    pub async fn invalidate(&self, prompt: &str) -> bool {
        let Ok(embedding) = self.embed_memoized(prompt).await else {
            return false;
        };
        let Ok(results) = self.store.query(&embedding, 1, None).await else {
            return false;
        };
        if let Some(best) = results.first()
            && best.score > 0.99
        {
            return matches!(self.store.delete(&[best.id.clone()]).await, Ok(n) if n > 0);
        }
        false
    }

    pub async fn stats(&self) -> SemanticStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        SemanticStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.store.count().await.unwrap_or(0),
        }
    }

    async fn embed_memoized(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.embed_memo.get(text) {
            return Ok(cached);
        }
        let embedding = self.embedder.embed_text(text).await?;
        self.embed_memo.insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn miss(&self, reason: String) -> SemanticLookup {
        self.misses.fetch_add(1, Ordering::Relaxed);
        SemanticLookup::Miss { reason }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_stricter_for_high_stakes_tasks() {
        let table = ThresholdTable::default();
        assert!(
            table.get(TaskType::Coding, CostSensitivity::Medium)
                > table.get(TaskType::Faq, CostSensitivity::Medium)
        );
        assert_eq!(table.get(TaskType::Faq, CostSensitivity::Medium), 0.80);
    }

    #[test]
    fn unknown_task_uses_default_row() {
        let table = ThresholdTable::default();
        assert_eq!(table.get(TaskType::Creative, CostSensitivity::Low), 0.92);
    }

    #[test]
    fn threshold_update_validates_range() {
        let mut table = ThresholdTable::default();
        assert!(table.update(TaskType::Faq, CostSensitivity::High, 1.5).is_err());
        table
            .update(TaskType::Faq, CostSensitivity::High, 0.75)
            .unwrap();
        assert_eq!(table.get(TaskType::Faq, CostSensitivity::High), 0.75);
    }

    #[test]
    fn perfect_similarity_always_admits() {
        let calc = MismatchCalculator::default();
        let (admit, _) = calc.should_use_cache(1.0, TaskType::Legal, 0.000001);
        assert!(admit);
        assert_eq!(calc.mismatch_cost(1.0, TaskType::Legal, 1.0), 0.0);
    }

    #[test]
    fn admission_matches_formula() {
        let calc = MismatchCalculator::new(2.0);
        // (1 - 0.9) * 2.0 * 3.0 (coding) = 0.6 < 1.0 -> admit
        let (admit, _) = calc.should_use_cache(0.9, TaskType::Coding, 0.01);
        assert!(admit);
        // (1 - 0.5) * 2.0 * 3.0 = 3.0 >= 1.0 -> reject, any cost
        let (admit, _) = calc.should_use_cache(0.5, TaskType::Coding, 0.01);
        assert!(!admit);
    }

    #[test]
    fn heavier_task_weight_is_more_conservative() {
        let calc = MismatchCalculator::default();
        let faq = calc.mismatch_cost(0.85, TaskType::Faq, 0.01);
        let legal = calc.mismatch_cost(0.85, TaskType::Legal, 0.01);
        assert!(legal > faq);
    }
}
