//! Similarity store abstraction.
//!
//! A backend-agnostic contract for approximate-nearest-neighbor search
//! over embeddings, plus a brute-force in-memory implementation for
//! development and tests. Production deployments plug in an external
//! ANN index behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::cosine_similarity;
use crate::types::TaskType;
use crate::{AsahiError, Result};

/// Metadata stored alongside every cached vector.
///
/// Closed record: the semantic cache reads these fields by name, never
/// through string-keyed maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// The original prompt text.
    pub prompt: String,
    /// The cached response text.
    pub response: String,
    /// Model that produced the response.
    pub model: String,
    /// Dollar cost of the original inference.
    pub cost: f64,
    /// Task category the prompt was classified as.
    pub task_type: TaskType,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// An entry to upsert into the similarity store.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Unique identifier for this vector.
    pub id: String,
    /// Unit-norm embedding.
    pub embedding: Vec<f32>,
    pub metadata: VectorMetadata,
}

/// A single result from a similarity search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    /// Cosine similarity clamped to [0, 1].
    pub score: f64,
    pub metadata: VectorMetadata,
}

/// Backend contract for vector storage and search.
///
/// Scores returned by `query` are cosine similarities clamped to
/// [0, 1], sorted descending.
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Insert or update vectors; returns the number upserted.
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<usize>;

    /// Find the top-k most similar vectors, optionally restricted to a
    /// task type.
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<TaskType>,
    ) -> Result<Vec<SearchResult>>;

    /// Delete vectors by id; returns the number actually removed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Total number of stored vectors.
    async fn count(&self) -> Result<usize>;
}

/// Brute-force in-memory similarity store.
///
/// Linear scan over all vectors; fine for development and tests, not
/// for production workloads beyond ~10k vectors.
pub struct InMemoryVectorStore {
    inner: Mutex<StoreState>,
}

struct StoreState {
    vectors: HashMap<String, Vec<f32>>,
    metadata: HashMap<String, VectorMetadata>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreState {
                vectors: HashMap::new(),
                metadata: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreState>> {
        self.inner
            .lock()
            .map_err(|_| AsahiError::SimilarityStore("store lock poisoned".to_string()))
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimilarityStore for InMemoryVectorStore {
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<usize> {
        let mut state = self.lock()?;
        let mut count = 0;
        for entry in entries {
            // New ids must match the dimension already in the store.
            if !state.vectors.contains_key(&entry.id)
                && let Some(existing) = state.vectors.values().next()
                && existing.len() != entry.embedding.len()
            {
                return Err(AsahiError::SimilarityStore(format!(
                    "dimension mismatch: expected {}, got {}",
                    existing.len(),
                    entry.embedding.len()
                )));
            }
            state.vectors.insert(entry.id.clone(), entry.embedding);
            state.metadata.insert(entry.id, entry.metadata);
            count += 1;
        }
        Ok(count)
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<TaskType>,
    ) -> Result<Vec<SearchResult>> {
        let state = self.lock()?;
        let mut results = Vec::new();
        for (id, vector) in &state.vectors {
            let Some(metadata) = state.metadata.get(id) else {
                continue;
            };
            if let Some(task) = filter
                && metadata.task_type != task
            {
                continue;
            }
            let score = cosine_similarity(embedding, vector)?.clamp(0.0, 1.0);
            results.push(SearchResult {
                id: id.clone(),
                score,
                metadata: metadata.clone(),
            });
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        Ok(results)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut state = self.lock()?;
        let mut count = 0;
        for id in ids {
            if state.vectors.remove(id).is_some() {
                state.metadata.remove(id);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.lock()?.vectors.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(id: &str, embedding: Vec<f32>, task: TaskType) -> VectorEntry {
        let now = Utc::now();
        VectorEntry {
            id: id.to_string(),
            embedding,
            metadata: VectorMetadata {
                prompt: format!("prompt {id}"),
                response: format!("response {id}"),
                model: "test-model".to_string(),
                cost: 0.01,
                task_type: task,
                created_at: now,
                expires_at: now + Duration::hours(1),
            },
        }
    }

    #[tokio::test]
    async fn query_sorts_by_similarity_descending() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                entry("far", vec![0.0, 1.0], TaskType::Faq),
                entry("near", vec![1.0, 0.0], TaskType::Faq),
                entry("mid", vec![0.7071, 0.7071], TaskType::Faq),
            ])
            .await
            .unwrap();

        let results = store.query(&[1.0, 0.0], 3, None).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
        assert!(results[0].score > 0.99);
    }

    #[tokio::test]
    async fn query_respects_task_filter_and_top_k() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![
                entry("a", vec![1.0, 0.0], TaskType::Faq),
                entry("b", vec![0.9, 0.1], TaskType::Coding),
            ])
            .await
            .unwrap();

        let results = store
            .query(&[1.0, 0.0], 5, Some(TaskType::Coding))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");

        let capped = store.query(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn upsert_rejects_dimension_mismatch() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![entry("a", vec![1.0, 0.0], TaskType::Faq)])
            .await
            .unwrap();
        let bad = store
            .upsert(vec![entry("b", vec![1.0, 0.0, 0.0], TaskType::Faq)])
            .await;
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn delete_reports_actual_removals() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(vec![entry("a", vec![1.0, 0.0], TaskType::Faq)])
            .await
            .unwrap();
        let removed = store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
