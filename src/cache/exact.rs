//! Exact-match cache (Tier 1).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::backend::{CacheBackend, MemoryBackend};
use crate::{AsahiError, Result};

/// A single cached inference response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SHA-256 hex digest of the prompt, optionally `tenant:`-prefixed.
    pub fingerprint: String,
    /// The original prompt text.
    pub prompt: String,
    /// Cached response text.
    pub response: String,
    /// Model that produced the response.
    pub model: String,
    /// Dollar cost of the original inference call.
    pub cost: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Number of times this entry has been served.
    pub access_count: u64,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0.0 before any lookup.
    pub hit_rate: f64,
    pub entry_count: usize,
    /// Sum of original costs of every served hit.
    pub total_cost_saved: f64,
}

/// Deterministic fingerprint for a prompt.
///
/// SHA-256 over the trimmed UTF-8 prompt bytes; a tenant id, when
/// present, namespaces the key so tenants never share entries.
pub fn generate_key(prompt: &str, tenant: Option<&str>) -> String {
    let digest = Sha256::digest(prompt.trim().as_bytes());
    let hash = hex::encode(digest);
    match tenant {
        Some(tenant) => format!("{tenant}:{hash}"),
        None => hash,
    }
}

/// Exact-match cache with TTL expiration.
///
/// Expired entries are evicted on access and counted as misses, so a
/// returned hit always satisfies `now < expires_at`. Backend failures
/// on lookup degrade to misses; failures on store are logged and the
/// request proceeds uncached.
pub struct ExactCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    cost_saved: Mutex<f64>,
}

impl ExactCache {
    /// In-memory cache with the given TTL in seconds.
    pub fn new(ttl_seconds: u64) -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()), ttl_seconds)
    }

    /// Cache over a custom storage backend.
    pub fn with_backend(backend: Arc<dyn CacheBackend>, ttl_seconds: u64) -> Self {
        Self {
            backend,
            ttl: Duration::seconds(ttl_seconds as i64),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            cost_saved: Mutex::new(0.0),
        }
    }

    /// Look up a cached response by prompt.
    ///
    /// On a hit the entry's `access_count` is incremented. An expired
    /// entry is deleted and reported as a miss, as is any backend error.
    pub async fn get(&self, prompt: &str, tenant: Option<&str>) -> Option<CacheEntry> {
        let key = generate_key(prompt, tenant);
        let entry = match self.backend.get(&key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "cache backend get failed; treating as miss");
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let Some(mut entry) = entry else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let now = Utc::now();
        if now >= entry.expires_at {
            debug!(fingerprint = %key, "cache entry expired");
            if let Err(e) = self.backend.remove(&key).await {
                warn!(error = %e, "failed to evict expired cache entry");
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        entry.access_count += 1;
        self.hits.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut saved) = self.cost_saved.lock() {
            *saved += entry.cost;
        }
        // Persist the bumped access count; a failure here only loses
        // the counter, not the hit.
        if let Err(e) = self.backend.set(entry.clone()).await {
            warn!(error = %e, "failed to persist access count");
        }
        debug!(fingerprint = %key, access_count = entry.access_count, "cache hit");
        Some(entry)
    }

    /// Store a new cache entry.
    ///
    /// Rejects empty prompts. An existing fingerprint is overwritten
    /// with a warning. Backend store failures are logged and swallowed
    /// so the request still succeeds.
    pub async fn set(
        &self,
        prompt: &str,
        response: &str,
        model: &str,
        cost: f64,
        tenant: Option<&str>,
    ) -> Result<CacheEntry> {
        if prompt.trim().is_empty() {
            return Err(AsahiError::validation("prompt", "must not be empty"));
        }

        let key = generate_key(prompt, tenant);
        let now = Utc::now();
        let entry = CacheEntry {
            fingerprint: key.clone(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            model: model.to_string(),
            cost,
            created_at: now,
            expires_at: now + self.ttl,
            access_count: 0,
        };

        match self.backend.get(&key).await {
            Ok(Some(_)) => warn!(fingerprint = %key, "overwriting existing cache entry"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cache backend get failed during set"),
        }

        if let Err(e) = self.backend.set(entry.clone()).await {
            warn!(error = %e, fingerprint = %key, "cache backend set failed; proceeding uncached");
        } else {
            debug!(fingerprint = %key, "cache set");
        }
        Ok(entry)
    }

    /// Remove a cache entry by prompt; returns whether one existed.
    pub async fn invalidate(&self, prompt: &str, tenant: Option<&str>) -> bool {
        let key = generate_key(prompt, tenant);
        match self.backend.remove(&key).await {
            Ok(removed) => {
                if removed {
                    info!(fingerprint = %key, "cache entry invalidated");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "cache backend remove failed");
                false
            }
        }
    }

    /// Remove all entries; returns the number removed.
    pub async fn clear(&self) -> usize {
        match self.backend.clear().await {
            Ok(count) => {
                info!(entries_removed = count, "cache cleared");
                count
            }
            Err(e) => {
                warn!(error = %e, "cache backend clear failed");
                0
            }
        }
    }

    /// Remove all expired entries; returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        match self.backend.purge_expired(Utc::now()).await {
            Ok(count) => {
                if count > 0 {
                    info!(count, "expired cache entries cleaned up");
                }
                count
            }
            Err(e) => {
                warn!(error = %e, "cache backend purge failed");
                0
            }
        }
    }

    /// Aggregate hit/miss statistics.
    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let total_cost_saved = self.cost_saved.lock().map(|v| *v).unwrap_or(0.0);
        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            entry_count: self.backend.len().await.unwrap_or(0),
            total_cost_saved: crate::registry::round6(total_cost_saved),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_key_is_deterministic() {
        assert_eq!(generate_key("hello", None), generate_key("hello", None));
        assert_ne!(generate_key("hello", None), generate_key("world", None));
    }

    #[test]
    fn generate_key_trims_whitespace() {
        assert_eq!(generate_key("  hello  ", None), generate_key("hello", None));
    }

    #[test]
    fn generate_key_namespaces_tenants() {
        let shared = generate_key("hello", None);
        let scoped = generate_key("hello", Some("acme"));
        assert_ne!(shared, scoped);
        assert!(scoped.starts_with("acme:"));
    }
}
