//! Pluggable storage for the exact cache.
//!
//! The exact cache owns the semantics (fingerprinting, TTL-on-access,
//! statistics); a [`CacheBackend`] is only a keyed store. The in-memory
//! backend below is the default; an external key-value store (which may
//! additionally enforce TTL itself) plugs in behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::exact::CacheEntry;
use crate::{AsahiError, Result};

/// Keyed storage for exact-cache entries.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or overwrite an entry under its fingerprint.
    async fn set(&self, entry: CacheEntry) -> Result<()>;

    /// Remove an entry; returns whether one existed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Remove everything; returns the number of entries removed.
    async fn clear(&self) -> Result<usize>;

    /// Remove entries with `expires_at <= now`; returns the number removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    async fn len(&self) -> Result<usize>;
}

/// In-memory backend: a map behind one mutex.
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries
            .lock()
            .map_err(|_| AsahiError::Configuration("cache backend lock poisoned".to_string()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, entry: CacheEntry) -> Result<()> {
        self.lock()?.insert(entry.fingerprint.clone(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}
