//! In-memory cache store for tests and embedding.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CacheEntry, CacheError, CacheKey, CacheStore};

/// [`CacheStore`] kept in a concurrent map. Contents do not survive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts a body for `url` directly, bypassing any transport.
    ///
    /// Used to pre-seed a cache, including with deliberately corrupt bodies.
    pub fn seed(&self, url: &str, body: impl Into<Vec<u8>>) {
        let entry = CacheEntry::new(url, body.into());
        self.entries.insert(entry.key.clone(), entry);
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn save(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.entries.remove(key).is_some())
    }
}
