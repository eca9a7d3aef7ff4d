//! Durable read-through cache for GET requests.
//!
//! [`Cache`] sits between the [`Fetcher`](crate::fetch::Fetcher) and the
//! network. It maps each request URL to the body fetched for it, stored in a
//! pluggable [`CacheStore`]. A key holds at most one body; it is replaced only
//! by an explicit [`Cache::invalidate`] followed by a refetch.
//!
//! Network failures are surfaced unchanged; the cache never retries them.

mod error;
mod fs_store;
mod memory;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::fetch::Transport;

pub use error::CacheError;
pub use fs_store::{DEFAULT_CACHE_DIR_NAME, FsStore};
pub use memory::MemoryStore;

/// Lowercase hex SHA-256 of `bytes`.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 hex digest of a full request URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for `url`. The URL must already carry its query
    /// parameters in a fixed order.
    #[must_use]
    pub fn for_url(url: &str) -> Self {
        Self(sha256_hex(url.as_bytes()))
    }

    /// The hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One stored response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub url: String,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry for `url` stamped with the current time.
    #[must_use]
    pub fn new(url: &str, body: Vec<u8>) -> Self {
        Self {
            key: CacheKey::for_url(url),
            url: url.to_string(),
            body,
            fetched_at: Utc::now(),
        }
    }
}

/// Persistence backend for [`Cache`].
///
/// `save` must be atomic per key: a concurrent `load` sees either the old
/// state or the complete new entry, never a partial body.
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// Loads the entry for `key`.
    ///
    /// Returns `Ok(None)` when absent and [`CacheError::Corrupt`] when
    /// present but failing its integrity check.
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores `entry`, replacing any previous entry for its key.
    async fn save(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    /// Deletes the entry for `key`. Returns whether one existed.
    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError>;
}

/// Counters for cache activity.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    fetches: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Requests answered from the store.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Requests that went to the network.
    #[must_use]
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Entries removed by [`Cache::invalidate`] or integrity failures.
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// Read-through cache over a [`Transport`].
///
/// Cheap to clone; clones share the store, transport and counters.
#[derive(Debug, Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    stats: Arc<CacheStats>,
}

impl Cache {
    /// Creates a cache over `store`, filling misses from `transport`.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Returns the body for `url`, from the store if present and intact,
    /// otherwise from the network (and stores it).
    ///
    /// An entry that fails its integrity check is evicted and refetched.
    ///
    /// # Errors
    ///
    /// [`CacheError::Fetch`] if the network request fails (surfaced
    /// unchanged), [`CacheError::Io`] if the store cannot be read or written.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<Vec<u8>, CacheError> {
        let key = CacheKey::for_url(url);

        match self.store.load(&key).await {
            Ok(Some(entry)) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(url, bytes = entry.body.len(), "cache hit");
                return Ok(entry.body);
            }
            Ok(None) => {}
            Err(CacheError::Corrupt { reason, .. }) => {
                warn!(url, %key, %reason, "evicting corrupt cache entry");
                self.store.remove(&key).await?;
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }

        let body = self.transport.fetch(url).await?;
        self.stats.fetches.fetch_add(1, Ordering::Relaxed);
        info!(url, bytes = body.len(), "fetched");

        let entry = CacheEntry::new(url, body);
        self.store.save(&entry).await?;
        Ok(entry.body)
    }

    /// Deletes the stored body for `url`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// [`CacheError::Io`] if the store cannot delete the entry.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn invalidate(&self, url: &str) -> Result<bool, CacheError> {
        let removed = self.store.remove(&CacheKey::for_url(url)).await?;
        if removed {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(url, "cache entry invalidated");
        }
        Ok(removed)
    }

    /// Activity counters shared by all clones.
    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }
}
