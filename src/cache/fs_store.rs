//! On-disk cache store.
//!
//! Entries live at `<root>/<key[0..2]>/<key>`. Each file is a one-line JSON
//! header followed by the raw body:
//!
//! ```text
//! {"url":"https://...","fetched_at":"2024-05-01T10:00:00Z","len":5123,"sha256":"9f2c..."}
//! <body bytes>
//! ```
//!
//! Writes go to a unique temporary file in the same directory and are renamed
//! into place, so a concurrent reader sees either no entry or a whole one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{CacheEntry, CacheError, CacheKey, CacheStore, sha256_hex};

/// Directory name used under the system temp dir when no cache dir is configured.
pub const DEFAULT_CACHE_DIR_NAME: &str = ".urlcache";

#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    url: String,
    fetched_at: DateTime<Utc>,
    len: usize,
    sha256: String,
}

/// Filesystem-backed [`CacheStore`].
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under `<system temp dir>/.urlcache`.
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME))
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    #[must_use]
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let hex = key.as_str();
        self.root.join(&hex[..2]).join(hex)
    }
}

fn encode_entry(entry: &CacheEntry) -> Result<Vec<u8>, CacheError> {
    let header = EntryHeader {
        url: entry.url.clone(),
        fetched_at: entry.fetched_at,
        len: entry.body.len(),
        sha256: sha256_hex(&entry.body),
    };
    let mut bytes = serde_json::to_vec(&header)
        .map_err(|e| CacheError::corrupt(entry.key.as_str(), e.to_string()))?;
    bytes.push(b'\n');
    bytes.extend_from_slice(&entry.body);
    Ok(bytes)
}

fn decode_entry(key: &CacheKey, bytes: &[u8]) -> Result<CacheEntry, CacheError> {
    let newline = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| CacheError::corrupt(key.as_str(), "missing header line"))?;
    let header: EntryHeader = serde_json::from_slice(&bytes[..newline])
        .map_err(|e| CacheError::corrupt(key.as_str(), format!("unreadable header: {e}")))?;
    let body = &bytes[newline + 1..];

    if body.len() != header.len {
        return Err(CacheError::corrupt(
            key.as_str(),
            format!("length {} does not match header {}", body.len(), header.len),
        ));
    }
    if sha256_hex(body) != header.sha256 {
        return Err(CacheError::corrupt(key.as_str(), "sha256 mismatch"));
    }
    if CacheKey::for_url(&header.url) != *key {
        return Err(CacheError::corrupt(key.as_str(), "entry belongs to another URL"));
    }

    Ok(CacheEntry {
        key: key.clone(),
        url: header.url,
        body: body.to_vec(),
        fetched_at: header.fetched_at,
    })
}

#[async_trait]
impl CacheStore for FsStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => decode_entry(key, &bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    #[instrument(skip(self, entry), fields(key = %entry.key, bytes = entry.body.len()))]
    async fn save(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(&entry.key);
        let dir = path.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;

        let bytes = encode_entry(entry)?;
        let suffix = rand::thread_rng().gen_range(0..u32::MAX);
        let tmp = dir.join(format!(
            ".{}.{}.{suffix:08x}.tmp",
            entry.key,
            std::process::id()
        ));

        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::io(tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::io(path, e));
        }
        debug!(path = %path.display(), "cache entry written");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let path = self.entry_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(url: &str, body: &[u8]) -> CacheEntry {
        CacheEntry::new(url, body.to_vec())
    }

    #[tokio::test]
    async fn test_save_then_load_returns_same_body() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        let e = entry("http://api.test/works?rows=2&offset=0", b"{\"status\":\"ok\"}");

        store.save(&e).await.unwrap();
        let loaded = store.load(&e.key).await.unwrap().unwrap();

        assert_eq!(loaded.body, e.body);
        assert_eq!(loaded.url, e.url);
    }

    #[tokio::test]
    async fn test_entry_path_is_sharded_by_key_prefix() {
        let store = FsStore::new("/cache");
        let key = CacheKey::for_url("http://api.test/a");
        let path = store.entry_path(&key);
        assert_eq!(
            path,
            PathBuf::from("/cache").join(&key.as_str()[..2]).join(key.as_str())
        );
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        let key = CacheKey::for_url("http://api.test/missing");
        assert!(store.load(&key).await.unwrap().is_none());
        assert!(!store.remove(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_truncated_entry_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        let e = entry("http://api.test/t", b"0123456789");
        store.save(&e).await.unwrap();

        let path = store.entry_path(&e.key);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let result = store.load(&e.key).await;
        assert!(matches!(result, Err(CacheError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_flipped_byte_fails_digest() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        let e = entry("http://api.test/d", b"abcdef");
        store.save(&e).await.unwrap();

        let path = store.entry_path(&e.key);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] = b'X';
        std::fs::write(&path, &bytes).unwrap();

        let result = store.load(&e.key).await;
        assert!(matches!(result, Err(CacheError::Corrupt { reason, .. }) if reason.contains("sha256")));
    }

    #[tokio::test]
    async fn test_remove_deletes_entry() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        let e = entry("http://api.test/r", b"x");
        store.save(&e).await.unwrap();

        assert!(store.remove(&e.key).await.unwrap());
        assert!(store.load(&e.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path());
        let e = entry("http://api.test/tmp", b"body");
        store.save(&e).await.unwrap();

        let shard = store.entry_path(&e.key).parent().unwrap().to_path_buf();
        let names: Vec<_> = std::fs::read_dir(shard)
            .unwrap()
            .map(|d| d.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![e.key.to_string()]);
    }
}
