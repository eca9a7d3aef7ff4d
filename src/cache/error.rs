//! Error types for the response cache.

use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::FetchError;

/// Errors from reading, writing or filling the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem error on a cache entry.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// Path of the entry or directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A stored entry failed its integrity check.
    #[error("corrupt cache entry {key}: {reason}")]
    Corrupt {
        /// Hex key of the entry.
        key: String,
        /// What failed to validate.
        reason: String,
    },

    /// The network fetch behind a cache miss failed. Surfaced unchanged.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl CacheError {
    /// Creates an I/O error with the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an integrity error.
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
