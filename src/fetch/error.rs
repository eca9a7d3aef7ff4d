//! Error types for the fetch module.
//!
//! [`FetchError`] covers a single network request issued by a
//! [`Transport`](super::Transport). [`HarvestError`] covers one page of a
//! paginated harvest, including the content-validity failures that the
//! [`Fetcher`](super::Fetcher) is responsible for.

use thiserror::Error;

use crate::cache::CacheError;

/// Maximum number of body bytes carried in diagnostic excerpts.
pub const EXCERPT_LIMIT: usize = 256;

/// Errors that can occur while fetching one URL over the network.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-2xx HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the URL the error refers to, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Network { url, .. }
            | Self::Timeout { url }
            | Self::HttpStatus { url, .. }
            | Self::InvalidUrl { url } => Some(url),
            Self::ClientBuild { .. } => None,
        }
    }
}

/// Errors that abort a paginated harvest.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The cache or the network underneath it failed. Surfaced unchanged.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The page body could not be parsed even after evicting and refetching it.
    #[error("unparseable response from {url} after {attempts} attempts ({reason}); body starts with: {excerpt}")]
    Corrupt {
        /// The page URL.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Parser diagnostic for the last attempt.
        reason: String,
        /// Bounded excerpt of the last body seen.
        excerpt: String,
    },

    /// The envelope parsed but reported a status other than `ok`.
    #[error("upstream reported status {status:?} for {url}")]
    Protocol {
        /// The page URL.
        url: String,
        /// The status value the upstream returned.
        status: String,
    },
}

impl HarvestError {
    /// Creates a corruption error, truncating the body to [`EXCERPT_LIMIT`] bytes.
    pub fn corrupt(
        url: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
        body: &[u8],
    ) -> Self {
        Self::Corrupt {
            url: url.into(),
            attempts,
            reason: reason.into(),
            excerpt: excerpt(body),
        }
    }

    /// Creates a protocol violation error.
    pub fn protocol(url: impl Into<String>, status: impl Into<String>) -> Self {
        Self::Protocol {
            url: url.into(),
            status: status.into(),
        }
    }
}

/// Renders at most [`EXCERPT_LIMIT`] bytes of `body` as text.
#[must_use]
pub fn excerpt(body: &[u8]) -> String {
    let mut cut = body.len().min(EXCERPT_LIMIT);
    // Back off UTF-8 continuation bytes so a character is never split.
    while cut > 0 && cut < body.len() && body[cut] & 0xC0 == 0x80 {
        cut -= 1;
    }
    let mut text = String::from_utf8_lossy(&body[..cut]).into_owned();
    if body.len() > EXCERPT_LIMIT {
        text.push_str("...");
    }
    text
}
