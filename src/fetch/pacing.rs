//! Per-host request spacing.
//!
//! Chunks of one harvest run concurrently but usually talk to a single API
//! host. [`HostPacer`] enforces a minimum delay between two requests to the
//! same host, across all tasks sharing it. Requests to different hosts never
//! wait on each other.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Minimum spacing between requests to the same host.
///
/// Designed to be wrapped in `Arc` and shared by every transport clone.
#[derive(Debug, Default)]
pub struct HostPacer {
    delay: Duration,
    /// `Arc` lets the `DashMap` shard lock drop before awaiting the inner mutex.
    hosts: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl HostPacer {
    /// Creates a pacer with the given minimum spacing.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            hosts: DashMap::new(),
        }
    }

    /// Creates a pacer that never waits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns whether pacing is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.delay.is_zero()
    }

    /// Returns the configured spacing.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Waits until a request to `url`'s host may be sent.
    ///
    /// The first request to a host proceeds immediately.
    #[instrument(skip(self), fields(host))]
    pub async fn acquire(&self, url: &str) {
        if self.is_disabled() {
            return;
        }

        let host = extract_host(url);
        tracing::Span::current().record("host", host.as_str());

        let state = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut last_request = state.lock().await;
        if let Some(previous) = *last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.delay {
                let wait = self.delay.saturating_sub(elapsed);
                debug!(host = %host, wait_ms = wait.as_millis(), "pacing request");
                tokio::time::sleep(wait).await;
            }
        }
        *last_request = Some(Instant::now());
    }
}

/// Extracts the lowercase host from a URL, or `"unknown"` for malformed URLs.
///
/// ```
/// use harvester_core::fetch::extract_host;
///
/// assert_eq!(extract_host("https://API.crossref.org/works?rows=5"), "api.crossref.org");
/// assert_eq!(extract_host("not a url"), "unknown");
/// ```
#[must_use]
pub fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| "unknown".to_string())
}
