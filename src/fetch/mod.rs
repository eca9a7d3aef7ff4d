//! Network transport and paginated harvesting.
//!
//! Two layers live here:
//!
//! - [`Transport`] / [`HttpTransport`]: one GET request, with connection
//!   retries and per-host pacing. Non-2xx statuses are surfaced, never retried.
//! - [`Fetcher`] / [`PageCursor`]: one logical paginated resource read
//!   through the [`Cache`](crate::cache::Cache), validating every page and
//!   recovering from corrupt cached bodies.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use harvester_core::cache::{Cache, FsStore};
//! use harvester_core::fetch::{Fetcher, HttpTransport, RequestTemplate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::new()?);
//! let cache = Cache::new(Arc::new(FsStore::default_location()), transport);
//! let fetcher = Fetcher::new(cache);
//!
//! let template = RequestTemplate::new("https://api.crossref.org/members", 1000)?;
//! let mut pages = fetcher.pages(template);
//! while let Some(page) = pages.next_page().await? {
//!     println!("offset {}: {} items", page.offset, page.items().len());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod harvest;
pub mod pacing;
mod request;
mod retry;

use async_trait::async_trait;

pub use client::{HttpTransport, TransportSettings};
pub use constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_ENDPOINT, DEFAULT_ROWS, MAX_ROWS, READ_TIMEOUT_SECS,
};
pub use error::{EXCERPT_LIMIT, FetchError, HarvestError, excerpt};
pub use harvest::{Fetcher, MAX_PAGE_ATTEMPTS, Page, PageCursor};
pub use pacing::{HostPacer, extract_host};
pub use request::RequestTemplate;
pub use retry::{DEFAULT_CONNECT_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error};

/// Performs a single GET request and returns the response body.
///
/// Implementations surface connection failures and non-2xx statuses as
/// [`FetchError`]. Any connection-level retrying happens inside the
/// implementation; callers never retry.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Fetches `url` and returns the full body.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
