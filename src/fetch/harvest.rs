//! Paginated harvesting through the cache.
//!
//! A [`Fetcher`] walks one [`RequestTemplate`] page by page, offset 0 first,
//! stepping by the page size, until a page with no items is returned. Every
//! page body must parse as an [`Envelope`].
//!
//! A body that does not parse is treated as a possibly corrupt cached entry:
//! the entry is invalidated and the page fetched once more. A second failure
//! is fatal. An envelope that parses but reports a status other than `ok` is
//! a protocol violation and fatal immediately.

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{HarvestError, RequestTemplate};
use crate::cache::Cache;
use crate::envelope::{Envelope, EnvelopeError, parse_envelope};

/// Attempts per page, counting the first.
pub const MAX_PAGE_ATTEMPTS: u32 = 2;

/// One validated page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// URL the page was requested with.
    pub url: String,
    /// Offset of the first item.
    pub offset: u64,
    pub envelope: Envelope,
}

impl Page {
    /// The page's items.
    #[must_use]
    pub fn items(&self) -> &[Value] {
        self.envelope.items()
    }

    /// Returns true if this page signals the end of the resource.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

/// Per-page retry states.
enum PageAttempt {
    Fetching { attempt: u32 },
    Validating { attempt: u32, body: Vec<u8> },
    Invalidating { attempt: u32, reason: String },
    Succeeded(Envelope),
    Failed(HarvestError),
}

/// Harvests paginated resources through a [`Cache`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    cache: Cache,
}

impl Fetcher {
    /// Creates a fetcher reading through `cache`.
    #[must_use]
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// The cache this fetcher reads through.
    #[must_use]
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Starts a cursor over the pages of `template`.
    #[must_use]
    pub fn pages(&self, template: RequestTemplate) -> PageCursor {
        PageCursor {
            fetcher: self.clone(),
            template,
            offset: 0,
            exhausted: false,
            pages: 0,
        }
    }

    /// Fetches every non-empty page of `template`, in offset order.
    ///
    /// # Errors
    ///
    /// The first [`HarvestError`] encountered; no partial result is returned.
    pub async fn fetch_all(&self, template: RequestTemplate) -> Result<Vec<Page>, HarvestError> {
        let mut cursor = self.pages(template);
        let mut pages = Vec::new();
        while let Some(page) = cursor.next_page().await? {
            pages.push(page);
        }
        Ok(pages)
    }

    /// Fetches and validates one page URL.
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch_page(&self, url: &str) -> Result<Envelope, HarvestError> {
        let mut state = PageAttempt::Fetching { attempt: 1 };

        loop {
            state = match state {
                PageAttempt::Fetching { attempt } => {
                    let body = self.cache.get(url).await?;
                    PageAttempt::Validating { attempt, body }
                }
                PageAttempt::Validating { attempt, body } => match parse_envelope(&body) {
                    Ok(envelope) => PageAttempt::Succeeded(envelope),
                    Err(EnvelopeError::Status { status }) => {
                        PageAttempt::Failed(HarvestError::protocol(url, status))
                    }
                    Err(EnvelopeError::Malformed { reason }) => {
                        if attempt < MAX_PAGE_ATTEMPTS {
                            PageAttempt::Invalidating { attempt, reason }
                        } else {
                            PageAttempt::Failed(HarvestError::corrupt(url, attempt, reason, &body))
                        }
                    }
                },
                PageAttempt::Invalidating { attempt, reason } => {
                    warn!(attempt, %reason, "unparseable page, invalidating cache entry");
                    self.cache.invalidate(url).await?;
                    PageAttempt::Fetching {
                        attempt: attempt + 1,
                    }
                }
                PageAttempt::Succeeded(envelope) => return Ok(envelope),
                PageAttempt::Failed(error) => return Err(error),
            };
        }
    }
}

/// Sequential cursor over the pages of one resource.
///
/// Pages come back in strictly increasing offset order with no gaps. The
/// cursor ends (`None`) after the first empty page; that page is not yielded.
#[derive(Debug)]
pub struct PageCursor {
    fetcher: Fetcher,
    template: RequestTemplate,
    offset: u64,
    exhausted: bool,
    pages: u64,
}

impl PageCursor {
    /// Fetches the next page, or `None` once the resource is exhausted.
    ///
    /// # Errors
    ///
    /// A [`HarvestError`] ends the harvest; further calls keep returning
    /// `None` only after a clean end, so callers should stop on error.
    pub async fn next_page(&mut self) -> Result<Option<Page>, HarvestError> {
        if self.exhausted {
            return Ok(None);
        }

        let url = self.template.page_url(self.offset);
        let envelope = self.fetcher.fetch_page(&url).await?;

        if envelope.items().is_empty() {
            self.exhausted = true;
            info!(url = %url, pages = self.pages, "resource exhausted");
            return Ok(None);
        }

        let page = Page {
            url,
            offset: self.offset,
            envelope,
        };
        debug!(offset = page.offset, items = page.items().len(), "page fetched");
        self.offset += u64::from(self.template.rows());
        self.pages += 1;
        Ok(Some(page))
    }

    /// Non-empty pages yielded so far.
    #[must_use]
    pub fn pages_fetched(&self) -> u64 {
        self.pages
    }

    /// Offset of the next page to request.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns true once an empty page has been seen.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
