//! Paginated request templates.

use url::Url;

use super::FetchError;
use super::constants::DEFAULT_ROWS;

/// A paginated GET resource: endpoint, page size, optional date filter and
/// fixed query parameters.
///
/// Page URLs are rendered with a fixed parameter order
/// (`rows`, `offset`, `filter`, then fixed parameters in insertion order),
/// so the same logical page always produces the same URL and therefore the
/// same cache key.
///
/// ```
/// use harvester_core::fetch::RequestTemplate;
///
/// let template = RequestTemplate::new("https://api.crossref.org/works", 100)?
///     .with_filter("from-deposit-date:2015-01-01,until-deposit-date:2015-02-01");
/// assert_eq!(
///     template.page_url(200),
///     "https://api.crossref.org/works?rows=100&offset=200&filter=from-deposit-date%3A2015-01-01%2Cuntil-deposit-date%3A2015-02-01"
/// );
/// # Ok::<(), harvester_core::fetch::FetchError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    endpoint: Url,
    rows: u32,
    filter: Option<String>,
    params: Vec<(String, String)>,
}

impl RequestTemplate {
    /// Creates a template for `endpoint` with `rows` items per page (at least 1).
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if `endpoint` is not an absolute URL.
    pub fn new(endpoint: &str, rows: u32) -> Result<Self, FetchError> {
        let endpoint = Url::parse(endpoint).map_err(|_| FetchError::invalid_url(endpoint))?;
        Ok(Self {
            endpoint,
            rows: rows.max(1),
            filter: None,
            params: Vec::new(),
        })
    }

    /// Creates a template with the default page size.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`] if `endpoint` is not an absolute URL.
    pub fn with_default_rows(endpoint: &str) -> Result<Self, FetchError> {
        Self::new(endpoint, DEFAULT_ROWS)
    }

    /// Sets the upstream `filter` expression.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Appends a fixed query parameter sent with every page.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Items per page; also the offset increment.
    #[must_use]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// The filter expression, if any.
    #[must_use]
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// The endpoint URL without pagination parameters.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Renders the URL of the page starting at `offset`.
    #[must_use]
    pub fn page_url(&self, offset: u64) -> String {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("rows", &self.rows.to_string());
            query.append_pair("offset", &offset.to_string());
            if let Some(filter) = &self.filter {
                query.append_pair("filter", filter);
            }
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
        }
        url.to_string()
    }
}
