//! Constants for the fetch module (timeouts, pagination).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes; large pages can be slow to render upstream).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default number of items requested per page.
pub const DEFAULT_ROWS: u32 = 1000;

/// Upper bound on items per page accepted by the Crossref API.
pub const MAX_ROWS: u32 = 1000;

/// Base URL of the public Crossref REST API.
pub const DEFAULT_ENDPOINT: &str = "https://api.crossref.org";
