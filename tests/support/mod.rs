//! Shared fixtures for integration tests: counting mock responders and
//! fetchers wired to a mock server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use harvester_core::fetch::RetryPolicy;
use harvester_core::{Cache, CacheStore, Fetcher, FsStore, HttpTransport, TransportSettings};
use serde_json::{Value, json};
use wiremock::{Request, Respond, ResponseTemplate};

/// Request counter shared between a responder and the test body.
#[derive(Debug, Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Query parameters of a mock request.
pub fn query(request: &Request) -> HashMap<String, String> {
    request.url.query_pairs().into_owned().collect()
}

/// `{"status":"ok","message":{"items":[...]}}`
pub fn ok_envelope(items: &[Value]) -> Value {
    json!({
        "status": "ok",
        "message-type": "work-list",
        "message": { "items": items, "total-results": items.len() }
    })
}

/// Serves a fixed item list honouring `rows` and `offset`.
pub struct PagedItems {
    items: Vec<Value>,
    hits: Hits,
}

impl PagedItems {
    pub fn new(items: Vec<Value>, hits: Hits) -> Self {
        Self { items, hits }
    }
}

impl Respond for PagedItems {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.hits.record();
        let params = query(request);
        let rows: usize = params.get("rows").and_then(|v| v.parse().ok()).unwrap_or(20);
        let offset: usize = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
        let page: Vec<Value> = self.items.iter().skip(offset).take(rows).cloned().collect();
        ResponseTemplate::new(200).set_body_json(ok_envelope(&page))
    }
}

/// Serves works per date filter: each `from-<kind>-date:<begin>` window
/// yields `per_chunk` items keyed by the begin date. Windows whose begin
/// date is in `failing` answer 500.
pub struct WorksByWindow {
    per_chunk: usize,
    failing: Vec<String>,
    hits: Hits,
}

impl WorksByWindow {
    pub fn new(per_chunk: usize, hits: Hits) -> Self {
        Self {
            per_chunk,
            failing: Vec::new(),
            hits,
        }
    }

    pub fn failing_on(mut self, begin: &str) -> Self {
        self.failing.push(begin.to_string());
        self
    }
}

/// Begin date of a `from-<kind>-date:<begin>,until-...` filter.
pub fn window_begin(filter: &str) -> Option<&str> {
    let first = filter.split(',').next()?;
    first.rsplit(':').next()
}

impl Respond for WorksByWindow {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.hits.record();
        let params = query(request);
        let Some(begin) = params.get("filter").and_then(|f| window_begin(f)) else {
            return ResponseTemplate::new(400);
        };
        if self.failing.iter().any(|f| f == begin) {
            return ResponseTemplate::new(500).set_body_string("internal error");
        }
        let rows: usize = params.get("rows").and_then(|v| v.parse().ok()).unwrap_or(20);
        let offset: usize = params.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
        let items: Vec<Value> = (0..self.per_chunk)
            .map(|n| json!({ "URL": format!("http://dx.doi.org/10.1/{begin}.{n}"), "n": n }))
            .skip(offset)
            .take(rows)
            .collect();
        ResponseTemplate::new(200).set_body_json(ok_envelope(&items))
    }
}

/// Counts requests and answers every one with the same status and body.
pub struct FixedResponse {
    status: u16,
    body: Vec<u8>,
    hits: Hits,
}

impl FixedResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>, hits: Hits) -> Self {
        Self {
            status,
            body: body.into(),
            hits,
        }
    }
}

impl Respond for FixedResponse {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.hits.record();
        ResponseTemplate::new(self.status).set_body_bytes(self.body.clone())
    }
}

/// HTTP transport without connection retries, so request counts are exact.
pub fn transport() -> HttpTransport {
    HttpTransport::with_settings(TransportSettings {
        retry_policy: RetryPolicy::no_retry(),
        ..TransportSettings::default()
    })
    .expect("failed to build transport")
}

/// Fetcher backed by `store` and a real HTTP transport.
pub fn fetcher_with_store(store: Arc<dyn CacheStore>) -> Fetcher {
    Fetcher::new(Cache::new(store, Arc::new(transport())))
}

/// Fetcher with an on-disk cache under `cache_dir`.
pub fn fetcher(cache_dir: &Path) -> Fetcher {
    fetcher_with_store(Arc::new(FsStore::new(cache_dir)))
}
