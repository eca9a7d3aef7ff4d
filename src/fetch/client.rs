//! HTTP transport for upstream API requests.
//!
//! [`HttpTransport`] wraps a reqwest client with the project's timeout,
//! compression and User-Agent policy, a bounded connection-retry loop and
//! optional per-host pacing. It is the production [`Transport`]; tests
//! substitute their own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::pacing::HostPacer;
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::{FetchError, Transport};
use crate::user_agent;

/// Settings for building an [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Overall per-request timeout.
    pub read_timeout: Duration,
    /// Contact address advertised in the User-Agent.
    pub mailto: Option<String>,
    /// Connection retry policy.
    pub retry_policy: RetryPolicy,
    /// Minimum spacing between requests to the same host.
    pub host_spacing: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            mailto: None,
            retry_policy: RetryPolicy::default(),
            host_spacing: Duration::ZERO,
        }
    }
}

/// reqwest-backed [`Transport`].
///
/// Cheap to clone; clones share the connection pool and the host pacer.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    retry_policy: RetryPolicy,
    pacer: Arc<HostPacer>,
}

impl HttpTransport {
    /// Creates a transport with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_settings(TransportSettings::default())
    }

    /// Creates a transport from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the HTTP client cannot be built.
    #[instrument(level = "debug", skip_all, fields(attempts = settings.retry_policy.max_attempts()))]
    pub fn with_settings(settings: TransportSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.read_timeout)
            .gzip(true)
            .user_agent(user_agent::default_harvest_user_agent(
                settings.mailto.as_deref(),
            ))
            .build()
            .map_err(|source| FetchError::ClientBuild { source })?;

        Ok(Self {
            client,
            retry_policy: settings.retry_policy,
            pacer: Arc::new(HostPacer::new(settings.host_spacing)),
        })
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    async fn send_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        let mut attempt = 1;
        loop {
            self.pacer.acquire(url).await;

            let error = match self.send_once(url).await {
                Ok(body) => {
                    debug!(bytes = body.len(), attempt, "request complete");
                    return Ok(body);
                }
                Err(error) => error,
            };

            match self.retry_policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(
                        error = %error,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(error = %error, %reason, "not retrying");
                    return Err(error);
                }
            }
        }
    }
}
