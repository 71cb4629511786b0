//! HTTP fetch adapter.
//!
//! [`Fetcher`] is the only way the rest of the crate touches the network.
//! It performs a single GET and reports the status without judging it;
//! callers decide which statuses are failures for their hop. No retries
//! happen here.

use crate::error::{Result, ShimError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("hls-shim/", env!("CARGO_PKG_VERSION"));

/// `url` without its query string or fragment, for logs and error messages.
///
/// Source playlists commonly carry origin credentials in the query.
pub fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    }
}

/// A completed HTTP exchange
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Issues one GET per call
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`. Any received status is `Ok`; only transport failures
    /// are `Err` ([`ShimError::Transport`]).
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// `User-Agent` header value
    pub user_agent: String,
    /// Optional per-request timeout.
    ///
    /// When `None`, the client's own timeout applies.
    pub timeout: Option<Duration>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: None,
        }
    }
}

/// [`Fetcher`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Build a fetcher with its own connection pool.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ShimError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let mut request = self.client.get(url);
        if let Some(timeout) = self.config.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            let e = e.without_url();
            warn!("HTTP fetch failed for {}: {}", redact_url(url), e);
            ShimError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(|e| {
            let e = e.without_url();
            warn!("Reading body of {} failed: {}", redact_url(url), e);
            ShimError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        debug!("GET {} -> {} ({} bytes)", redact_url(url), status, body.len());

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}
