//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - The [`FetchClient`] seam used by the orchestrator and the download coordinator
//! - Building the reqwest client with browser-like default headers
//! - Retry with exponential backoff for transient failures
//! - Error classification into [`TransportError`]

use crate::config::Config;
use crate::TransportError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE};
use reqwest::Client;
use std::fmt;
use std::time::Duration;

/// Streamed response body
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// A response whose status has already been accepted by the client
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Final URL after redirects
    pub url: String,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl FetchResponse {
    /// Builds a response around an in-memory body
    pub fn from_bytes(
        status: u16,
        url: impl Into<String>,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            url: url.into(),
            headers,
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }

    /// Raw `Content-Type` header value, if present and readable
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Collects the body and decodes it as UTF-8 (lossy)
    pub async fn text(mut self) -> Result<String, TransportError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// HTTP GET with a retry policy on transient failures
///
/// Implementations return `Err(TransportError::Status)` for responses with a
/// status of 400 or above, after exhausting their own retries.
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        timeout: Option<Duration>,
    ) -> Result<FetchResponse, TransportError>;
}

/// Builds an HTTP client with the configured user agent and default headers
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::UserAgentConfig;
/// use sumi_harvest::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &crate::config::UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.value.clone())
        .default_headers(default_headers())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Browser-like headers sent with every request
fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers
}

/// Headers sent with document downloads
pub fn document_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/pdf,text/html,application/msword,*/*"),
    );
    headers
}

/// reqwest-backed [`FetchClient`]
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | Timeout | Retry with backoff |
/// | Connection failure | Retry with backoff |
/// | HTTP 429, HTTP 5xx | Retry with backoff |
/// | Other HTTP 4xx | Immediate error |
/// | 2xx, 3xx | Returned to the caller |
///
/// The delay before retry `n` (0-based) is `base_delay * 2^n`.
#[derive(Debug, Clone)]
pub struct HttpFetchClient {
    client: Client,
    retries: u32,
    base_delay: Duration,
}

impl HttpFetchClient {
    /// Creates a client from the harvester configuration
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent, config.crawler.request_timeout())?;
        Ok(Self::with_client(client, config.crawler.retries))
    }

    pub fn with_client(client: Client, retries: u32) -> Self {
        Self {
            client,
            retries,
            base_delay: Duration::from_millis(100),
        }
    }

    /// Overrides the base backoff delay
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    async fn send_once(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        timeout: Option<Duration>,
    ) -> Result<FetchResponse, TransportError> {
        let mut request = self.client.get(url);
        if let Some(headers) = headers {
            request = request.headers(headers.clone());
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| classify_error(url, &e))?;
        let status = response.status().as_u16();

        if status >= 400 {
            return Err(TransportError::Status {
                url: url.to_string(),
                status,
            });
        }

        let final_url = response.url().to_string();
        let headers = response.headers().clone();
        let body_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| classify_error(&body_url, &e)))
            .boxed();

        Ok(FetchResponse {
            status,
            url: final_url,
            headers,
            body,
        })
    }
}

#[async_trait]
impl FetchClient for HttpFetchClient {
    async fn get(
        &self,
        url: &str,
        headers: Option<&HeaderMap>,
        timeout: Option<Duration>,
    ) -> Result<FetchResponse, TransportError> {
        let mut attempt = 0;

        loop {
            match self.send_once(url, headers, timeout).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    tracing::debug!(
                        "Retrying {} after {:?} (attempt {} of {}): {}",
                        url,
                        delay,
                        attempt + 1,
                        self.retries,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Maps a reqwest error onto the transport taxonomy
fn classify_error(url: &str, e: &reqwest::Error) -> TransportError {
    let url = url.to_string();

    if e.is_timeout() {
        TransportError::Timeout { url }
    } else if e.is_connect() {
        TransportError::Connect {
            url,
            message: e.to_string(),
        }
    } else if e.is_body() || e.is_decode() {
        TransportError::Body {
            url,
            message: e.to_string(),
        }
    } else if let Some(status) = e.status() {
        TransportError::Status {
            url,
            status: status.as_u16(),
        }
    } else {
        TransportError::Request {
            url,
            message: e.to_string(),
        }
    }
}
