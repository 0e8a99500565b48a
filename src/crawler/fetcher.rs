//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building the HTTP client with timeouts, compression and fixed headers
//! - A `Transport` seam so the retry loop can run against scripted responses
//! - Retry logic for transient failures
//! - Building the remote endpoint URLs

use crate::config::{FetchConfig, RemoteConfig};
use crate::model::ContentId;
use crate::HarvestError;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// A transport-level failure: nothing readable came back
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// A single GET that either yields a body or fails at the transport level
///
/// Any HTTP status with a readable body counts as a success here.
pub trait Transport {
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `remote` - Remote service settings (user agent, referer)
/// * `fetch` - Timeout settings
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    remote: &RemoteConfig,
    fetch: &FetchConfig,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    if let Some(referer) = &remote.referer {
        match HeaderValue::from_str(referer) {
            Ok(value) => {
                headers.insert(REFERER, value);
            }
            Err(_) => tracing::warn!("Ignoring referer '{}': not a valid header value", referer),
        }
    }

    Client::builder()
        .user_agent(remote.user_agent.as_str())
        .default_headers(headers)
        .timeout(Duration::from_secs(fetch.timeout_secs))
        .connect_timeout(Duration::from_secs(fetch.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Production transport backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
        let request = self.client.get(url);
        async move {
            let response = request
                .send()
                .await
                .map_err(|e| TransportError(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                tracing::debug!("Upstream answered {} ({})", status, response.url());
            }
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError(e.to_string()))?;
            Ok(body.to_vec())
        }
    }
}

/// How many times a logical request is attempted and how long to wait between tries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub relax: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            relax: Duration::from_millis(config.relax_duration_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Performs logical requests over a transport with the retry policy applied
pub struct Fetcher<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetches a URL, retrying transport failures
    ///
    /// # Request Flow
    ///
    /// 1. Send the GET through the transport
    ///    - Readable body → return it
    /// 2. On failure, if attempts remain, sleep the relax duration and retry
    /// 3. After the last failed attempt → `TransientNetwork`
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - The response body
    /// * `Err(HarvestError::TransientNetwork)` - Every attempt failed
    pub async fn fetch(&self, url: &str) -> crate::Result<Vec<u8>> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.transport.get(url).await {
                Ok(body) => {
                    if attempt > 1 {
                        tracing::info!("Fetched {} on attempt {}", url, attempt);
                    }
                    return Ok(body);
                }
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        "Request to {} failed (attempt {}/{}): {}, retrying in {:?}",
                        url,
                        attempt,
                        max_attempts,
                        e,
                        self.policy.relax
                    );
                    tokio::time::sleep(self.policy.relax).await;
                }
                Err(e) => {
                    return Err(HarvestError::TransientNetwork {
                        url: url.to_string(),
                        attempts: attempt,
                        cause: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Remote endpoint URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    comment_base: String,
    rolldate_base: String,
}

impl Endpoints {
    pub fn new(comment_base: &str, rolldate_base: &str) -> Self {
        Self {
            comment_base: comment_base.trim_end_matches('/').to_string(),
            rolldate_base: rolldate_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(&config.comment_base_url, &config.rolldate_base_url)
    }

    /// Live comment document
    pub fn live_url(&self, id: ContentId) -> String {
        format!("{}/{}.xml", self.comment_base, id)
    }

    /// Historical segment ending at a day boundary
    pub fn segment_url(&self, timestamp: i64, id: ContentId) -> String {
        format!("{}/dmroll,{},{}", self.comment_base, timestamp, id)
    }

    /// Roll-date index
    pub fn rolldate_url(&self, id: ContentId) -> String {
        format!("{}/rolldate,{}", self.rolldate_base, id)
    }
}
