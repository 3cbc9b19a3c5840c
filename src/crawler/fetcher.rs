//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests of the harvester, including:
//! - Building one HTTP client with the shared header set
//! - GET requests for channel pages and reference pages
//! - The fixed politeness delay after every request
//! - Error classification (HTTP status vs. network failure)

use crate::config::{ChannelConfig, CrawlerConfig, HttpConfig};
use crate::links::page_url;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("Invalid page URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl FetchError {
    /// The URL the failed request was sent to
    pub fn url(&self) -> &str {
        match self {
            Self::Http { url, .. } | Self::Network { url, .. } | Self::InvalidUrl { url, .. } => url,
        }
    }
}

/// Source of raw page markup
///
/// The orchestrator and the resolver only see this trait, so tests can
/// drive them with canned pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches one page of a channel's message list
    ///
    /// Without a cursor the newest page is fetched; with one, the page of
    /// messages strictly older than it.
    async fn fetch_channel_page(
        &self,
        channel: &ChannelConfig,
        before: Option<i64>,
    ) -> Result<String, FetchError>;

    /// Fetches a deferred-mode reference page
    async fn fetch_reference_page(&self, url: &str) -> Result<String, FetchError>;
}

/// Builds an HTTP client with the configured header set
///
/// # Arguments
///
/// * `http` - Header configuration shared by every request
/// * `timeout` - Transport-level timeout of a single request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(http: &HttpConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&http.accept) {
        headers.insert(ACCEPT, value);
    }
    if let Ok(value) = HeaderValue::from_str(&http.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, value);
    }

    Client::builder()
        .user_agent(http.user_agent.clone())
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Paced HTTP page source
///
/// Every request, successful or not, is followed by the configured delay
/// before control returns to the caller.
#[derive(Debug, Clone)]
pub struct ChannelFetcher {
    client: Client,
    request_delay: Duration,
}

impl ChannelFetcher {
    pub fn new(http: &HttpConfig, crawler: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(http, crawler.request_timeout())?,
            request_delay: crawler.request_delay(),
        })
    }

    /// Sends one GET request and returns the body of a 2xx response
    pub async fn get(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!("GET {}", url);
        let result = self.send(url).await;

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        result
    }

    async fn send(&self, url: &str) -> Result<String, FetchError> {
        let network = |e: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            message: classify(&e),
        };

        let response = self.client.get(url).send().await.map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.text().await.map_err(network)
    }
}

#[async_trait]
impl PageSource for ChannelFetcher {
    async fn fetch_channel_page(
        &self,
        channel: &ChannelConfig,
        before: Option<i64>,
    ) -> Result<String, FetchError> {
        let url = page_url(&channel.url, before).map_err(|e| FetchError::InvalidUrl {
            url: channel.url.clone(),
            message: e.to_string(),
        })?;
        self.get(&url).await
    }

    async fn fetch_reference_page(&self, url: &str) -> Result<String, FetchError> {
        self.get(url).await
    }
}

fn classify(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        "Connection refused".to_string()
    } else {
        e.to_string()
    }
}
