//! HTTP client for the ENCV admin API.
//!
//! Wraps `reqwest` with the `x-api-key` header, bounded retry, and typed
//! errors. An `{"error": "..."}` body is surfaced as [`VendorError::Api`]
//! whatever the HTTP status.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde_json::Value;

use crate::error::VendorError;
use crate::retry::RetryPolicy;
use crate::types::RealmStatsResponse;

const DEFAULT_BASE_URL: &str = "https://adminapi.encv.org";
const REALM_STATS_PATH: &str = "api/stats/realm.json";
const API_KEY_HEADER: &str = "x-api-key";

/// Client for the ENCV admin API.
///
/// Use [`EncvClient::new`] for production or [`EncvClient::with_base_url`]
/// to point at a mock server in tests.
pub struct EncvClient {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl EncvClient {
    /// Creates a new client pointed at the production admin API.
    ///
    /// # Errors
    ///
    /// Returns [`VendorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`VendorError::Api`] if the key is not a
    /// valid header value.
    pub fn new(api_key: &str, timeout_secs: u64) -> Result<Self, VendorError> {
        Self::with_base_url(api_key, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`VendorError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`VendorError::Api`] if `base_url` is not a
    /// valid URL or the key is not a valid header value.
    pub fn with_base_url(
        api_key: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, VendorError> {
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| VendorError::Api("API key is not a valid header value".to_owned()))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("encv-metrics/0.1")
            .default_headers(headers)
            .build()?;

        // Exactly one trailing slash so `join` appends instead of replacing
        // the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| VendorError::Api(format!("invalid base URL '{base_url}': {e}")))?;

        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry budget for transient failures.
    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.retry = RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(backoff_base_ms),
        };
        self
    }

    /// Fetch the realm statistics, returning the raw `statistics` entries.
    ///
    /// # Errors
    ///
    /// - [`VendorError::Api`] if the body carries an `error` message.
    /// - [`VendorError::Http`] or [`VendorError::Status`] on network failure
    ///   or a non-2xx status, after retries.
    /// - [`VendorError::Deserialize`] if the body is not the expected JSON.
    /// - [`VendorError::MissingStatistics`] if there is no `statistics` array.
    pub async fn fetch_statistics(&self) -> Result<Vec<Value>, VendorError> {
        let url = self.realm_stats_url()?;
        let response = self.retry.run(|| self.request_stats(&url)).await?;

        let statistics = response.statistics.ok_or(VendorError::MissingStatistics)?;
        tracing::info!(entries = statistics.len(), "fetched realm statistics");
        Ok(statistics)
    }

    fn realm_stats_url(&self) -> Result<Url, VendorError> {
        self.base_url
            .join(REALM_STATS_PATH)
            .map_err(|e| VendorError::Api(format!("invalid stats URL: {e}")))
    }

    async fn request_stats(&self, url: &Url) -> Result<RealmStatsResponse, VendorError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let parsed: Result<RealmStatsResponse, _> = serde_json::from_str(&body);
        if let Ok(RealmStatsResponse {
            error: Some(message),
            ..
        }) = &parsed
        {
            return Err(VendorError::Api(message.clone()));
        }
        if !status.is_success() {
            return Err(VendorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parsed.map_err(|e| VendorError::Deserialize {
            context: url.to_string(),
            source: e,
        })
    }
}
