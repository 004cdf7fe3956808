//! HTTP client for the pharmacy REST API.
//!
//! This module provides the `ApiClient` struct, the `Backend` implementation
//! that talks to the API wrapping the legacy desktop database.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::backend::{Aggregate, Backend};
use super::types::{Envelope, SearchQuery};
use super::ApiError;
use crate::store::Category;

// ============================================================================
// Constants
// ============================================================================

/// Default API location when nothing is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001/api";

/// Default HTTP request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
/// The backend holds a single connection to the database file and answers
/// 429 while it is busy.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the pharmacy backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the default local API
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_API_BASE_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request, retrying with exponential backoff while rate limited.
    /// `build` is called once per attempt since a RequestBuilder is consumed by send.
    async fn send<T, F>(&self, label: &str, build: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build().send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", label, e)));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(request = label, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    fn search_params(query: &SearchQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("search", query.term.clone()),
            ("page", query.page.to_string()),
            ("limit", query.page_size.to_string()),
        ];
        if let Some(ref filter) = query.filter {
            params.push(("famille", filter.clone()));
        }
        params
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn search(&self, category: Category, query: &SearchQuery) -> Result<Envelope, ApiError> {
        let url = self.url(category.as_str());
        let params = Self::search_params(query);
        debug!(%category, term = %query.term, page = query.page, "GET search");
        self.send("search", || self.client.get(&url).query(&params)).await
    }

    async fn create(&self, category: Category, data: Value) -> Result<Envelope, ApiError> {
        let url = self.url(category.as_str());
        debug!(%category, "POST create");
        self.send("create", || self.client.post(&url).json(&data)).await
    }

    async fn update(&self, category: Category, id: i64, data: Value) -> Result<Envelope, ApiError> {
        let url = self.url(&format!("{}/{}", category.as_str(), id));
        debug!(%category, id, "PUT update");
        self.send("update", || self.client.put(&url).json(&data)).await
    }

    async fn delete(&self, category: Category, id: i64) -> Result<Envelope, ApiError> {
        let url = self.url(&format!("{}/{}", category.as_str(), id));
        debug!(%category, id, "DELETE");
        self.send("delete", || self.client.delete(&url)).await
    }

    async fn fetch_aggregate(&self, aggregate: Aggregate) -> Result<Value, ApiError> {
        let url = self.url(&format!("stats/{}", aggregate.as_str()));
        let value: Value = self.send("aggregate", || self.client.get(&url)).await?;

        // Aggregates come either bare or wrapped in an envelope
        if value.get("success").is_some() {
            let envelope: Envelope = serde_json::from_value(value)
                .map_err(|e| ApiError::InvalidResponse(format!("aggregate {}: {}", aggregate, e)))?;
            Ok(envelope.ensure_success()?.data.unwrap_or(Value::Null))
        } else {
            Ok(value)
        }
    }

    async fn select_folder(&self, path: &str) -> Result<Envelope, ApiError> {
        let url = self.url("folder");
        let body = serde_json::json!({ "path": path });
        self.send("select_folder", || self.client.post(&url).json(&body)).await
    }
}
