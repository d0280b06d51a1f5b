//! JSON-over-HTTP inventory provider
//!
//! Talks to an inventory gateway that fronts the cloud provider's APIs:
//!
//! - `GET {endpoint}/v1/accounts/{account}/regions` returns `{"regions": [...]}`
//! - `GET {endpoint}/v1/accounts/{account}/regions/{region}/resources/{kind}`
//!   returns `{"resources": [...]}`
//!
//! Each call is a single attempt; retry and per-attempt timeouts are applied
//! by [`super::RemoteFetcher`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::ResourceProvider;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::models::{ResourceKind, ResourceRecord};

#[derive(Debug, Deserialize)]
struct ResourcesResponse {
    #[serde(default)]
    resources: Vec<ResourceRecord>,
}

#[derive(Debug, Deserialize)]
struct RegionsResponse {
    #[serde(default)]
    regions: Vec<String>,
}

/// Provider backed by an HTTP inventory gateway
#[derive(Debug, Clone)]
pub struct HttpInventoryProvider {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpInventoryProvider {
    /// Create a provider from configuration
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ProviderError::InvalidData(format!("Invalid API token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, &config.endpoint, timeout))
    }

    /// Create a provider with a custom reqwest Client
    ///
    /// `timeout` should match the client's own timeout; it is only used to
    /// report timed-out calls.
    pub fn with_client(client: Client, endpoint: &str, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Endpoint URL with `segments` appended, each percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            ProviderError::InvalidData(format!("Invalid endpoint {}: {}", self.endpoint, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ProviderError::InvalidData(format!("Endpoint cannot take a path: {}", self.endpoint))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn resources_url(
        &self,
        kind: ResourceKind,
        account_id: &str,
        region: &str,
    ) -> Result<Url, ProviderError> {
        self.url(&[
            "v1",
            "accounts",
            account_id,
            "regions",
            region,
            "resources",
            kind.as_str(),
        ])
    }

    fn regions_url(&self, account_id: &str) -> Result<Url, ProviderError> {
        self.url(&["v1", "accounts", account_id, "regions"])
    }

    async fn get(&self, url: &Url) -> Result<Response, ProviderError> {
        debug!(url = %url, "Sending HTTP GET request");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.timeout.as_millis() as u64)
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = if body.is_empty() {
            status.to_string()
        } else {
            body
        };

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(url = %url, "Throttled by inventory gateway");
                Err(ProviderError::Throttled(detail))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(url = %url, status = status.as_u16(), "Access denied");
                Err(ProviderError::AccessDenied(detail))
            }
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(ProviderError::InvalidScope(detail))
            }
            status => {
                warn!(url = %url, status = status.as_u16(), "Gateway error");
                Err(ProviderError::ServerError(status.as_u16()))
            }
        }
    }
}

#[async_trait]
impl ResourceProvider for HttpInventoryProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        let url = self.resources_url(kind, account_id, region)?;
        let response = self.get(&url).await?;

        let body: ResourcesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidData(e.to_string()))?;

        debug!(url = %url, records = body.resources.len(), "Received resources");
        Ok(body.resources)
    }

    async fn list_regions(&self, account_id: &str) -> Result<Vec<String>, ProviderError> {
        let url = self.regions_url(account_id)?;
        let response = self.get(&url).await?;

        let body: RegionsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidData(e.to_string()))?;

        Ok(body.regions)
    }
}
