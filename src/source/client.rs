//! Source client for the paginated events API

use super::types::{Page, PageResponse, Seed};
use crate::auth::TokenProvider;
use crate::config::SourceConfig;
use crate::error::Result;
use crate::http::{HttpClient, HttpClientConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Fetches pages of events
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch one page starting from `seed`
    async fn fetch_page(&self, seed: &Seed) -> Result<Page>;
}

/// Client for one endpoint of the events API
///
/// Each call is a single POST; retries are left to the caller.
#[derive(Debug)]
pub struct EventsApiClient {
    http: HttpClient,
    endpoint: String,
    page_limit: u32,
}

impl EventsApiClient {
    /// Create a client for `endpoint` using an already configured HTTP client
    pub fn new(http: HttpClient, endpoint: impl Into<String>, page_limit: u32) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            page_limit,
        }
    }

    /// Build a client from the source configuration
    pub fn from_config(
        config: &SourceConfig,
        endpoint: impl Into<String>,
        token: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let http_config = HttpClientConfig::builder()
            .base_url(config.base_url.clone())
            .timeout(config.timeout())
            .rate_limit(config.rate_limit)
            .build();
        let http = HttpClient::with_auth(http_config, token)?;
        Ok(Self::new(http, endpoint, config.page_limit))
    }

    /// Endpoint path this client queries
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SourceClient for EventsApiClient {
    async fn fetch_page(&self, seed: &Seed) -> Result<Page> {
        let body = seed.request_body(self.page_limit);
        debug!(endpoint = %self.endpoint, seed = %seed, "Fetching page");

        let page: PageResponse = self.http.post_json(&self.endpoint, body).await?;
        let page = Page::from(page);

        debug!(
            endpoint = %self.endpoint,
            events = page.len(),
            has_more = page.has_more,
            "Fetched page"
        );
        Ok(page)
    }
}
