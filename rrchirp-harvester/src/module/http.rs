///! Rate limited HTTP client shared by the ZIP API, geocoder and county search

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::rate_limit::RateLimiter;
use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result, Stage};

#[derive(Clone)]
pub struct UpstreamHttp {
    client: Client,
    limiter: Arc<RateLimiter>,
}

impl UpstreamHttp {
    pub fn new(config: &HarvestConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HarvestError::network("(client setup)", e))?;
        Ok(Self { client, limiter })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// GET `url` with query parameters and return the body as text
    pub async fn get_text(&self, url: &str, query: &[(&str, &str)], stage: Stage) -> Result<String> {
        self.limiter.acquire(url).await;
        tracing::debug!("GET {} {:?}", url, query);

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| HarvestError::network(url, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HarvestError::NotFound {
                query: url.to_string(),
                stage,
                detail: "HTTP 404".to_string(),
            });
        }
        if !status.is_success() {
            return Err(HarvestError::network(url, format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| HarvestError::network(url, e))
    }

    /// GET `url` and deserialize a JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)], stage: Stage) -> Result<T> {
        let body = self.get_text(url, query, stage).await?;
        serde_json::from_str(&body).map_err(|e| HarvestError::UnexpectedPage {
            url: url.to_string(),
            reason: format!("invalid JSON: {}", e),
        })
    }
}
