use crate::http::build_client;
use crate::returns::model::Return;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReturnsError {
    #[error("no return matches the confirmation code")]
    NotFound,
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
}

/// Source of return aggregates. Abstracted so the composer can be exercised
/// without the live return-management service.
#[async_trait]
pub trait ReturnSource: Send + Sync {
    async fn fetch_by_confirmation(
        &self,
        confirmation_code: &str,
        paths: &[&str],
    ) -> Result<Return, ReturnsError>;
}

/// Client for the return-management service. One lookup per composition; the
/// request carries the expansion paths so the service only populates what the
/// caller asked for. Connection-level timeouts come from the shared client
/// builder and are not configurable per call.
#[derive(Debug, Clone)]
pub struct ReturnsClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ReturnEnvelope {
    #[serde(rename = "return")]
    retrn: Option<Return>,
}

impl ReturnsClient {
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("RETURNS_API_BASE_URL").ok()?;
        let api_key = std::env::var("RETURNS_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty());
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http: build_client(),
        })
    }
}

#[async_trait]
impl ReturnSource for ReturnsClient {
    async fn fetch_by_confirmation(
        &self,
        confirmation_code: &str,
        paths: &[&str],
    ) -> Result<Return, ReturnsError> {
        let url = format!("{}/v1/returns/{}", self.base_url, confirmation_code);
        debug!(
            target = "retrace.returns",
            paths = paths.len(),
            "fetching return aggregate"
        );
        let mut request = self.http.get(url).query(&[("fields", paths.join(","))]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        // A single aggregation read is not retried; a failed call surfaces
        // as-is rather than being replayed against a stateful backend.
        let response = request
            .send()
            .await
            .map_err(|err| ReturnsError::Request(err.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ReturnsError::NotFound);
        }
        if !response.status().is_success() {
            return Err(ReturnsError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let envelope: ReturnEnvelope = response
            .json()
            .await
            .map_err(|err| ReturnsError::Deserialize(err.to_string()))?;
        envelope.retrn.ok_or(ReturnsError::NotFound)
    }
}
