//! HTTP client registering identities with SortingHat.

use crate::config::SortingHatConfig;
use async_trait::async_trait;
use pipeline_core::{Error, Identity, IdentityRegistry, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Body of `POST {url}/identities`.
#[derive(Debug, Serialize)]
pub struct AddIdentitiesRequest<'a> {
    pub connector: &'a str,
    pub identities: &'a [Identity],
}

/// Reply of `POST {url}/identities`.
#[derive(Debug, Default, Deserialize)]
pub struct AddIdentitiesResponse {
    /// Identities newly registered; known ones are not counted
    #[serde(default)]
    pub added: Option<usize>,
}

/// SortingHat registry reached over HTTP.
#[derive(Clone)]
pub struct SortingHatClient {
    config: SortingHatConfig,
    http_client: reqwest::Client,
}

impl SortingHatClient {
    pub fn new(config: SortingHatConfig) -> Result<Self> {
        Url::parse(&config.url)
            .map_err(|e| Error::config(format!("invalid SortingHat url {}: {}", config.url, e)))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::registry(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &SortingHatConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Checks that the registry answers.
    pub async fn health_check(&self) -> bool {
        let request = self.authorized(self.http_client.get(self.endpoint("health")));
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!("SortingHat healthy");
                true
            }
            Ok(response) => {
                warn!(status = %response.status(), "SortingHat health check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "SortingHat unreachable");
                false
            }
        }
    }
}

#[async_trait]
impl IdentityRegistry for SortingHatClient {
    async fn add_identities(&self, batch: &[Identity], connector_name: &str) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let url = self.endpoint("identities");
        let request = AddIdentitiesRequest {
            connector: connector_name,
            identities: batch,
        };

        debug!(url = %url, count = batch.len(), connector = %connector_name, "Registering identities");

        let response = self
            .authorized(self.http_client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "SortingHat request failed");
                Error::registry(format!("SortingHat unavailable: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "SortingHat returned error");
            return Err(Error::registry(format!(
                "SortingHat returned {}: {}",
                status, body
            )));
        }

        let body = response.text().await.map_err(|e| {
            Error::registry(format!("Invalid SortingHat response: {}", e))
        })?;
        Ok(added_count(&body, batch.len()))
    }
}

/// Reads `added` from a reply body, falling back to the batch size.
fn added_count(body: &str, submitted: usize) -> usize {
    serde_json::from_str::<AddIdentitiesResponse>(body)
        .ok()
        .and_then(|r| r.added)
        .unwrap_or(submitted)
}
