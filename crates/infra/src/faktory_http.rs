//! Faktory web API client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use jobshift_sources::{FaktoryApi, StoreError};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::instrument;

use crate::error::ConnectError;

#[derive(Debug, Deserialize)]
struct InfoResponse {
    faktory: FaktoryState,
}

#[derive(Debug, Deserialize)]
struct FaktoryState {
    #[serde(default)]
    queues: BTreeMap<String, u64>,
}

/// Reads queue sizes and pending jobs over Faktory's HTTP API.
#[derive(Debug, Clone)]
pub struct FaktoryHttpApi {
    client: reqwest::Client,
    base_url: reqwest::Url,
    password: Option<String>,
}

impl FaktoryHttpApi {
    pub fn new(
        base_url: &str,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ConnectError> {
        let parsed = reqwest::Url::parse(base_url).map_err(|e| ConnectError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ConnectError::InvalidUrl {
                url: base_url.to_string(),
                reason: "not an http base url".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: parsed,
            password,
        })
    }

    /// Base URL with `segments` appended, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::new(format!("{} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, segments: &[&str]) -> Result<reqwest::Response, StoreError> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        let mut request = self.client.get(url);
        if let Some(password) = &self.password {
            request = request.basic_auth("", Some(password));
        }
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::new(format!("GET {path}: {e}")))?;
        if !response.status().is_success() {
            return Err(StoreError::new(format!(
                "GET {path} returned status {}",
                response.status().as_u16()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl FaktoryApi for FaktoryHttpApi {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn queue_sizes(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        let info: InfoResponse = self
            .get(&["api", "info"])
            .await?
            .json()
            .await
            .map_err(|e| StoreError::new(format!("decode /api/info: {e}")))?;
        Ok(info.faktory.queues)
    }

    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn queue_jobs(&self, queue: &str) -> Result<Vec<String>, StoreError> {
        let jobs: Vec<JsonValue> = self
            .get(&["api", "queues", queue])
            .await?
            .json()
            .await
            .map_err(|e| StoreError::new(format!("decode queue {queue}: {e}")))?;
        Ok(jobs.iter().map(JsonValue::to_string).collect())
    }
}
