//! HTTP client for the target job system.
//!
//! One client serves both the batch importer ([`JobSubmitter`]) and the live
//! router ([`Forwarder`]).

use std::time::Duration;

use async_trait::async_trait;
use jobshift_core::target::{BATCH_PATH, HEALTH_PATH, JOBS_PATH};
use jobshift_core::{CanonicalJob, TargetBatchRequest, TargetJobRequest};
use jobshift_live::{ForwardError, ForwardResponse, Forwarder};
use jobshift_transfer::{JobSubmitter, SubmitError};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};

use crate::error::ConnectError;

/// Upper bound on the body kept from a rejected submission.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpTargetClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpTargetClient {
    /// `base_url` is the target's root, e.g. `http://localhost:8080`; every
    /// request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConnectError> {
        let parsed = reqwest::Url::parse(base_url).map_err(|e| ConnectError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            token: None,
            timeout,
        })
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn forward_error(&self, err: reqwest::Error) -> ForwardError {
        if err.is_timeout() {
            ForwardError::Timeout(self.timeout)
        } else {
            ForwardError::Failed(err.to_string())
        }
    }

    async fn post_json<B: serde::Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), SubmitError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .map_err(|e| SubmitError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
            body.truncate(cut);
        }
        Err(SubmitError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl JobSubmitter for HttpTargetClient {
    async fn submit(&self, job: &CanonicalJob) -> Result<(), SubmitError> {
        self.post_json(JOBS_PATH, &TargetJobRequest::from(job)).await
    }

    async fn submit_batch(&self, jobs: &[CanonicalJob]) -> Result<(), SubmitError> {
        let batch: TargetBatchRequest = jobs.iter().collect();
        self.post_json(BATCH_PATH, &batch).await
    }
}

#[async_trait]
impl Forwarder for HttpTargetClient {
    #[instrument(skip_all, fields(job_type = %request.job_type))]
    async fn forward(&self, request: &TargetJobRequest) -> Result<ForwardResponse, ForwardError> {
        let response = self
            .request(reqwest::Method::POST, JOBS_PATH)
            .json(request)
            .send()
            .await
            .map_err(|e| self.forward_error(e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| self.forward_error(e))?;
        debug!(status, "target answered");

        Ok(ForwardResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }

    async fn probe(&self) -> Result<(), ForwardError> {
        let response = self
            .request(reqwest::Method::GET, HEALTH_PATH)
            .send()
            .await
            .map_err(|e| self.forward_error(e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ForwardError::Rejected {
                status: response.status().as_u16(),
            })
        }
    }
}
