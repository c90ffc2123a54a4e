//! Faktory adapter.
//!
//! Faktory is read through its HTTP API: `/api/info` for per-queue sizes and
//! `/api/queues/<name>` for the pending jobs of one queue.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use jobshift_core::{
    canonicalize, AnalysisResult, CanonicalJob, ParseError, ParseResult, QueueAnalysis, SourceKind,
};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tracing::instrument;

use crate::error::{SourceError, StoreError};
use crate::source::{bounded, Exported, Source, DEFAULT_CALL_TIMEOUT};

/// Read access to a Faktory server.
#[async_trait]
pub trait FaktoryApi: Send + Sync {
    /// Queue name → pending job count.
    async fn queue_sizes(&self) -> Result<BTreeMap<String, u64>, StoreError>;

    /// Pending jobs of one queue, one JSON document per job.
    async fn queue_jobs(&self, queue: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<T> FaktoryApi for Arc<T>
where
    T: FaktoryApi + ?Sized,
{
    async fn queue_sizes(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        (**self).queue_sizes().await
    }

    async fn queue_jobs(&self, queue: &str) -> Result<Vec<String>, StoreError> {
        (**self).queue_jobs(queue).await
    }
}

#[derive(Debug, Deserialize)]
struct FaktoryJob {
    #[serde(default)]
    jid: String,
    #[serde(default)]
    jobtype: String,
    #[serde(default)]
    args: JsonValue,
    #[serde(default)]
    queue: String,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    at: Option<String>,
    #[serde(default)]
    retry: Option<i64>,
    #[serde(default)]
    custom: Option<Map<String, JsonValue>>,
}

/// Parse one Faktory job document.
pub fn parse_faktory_job(raw: &str) -> ParseResult<CanonicalJob> {
    let payload: FaktoryJob = serde_json::from_str(raw)?;

    let job_type = canonicalize(&payload.jobtype);
    if job_type.is_empty() {
        return Err(ParseError::MissingField("jobtype"));
    }

    let mut job = CanonicalJob::new(job_type, payload.queue, payload.args)
        .with_meta("source", SourceKind::Faktory.as_str())
        .with_meta("faktory_jobtype", payload.jobtype);

    if !payload.jid.is_empty() {
        job = job.with_meta("faktory_jid", payload.jid);
    }
    if let Some(priority) = payload.priority {
        if priority < 0 {
            return Err(ParseError::invalid("priority", format!("{priority} is negative")));
        }
        job = job.with_priority(priority);
    }
    if let Some(at) = payload.at.filter(|at| !at.is_empty()) {
        job = job.with_scheduled_at_raw(at);
    }
    if let Some(retry) = payload.retry {
        job = job.with_meta("faktory_retry", retry);
    }
    if let Some(custom) = payload.custom.filter(|c| !c.is_empty()) {
        job = job.with_meta("faktory_custom", custom);
    }

    Ok(job)
}

/// Faktory reader.
pub struct FaktorySource<A> {
    api: A,
    connection: String,
    timeout: Duration,
}

impl<A: FaktoryApi> FaktorySource<A> {
    pub fn new(api: A, connection: impl Into<String>) -> Self {
        Self {
            api,
            connection: connection.into(),
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<A: FaktoryApi> Source for FaktorySource<A> {
    fn kind(&self) -> SourceKind {
        SourceKind::Faktory
    }

    fn connection(&self) -> &str {
        &self.connection
    }

    #[instrument(skip(self), fields(source = "faktory"))]
    async fn analyze(&self) -> Result<AnalysisResult, SourceError> {
        let sizes = bounded(self.timeout, "GET /api/info", self.api.queue_sizes()).await?;
        let mut queues = Vec::with_capacity(sizes.len());
        for (name, size) in sizes {
            let mut analysis = QueueAnalysis::new(&name, size);
            for raw in bounded(self.timeout, "GET /api/queues", self.api.queue_jobs(&name)).await? {
                if let Ok(job) = parse_faktory_job(&raw) {
                    analysis.record_type(&job.job_type);
                }
            }
            queues.push(analysis);
        }
        Ok(AnalysisResult::from_queues(SourceKind::Faktory, &self.connection, queues, 0))
    }

    #[instrument(skip(self), fields(source = "faktory"))]
    async fn export(&self) -> Result<Exported, SourceError> {
        let sizes = bounded(self.timeout, "GET /api/info", self.api.queue_sizes()).await?;
        let mut out = Exported::default();
        for name in sizes.keys() {
            for raw in bounded(self.timeout, "GET /api/queues", self.api.queue_jobs(name)).await? {
                out.absorb(SourceKind::Faktory, name, parse_faktory_job(&raw));
            }
        }
        Ok(out)
    }
}

/// In-memory Faktory API.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryFaktoryApi {
    queues: RwLock<BTreeMap<String, Vec<String>>>,
}

impl InMemoryFaktoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, queue: &str, job: &str) {
        self.queues
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(queue.to_string())
            .or_default()
            .push(job.to_string());
    }
}

#[async_trait]
impl FaktoryApi for InMemoryFaktoryApi {
    async fn queue_sizes(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        Ok(queues
            .iter()
            .map(|(name, jobs)| (name.clone(), jobs.len() as u64))
            .collect())
    }

    async fn queue_jobs(&self, queue: &str) -> Result<Vec<String>, StoreError> {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        Ok(queues.get(queue).cloned().unwrap_or_default())
    }
}
