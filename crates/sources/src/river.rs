//! River (Go, Postgres) adapter.
//!
//! River keeps every job as a row of `river_job`. Only rows in a pending
//! state are exported.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use jobshift_core::{
    canonicalize, AnalysisResult, CanonicalJob, ParseError, ParseResult, QueueAnalysis, SourceKind,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::instrument;

use crate::error::{SourceError, StoreError};
use crate::source::{bounded, Exported, Source, DEFAULT_CALL_TIMEOUT};

/// States of work that has not run to completion yet.
pub const PENDING_STATES: [&str; 4] = ["available", "scheduled", "retryable", "pending"];

/// One `river_job` row, as read from the table or posted to the live router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiverJobRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub args: JsonValue,
    #[serde(default)]
    pub queue: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    /// RFC3339; set only when the job is deferred.
    #[serde(default)]
    pub scheduled_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

/// Read access to River's job table.
#[async_trait]
pub trait RiverStore: Send + Sync {
    /// Pending-row count per queue.
    async fn queue_counts(&self) -> Result<BTreeMap<String, u64>, StoreError>;

    /// Pending rows of one queue, oldest id first.
    async fn pending_jobs(&self, queue: &str) -> Result<Vec<RiverJobRecord>, StoreError>;
}

#[async_trait]
impl<T> RiverStore for Arc<T>
where
    T: RiverStore + ?Sized,
{
    async fn queue_counts(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        (**self).queue_counts().await
    }

    async fn pending_jobs(&self, queue: &str) -> Result<Vec<RiverJobRecord>, StoreError> {
        (**self).pending_jobs(queue).await
    }
}

/// Map a River row to a canonical job. The object `args` is wrapped.
pub fn parse_river_record(record: RiverJobRecord) -> ParseResult<CanonicalJob> {
    let job_type = canonicalize(&record.kind);
    if job_type.is_empty() {
        return Err(ParseError::MissingField("kind"));
    }

    let mut job = CanonicalJob::new(job_type, record.queue, record.args)
        .with_meta("source", SourceKind::River.as_str())
        .with_meta("river_kind", record.kind);

    if let Some(id) = record.id {
        job = job.with_meta("river_id", id);
    }
    if let Some(state) = record.state.filter(|s| !s.is_empty()) {
        job = job.with_meta("river_state", state);
    }
    if let Some(priority) = record.priority {
        if priority < 0 {
            return Err(ParseError::invalid("priority", format!("{priority} is negative")));
        }
        job = job.with_priority(priority);
    }
    if let Some(at) = record.scheduled_at.filter(|at| !at.is_empty()) {
        job = job.with_scheduled_at_raw(at);
    }
    if let Some(metadata) = record.metadata.filter(|m| matches!(m, JsonValue::Object(o) if !o.is_empty())) {
        job = job.with_meta("river_metadata", metadata);
    }

    Ok(job)
}

/// Parse a River job posted as JSON; `queue` applies when the body has none.
pub fn parse_river_job(queue: &str, raw: &str) -> ParseResult<CanonicalJob> {
    let mut record: RiverJobRecord = serde_json::from_str(raw)?;
    if record.queue.is_empty() {
        record.queue = queue.to_string();
    }
    parse_river_record(record)
}

/// River reader.
pub struct RiverSource<R> {
    store: R,
    connection: String,
    timeout: Duration,
}

impl<R: RiverStore> RiverSource<R> {
    pub fn new(store: R, connection: impl Into<String>) -> Self {
        Self {
            store,
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
impl<R: RiverStore> Source for RiverSource<R> {
    fn kind(&self) -> SourceKind {
        SourceKind::River
    }

    fn connection(&self) -> &str {
        &self.connection
    }

    #[instrument(skip(self), fields(source = "river"))]
    async fn analyze(&self) -> Result<AnalysisResult, SourceError> {
        let counts = bounded(self.timeout, "SELECT queue counts", self.store.queue_counts()).await?;
        let mut queues = Vec::with_capacity(counts.len());
        for (name, count) in counts {
            let mut analysis = QueueAnalysis::new(&name, count);
            for record in bounded(self.timeout, "SELECT river_job", self.store.pending_jobs(&name)).await? {
                if let Ok(job) = parse_river_record(record) {
                    analysis.record_type(&job.job_type);
                }
            }
            queues.push(analysis);
        }
        Ok(AnalysisResult::from_queues(SourceKind::River, &self.connection, queues, 0))
    }

    #[instrument(skip(self), fields(source = "river"))]
    async fn export(&self) -> Result<Exported, SourceError> {
        let counts = bounded(self.timeout, "SELECT queue counts", self.store.queue_counts()).await?;
        let mut out = Exported::default();
        for name in counts.keys() {
            for record in bounded(self.timeout, "SELECT river_job", self.store.pending_jobs(name)).await? {
                out.absorb(SourceKind::River, name, parse_river_record(record));
            }
        }
        Ok(out)
    }
}

/// In-memory `river_job` table.
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRiverStore {
    rows: RwLock<Vec<RiverJobRecord>>,
}

impl InMemoryRiverStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: RiverJobRecord) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    fn is_pending(record: &RiverJobRecord) -> bool {
        record
            .state
            .as_deref()
            .is_none_or(|s| PENDING_STATES.contains(&s))
    }
}

#[async_trait]
impl RiverStore for InMemoryRiverStore {
    async fn queue_counts(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let mut counts = BTreeMap::new();
        for row in rows.iter().filter(|r| Self::is_pending(r)) {
            *counts.entry(row.queue.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn pending_jobs(&self, queue: &str) -> Result<Vec<RiverJobRecord>, StoreError> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<RiverJobRecord> = rows
            .iter()
            .filter(|r| r.queue == queue && Self::is_pending(r))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.id);
        Ok(out)
    }
}
