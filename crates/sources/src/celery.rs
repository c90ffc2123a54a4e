//! Celery (Python) adapter.
//!
//! Celery's Redis transport keeps one list per queue. Each entry is a kombu
//! message whose `body` carries the protocol-2 `[args, kwargs, embed]`
//! triple, usually base64-encoded, and whose `headers` name the task.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, NaiveDateTime, Utc};
use jobshift_core::{AnalysisResult, CanonicalJob, ParseError, ParseResult, QueueAnalysis, SourceKind};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument};

use crate::error::SourceError;
use crate::source::{bounded, Exported, Source, DEFAULT_CALL_TIMEOUT};
use crate::store::KeyValueStore;

/// Queue Celery routes to when none is configured.
pub const DEFAULT_CELERY_QUEUE: &str = "celery";

const BINDING_PREFIX: &str = "_kombu.binding.";

#[derive(Debug, Default, Deserialize)]
struct CeleryHeaders {
    #[serde(default)]
    task: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    eta: Option<String>,
    #[serde(default)]
    retries: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct CeleryMessage {
    #[serde(default)]
    body: JsonValue,
    #[serde(default)]
    headers: CeleryHeaders,
}

/// Parse one kombu message from queue `queue`.
///
/// The task name is kept verbatim as the job type. A body that cannot be
/// decoded yields empty args rather than a failure.
pub fn parse_celery_message(queue: &str, raw: &str) -> ParseResult<CanonicalJob> {
    let message: CeleryMessage = serde_json::from_str(raw)?;
    let headers = message.headers;

    let task = headers.task.trim();
    if task.is_empty() {
        return Err(ParseError::MissingField("headers.task"));
    }

    let (args, kwargs) = match decode_body(&message.body) {
        Some(parts) => split_body(parts),
        None => {
            debug!(task, "celery body could not be decoded; using empty args");
            (JsonValue::Array(Vec::new()), None)
        }
    };

    let mut job = CanonicalJob::new(task, queue, args)
        .with_meta("source", SourceKind::Celery.as_str());

    if !headers.id.is_empty() {
        job = job.with_meta("celery_task_id", headers.id);
    }
    if let Some(kwargs) = kwargs {
        job = job.with_meta("celery_kwargs", kwargs);
    }
    if let Some(retries) = headers.retries {
        job = job.with_meta("celery_retries", retries);
    }
    if let Some(eta) = headers.eta.as_deref().filter(|e| !e.is_empty()) {
        job = job.with_scheduled_at(parse_eta(eta)?);
    }

    Ok(job)
}

/// Body text is base64 of JSON, or JSON directly; an inline JSON value is
/// accepted as-is.
fn decode_body(body: &JsonValue) -> Option<JsonValue> {
    match body {
        JsonValue::String(text) => {
            let decoded = general_purpose::STANDARD
                .decode(text.trim())
                .ok()
                .and_then(|bytes| serde_json::from_slice(&bytes).ok());
            decoded.or_else(|| serde_json::from_str(text).ok())
        }
        JsonValue::Null => None,
        other => Some(other.clone()),
    }
}

/// `[args, kwargs, embed]` → (args, non-empty kwargs).
fn split_body(parts: JsonValue) -> (JsonValue, Option<JsonValue>) {
    match parts {
        JsonValue::Array(mut items) if !items.is_empty() => {
            let kwargs = (items.len() > 1)
                .then(|| items.swap_remove(1))
                .filter(|k| matches!(k, JsonValue::Object(m) if !m.is_empty()));
            (items.swap_remove(0), kwargs)
        }
        JsonValue::Array(_) => (JsonValue::Array(Vec::new()), None),
        other => (other, None),
    }
}

fn parse_eta(eta: &str) -> ParseResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(eta) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(eta, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| ParseError::invalid("headers.eta", e.to_string()))
}

/// Celery store reader.
pub struct CelerySource<S> {
    store: S,
    connection: String,
    timeout: Duration,
}

impl<S: KeyValueStore> CelerySource<S> {
    pub fn new(store: S, connection: impl Into<String>) -> Self {
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

    /// `celery` plus every queue kombu has a binding for.
    async fn queue_names(&self) -> Result<BTreeSet<String>, SourceError> {
        let mut names = BTreeSet::from([DEFAULT_CELERY_QUEUE.to_string()]);
        let pattern = format!("{BINDING_PREFIX}*");
        for key in bounded(self.timeout, "SCAN", self.store.scan_keys(&pattern)).await? {
            if let Some(name) = key.strip_prefix(BINDING_PREFIX).filter(|n| !n.is_empty()) {
                names.insert(name.to_string());
            }
        }
        Ok(names)
    }

    async fn messages(&self, queue: &str) -> Result<Vec<String>, SourceError> {
        bounded(self.timeout, "LRANGE", self.store.list_range(queue, 0, -1)).await
    }
}

#[async_trait]
impl<S: KeyValueStore> Source for CelerySource<S> {
    fn kind(&self) -> SourceKind {
        SourceKind::Celery
    }

    fn connection(&self) -> &str {
        &self.connection
    }

    #[instrument(skip(self), fields(source = "celery"))]
    async fn analyze(&self) -> Result<AnalysisResult, SourceError> {
        let mut queues = Vec::new();
        for name in self.queue_names().await? {
            let pending = bounded(self.timeout, "LLEN", self.store.list_len(&name)).await?;
            let messages = self.messages(&name).await?;
            let mut analysis = QueueAnalysis::new(&name, pending);
            for raw in &messages {
                if let Ok(job) = parse_celery_message(&name, raw) {
                    analysis.record_type(&job.job_type);
                }
            }
            queues.push(analysis);
        }
        Ok(AnalysisResult::from_queues(SourceKind::Celery, &self.connection, queues, 0))
    }

    #[instrument(skip(self), fields(source = "celery"))]
    async fn export(&self) -> Result<Exported, SourceError> {
        let mut out = Exported::default();
        for name in self.queue_names().await? {
            for raw in self.messages(&name).await? {
                out.absorb(SourceKind::Celery, &name, parse_celery_message(&name, &raw));
            }
        }
        Ok(out)
    }
}
