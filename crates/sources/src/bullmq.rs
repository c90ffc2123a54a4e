//! BullMQ (Node.js) adapter.
//!
//! Queues are discovered from `bull:<queue>:id` / `bull:<queue>:wait` keys.
//! Pending job ids live in the `wait` list and the `prioritized` / `delayed`
//! sorted sets; each job is a hash at `bull:<queue>:<id>` whose `data` and
//! `opts` fields hold JSON text.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use jobshift_core::{
    canonicalize, AnalysisResult, CanonicalJob, ParseError, ParseResult, QueueAnalysis, SourceKind,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::instrument;

use crate::error::SourceError;
use crate::source::{bounded, Exported, Source, DEFAULT_CALL_TIMEOUT};
use crate::store::KeyValueStore;

pub const KEY_PREFIX: &str = "bull";

pub fn wait_key(queue: &str) -> String {
    format!("{KEY_PREFIX}:{queue}:wait")
}

pub fn delayed_key(queue: &str) -> String {
    format!("{KEY_PREFIX}:{queue}:delayed")
}

pub fn prioritized_key(queue: &str) -> String {
    format!("{KEY_PREFIX}:{queue}:prioritized")
}

pub fn job_key(queue: &str, id: &str) -> String {
    format!("{KEY_PREFIX}:{queue}:{id}")
}

#[derive(Debug, Default, Deserialize)]
struct BullOpts {
    #[serde(default)]
    delay: Option<i64>,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    attempts: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BullJob {
    #[serde(default)]
    id: Option<JsonValue>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    data: JsonValue,
    #[serde(default)]
    opts: Option<BullOpts>,
}

/// Parse a BullMQ job given as one JSON document
/// (`{"name": .., "data": .., "opts": {..}}`), as the live router receives it.
///
/// `now` anchors `opts.delay` (milliseconds).
pub fn parse_bullmq_job(queue: &str, raw: &str, now: DateTime<Utc>) -> ParseResult<CanonicalJob> {
    let job: BullJob = serde_json::from_str(raw)?;
    let id = job.id.map(|id| match id {
        JsonValue::String(s) => s,
        other => other.to_string(),
    });
    build(queue, id.as_deref(), job.name, job.data, job.opts.unwrap_or_default(), now)
}

/// Parse a BullMQ job hash as stored in Redis.
pub fn parse_bullmq_fields(
    queue: &str,
    id: &str,
    fields: &HashMap<String, String>,
    now: DateTime<Utc>,
) -> ParseResult<CanonicalJob> {
    let name = fields.get("name").cloned().unwrap_or_default();
    let data = match fields.get("data").map(String::as_str) {
        None | Some("") => JsonValue::Null,
        Some(text) => serde_json::from_str(text)
            .map_err(|e| ParseError::invalid("data", e.to_string()))?,
    };
    let opts = match fields.get("opts").map(String::as_str) {
        None | Some("") => BullOpts::default(),
        Some(text) => serde_json::from_str(text)
            .map_err(|e| ParseError::invalid("opts", e.to_string()))?,
    };
    build(queue, Some(id), name, data, opts, now)
}

fn build(
    queue: &str,
    id: Option<&str>,
    name: String,
    data: JsonValue,
    opts: BullOpts,
    now: DateTime<Utc>,
) -> ParseResult<CanonicalJob> {
    let job_type = canonicalize(&name);
    if job_type.is_empty() {
        return Err(ParseError::MissingField("name"));
    }

    let mut job = CanonicalJob::new(job_type, queue, data)
        .with_meta("source", SourceKind::BullMq.as_str())
        .with_meta("bullmq_name", name);

    if let Some(id) = id.filter(|id| !id.is_empty()) {
        job = job.with_meta("bullmq_job_id", id);
    }
    if let Some(priority) = opts.priority.filter(|p| *p > 0) {
        job = job.with_priority(priority);
    }
    if let Some(delay) = opts.delay.filter(|d| *d > 0) {
        let at = now
            .checked_add_signed(TimeDelta::milliseconds(delay))
            .ok_or_else(|| ParseError::invalid("opts.delay", format!("{delay}ms overflows")))?;
        job = job.with_scheduled_at(at);
    }
    if let Some(attempts) = opts.attempts {
        job = job.with_meta("bullmq_attempts", attempts);
    }

    Ok(job)
}

/// BullMQ store reader.
pub struct BullMqSource<S> {
    store: S,
    connection: String,
    timeout: Duration,
}

impl<S: KeyValueStore> BullMqSource<S> {
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

    async fn discover_queues(&self) -> Result<BTreeSet<String>, SourceError> {
        let mut queues = BTreeSet::new();
        for pattern in ["bull:*:id", "bull:*:wait"] {
            for key in bounded(self.timeout, "SCAN", self.store.scan_keys(pattern)).await? {
                if let Some(name) = queue_from_key(&key) {
                    queues.insert(name.to_string());
                }
            }
        }
        Ok(queues)
    }

    /// Pending ids: waiting first, then prioritized, then delayed.
    async fn pending_ids(&self, queue: &str) -> Result<Vec<String>, SourceError> {
        let mut ids = bounded(self.timeout, "LRANGE", self.store.list_range(&wait_key(queue), 0, -1)).await?;
        ids.extend(bounded(self.timeout, "ZRANGE", self.store.sorted_set_members(&prioritized_key(queue))).await?);
        ids.extend(bounded(self.timeout, "ZRANGE", self.store.sorted_set_members(&delayed_key(queue))).await?);
        Ok(ids)
    }

    async fn load(&self, queue: &str, id: &str, now: DateTime<Utc>) -> Result<ParseResult<CanonicalJob>, SourceError> {
        let fields = bounded(self.timeout, "HGETALL", self.store.hash_get_all(&job_key(queue, id))).await?;
        if fields.is_empty() {
            return Ok(Err(ParseError::malformed(format!("job hash {id} is missing"))));
        }
        Ok(parse_bullmq_fields(queue, id, &fields, now))
    }
}

/// `bull:<queue>:<suffix>` → `<queue>`; queue names may themselves contain `:`.
fn queue_from_key(key: &str) -> Option<&str> {
    let rest = key.strip_prefix("bull:")?;
    let (queue, _) = rest.rsplit_once(':')?;
    (!queue.is_empty()).then_some(queue)
}

#[async_trait]
impl<S: KeyValueStore> Source for BullMqSource<S> {
    fn kind(&self) -> SourceKind {
        SourceKind::BullMq
    }

    fn connection(&self) -> &str {
        &self.connection
    }

    #[instrument(skip(self), fields(source = "bullmq"))]
    async fn analyze(&self) -> Result<AnalysisResult, SourceError> {
        let now = Utc::now();
        let mut queues = Vec::new();
        for name in self.discover_queues().await? {
            let ids = self.pending_ids(&name).await?;
            let mut analysis = QueueAnalysis::new(&name, ids.len() as u64);
            for id in &ids {
                if let Ok(job) = self.load(&name, id, now).await? {
                    analysis.record_type(&job.job_type);
                }
            }
            queues.push(analysis);
        }
        Ok(AnalysisResult::from_queues(SourceKind::BullMq, &self.connection, queues, 0))
    }

    #[instrument(skip(self), fields(source = "bullmq"))]
    async fn export(&self) -> Result<Exported, SourceError> {
        let now = Utc::now();
        let mut out = Exported::default();
        for name in self.discover_queues().await? {
            for id in self.pending_ids(&name).await? {
                let parsed = self.load(&name, &id, now).await?;
                out.absorb(SourceKind::BullMq, &name, parsed);
            }
        }
        Ok(out)
    }
}
