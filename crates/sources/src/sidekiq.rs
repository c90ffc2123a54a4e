//! Sidekiq (Ruby) adapter.
//!
//! Layout read from Redis:
//! - `queues`: set of queue names
//! - `queue:<name>`: list of JSON payloads
//! - `schedule` / `retry`: sorted sets of JSON payloads scored by run time

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobshift_core::{
    canonicalize, AnalysisResult, CanonicalJob, ParseError, ParseResult, QueueAnalysis, SourceKind,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::instrument;

use crate::error::SourceError;
use crate::source::{bounded, Exported, Source, DEFAULT_CALL_TIMEOUT};
use crate::store::KeyValueStore;

pub const QUEUES_KEY: &str = "queues";
pub const SCHEDULE_KEY: &str = "schedule";
pub const RETRY_KEY: &str = "retry";

/// Class Rails uses when a job is enqueued through ActiveJob.
const ACTIVE_JOB_WRAPPER: &str = "ActiveJob::QueueAdapters::SidekiqAdapter::JobWrapper";

pub fn queue_key(queue: &str) -> String {
    format!("queue:{queue}")
}

#[derive(Debug, Deserialize)]
struct SidekiqPayload {
    #[serde(default)]
    class: String,
    #[serde(default)]
    wrapped: Option<String>,
    #[serde(default)]
    args: JsonValue,
    #[serde(default)]
    queue: String,
    #[serde(default)]
    jid: Option<String>,
    #[serde(default)]
    retry: Option<JsonValue>,
    #[serde(default)]
    at: Option<f64>,
}

/// Parse one Sidekiq JSON payload.
///
/// `class` becomes the canonical type (the ActiveJob `wrapped` class wins
/// when present), an epoch `at` becomes `scheduled_at`.
pub fn parse_sidekiq_job(raw: &str) -> ParseResult<CanonicalJob> {
    let payload: SidekiqPayload = serde_json::from_str(raw)?;

    let class = match payload.wrapped.as_deref() {
        Some(wrapped) if payload.class == ACTIVE_JOB_WRAPPER && !wrapped.is_empty() => wrapped,
        _ => payload.class.as_str(),
    };
    let job_type = canonicalize(class);
    if job_type.is_empty() {
        return Err(ParseError::MissingField("class"));
    }

    let mut job = CanonicalJob::new(job_type, payload.queue, payload.args)
        .with_meta("source", SourceKind::Sidekiq.as_str())
        .with_meta("sidekiq_class", class);

    if let Some(jid) = payload.jid.filter(|j| !j.is_empty()) {
        job = job.with_meta("sidekiq_jid", jid);
    }
    if let Some(retry) = payload.retry {
        job = job.with_meta("sidekiq_retry", retry);
    }
    if let Some(at) = payload.at.filter(|at| *at > 0.0) {
        job = job.with_scheduled_at(epoch_to_utc(at)?);
    }

    Ok(job)
}

fn epoch_to_utc(at: f64) -> ParseResult<DateTime<Utc>> {
    let secs = at.trunc() as i64;
    let nanos = (at.fract() * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| ParseError::invalid("at", format!("{at} is out of range")))
}

/// Sidekiq store reader.
pub struct SidekiqSource<S> {
    store: S,
    connection: String,
    timeout: Duration,
}

impl<S: KeyValueStore> SidekiqSource<S> {
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

    async fn queue_names(&self) -> Result<Vec<String>, SourceError> {
        let mut names = bounded(self.timeout, "SMEMBERS", self.store.set_members(QUEUES_KEY)).await?;
        names.sort();
        Ok(names)
    }

    async fn queue_payloads(&self, queue: &str) -> Result<Vec<String>, SourceError> {
        bounded(self.timeout, "LRANGE", self.store.list_range(&queue_key(queue), 0, -1)).await
    }

    async fn sorted_payloads(&self, key: &str) -> Result<Vec<String>, SourceError> {
        bounded(self.timeout, "ZRANGE", self.store.sorted_set_members(key)).await
    }
}

#[async_trait]
impl<S: KeyValueStore> Source for SidekiqSource<S> {
    fn kind(&self) -> SourceKind {
        SourceKind::Sidekiq
    }

    fn connection(&self) -> &str {
        &self.connection
    }

    #[instrument(skip(self), fields(source = "sidekiq"))]
    async fn analyze(&self) -> Result<AnalysisResult, SourceError> {
        let mut queues = Vec::new();
        for name in self.queue_names().await? {
            let pending = bounded(self.timeout, "LLEN", self.store.list_len(&queue_key(&name))).await?;
            let payloads = self.queue_payloads(&name).await?;
            let mut analysis = QueueAnalysis::new(&name, pending);
            for raw in &payloads {
                if let Ok(job) = parse_sidekiq_job(raw) {
                    analysis.record_type(&job.job_type);
                }
            }
            queues.push(analysis);
        }

        let scheduled = bounded(self.timeout, "ZCARD", self.store.sorted_set_len(SCHEDULE_KEY)).await?;
        let retries = bounded(self.timeout, "ZCARD", self.store.sorted_set_len(RETRY_KEY)).await?;

        let report =
            AnalysisResult::from_queues(SourceKind::Sidekiq, &self.connection, queues, scheduled + retries);
        let summary = format!(
            "Found {} queues, {} total jobs ({scheduled} scheduled, {retries} in retry)",
            report.queues.len(),
            report.total_jobs,
        );
        Ok(report.with_summary(summary))
    }

    #[instrument(skip(self), fields(source = "sidekiq"))]
    async fn export(&self) -> Result<Exported, SourceError> {
        let mut out = Exported::default();
        for name in self.queue_names().await? {
            for raw in self.queue_payloads(&name).await? {
                out.absorb(SourceKind::Sidekiq, &name, parse_sidekiq_job(&raw));
            }
        }
        for key in [SCHEDULE_KEY, RETRY_KEY] {
            for raw in self.sorted_payloads(key).await? {
                out.absorb(SourceKind::Sidekiq, key, parse_sidekiq_job(&raw));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::InMemoryKeyValueStore;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn seeded() -> Arc<InMemoryKeyValueStore> {
        let store = Arc::new(InMemoryKeyValueStore::new());
        store.sadd(QUEUES_KEY, "mailers");
        store.sadd(QUEUES_KEY, "default");
        store.rpush(
            &queue_key("mailers"),
            r#"{"class":"Mailers::WelcomeEmail","args":[42],"queue":"mailers","jid":"abc"}"#,
        );
        store.rpush(&queue_key("mailers"), "not json");
        store.rpush(
            &queue_key("default"),
            r#"{"class":"HardWorker","args":["x"],"queue":"default","jid":"j2"}"#,
        );
        store.zadd(
            SCHEDULE_KEY,
            1_700_000_000.0,
            r#"{"class":"ReportJob","args":[],"queue":"default","jid":"j3","at":1700000000.0}"#,
        );
        store.zadd(
            RETRY_KEY,
            1.0,
            r#"{"class":"FlakyJob","args":[1],"queue":"default","jid":"j4","retry":5}"#,
        );
        store
    }

    #[test]
    fn welcome_email_maps_to_canonical_job() {
        let job = parse_sidekiq_job(
            r#"{"class":"Mailers::WelcomeEmail","args":[42],"queue":"mailers","jid":"abc"}"#,
        )
        .unwrap();

        assert_eq!(job.job_type, "mailers.welcome.email");
        assert_eq!(job.queue, "mailers");
        assert_eq!(job.args, json!([42]));
        assert_eq!(job.meta["sidekiq_jid"], json!("abc"));
        assert_eq!(job.meta["sidekiq_class"], json!("Mailers::WelcomeEmail"));
        assert!(job.scheduled_at.is_none());
    }

    #[test]
    fn epoch_at_becomes_rfc3339() {
        let job = parse_sidekiq_job(r#"{"class":"ReportJob","args":[],"at":1700000000.0}"#).unwrap();
        assert_eq!(job.scheduled_at.as_deref(), Some("2023-11-14T22:13:20Z"));
        assert_eq!(job.queue, "default");
    }

    #[test]
    fn active_job_wrapper_uses_wrapped_class() {
        let job = parse_sidekiq_job(
            r#"{"class":"ActiveJob::QueueAdapters::SidekiqAdapter::JobWrapper","wrapped":"InvoiceMailer","args":[]}"#,
        )
        .unwrap();
        assert_eq!(job.job_type, "invoice.mailer");
    }

    #[test]
    fn missing_class_is_rejected() {
        assert_eq!(
            parse_sidekiq_job(r#"{"args":[1]}"#).unwrap_err(),
            ParseError::MissingField("class")
        );
        assert!(matches!(parse_sidekiq_job("nope"), Err(ParseError::Malformed(_))));
    }

    #[tokio::test]
    async fn export_reads_queues_and_sorted_sets_and_skips_garbage() {
        let source = SidekiqSource::new(seeded(), "redis://localhost:6379");
        let out = source.export().await.unwrap();

        let types: Vec<&str> = out.jobs.iter().map(|j| j.job_type.as_str()).collect();
        assert_eq!(types, ["hard.worker", "mailers.welcome.email", "report.job", "flaky.job"]);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.jobs[3].meta["sidekiq_retry"], json!(5));
    }

    #[tokio::test]
    async fn analyze_counts_raw_entries_and_histograms_parsed_types() {
        let source = SidekiqSource::new(seeded(), "redis://localhost:6379");
        let report = source.analyze().await.unwrap();

        assert_eq!(report.source, SourceKind::Sidekiq);
        assert_eq!(report.connection, "redis://localhost:6379");
        let mailers = report.queue("mailers").unwrap();
        assert_eq!(mailers.pending_jobs, 2);
        assert_eq!(mailers.job_types["mailers.welcome.email"], 1);
        assert_eq!(report.total_jobs, 5);
        assert_eq!(report.summary, "Found 2 queues, 5 total jobs (1 scheduled, 1 in retry)");
    }

    /// Serves at most one entry per LRANGE so pending counts must come from LLEN.
    struct OnePerRange(Arc<InMemoryKeyValueStore>);

    #[async_trait]
    impl KeyValueStore for OnePerRange {
        async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
            self.0.set_members(key).await
        }

        async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
            let mut items = self.0.list_range(key, start, stop).await?;
            items.truncate(1);
            Ok(items)
        }

        async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
            self.0.list_len(key).await
        }

        async fn sorted_set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
            self.0.sorted_set_members(key).await
        }

        async fn sorted_set_len(&self, key: &str) -> Result<u64, StoreError> {
            self.0.sorted_set_len(key).await
        }

        async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
            self.0.scan_keys(pattern).await
        }

        async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
            self.0.hash_get_all(key).await
        }
    }

    #[tokio::test]
    async fn pending_counts_use_list_length() {
        let source = SidekiqSource::new(OnePerRange(seeded()), "redis://localhost:6379");
        let report = source.analyze().await.unwrap();

        let mailers = report.queue("mailers").unwrap();
        assert_eq!(mailers.pending_jobs, 2);
        assert_eq!(mailers.job_types.values().sum::<u64>(), 1);
        assert_eq!(report.total_jobs, 5);
    }

    #[tokio::test]
    async fn unreachable_store_is_a_connection_failure() {
        let store = seeded();
        store.set_unavailable(Some("connection refused"));
        let source = SidekiqSource::new(store, "redis://localhost:6379");

        assert!(matches!(source.analyze().await, Err(SourceError::Connection(_))));
        assert!(matches!(source.export().await, Err(SourceError::Connection(_))));
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store = Arc::new(InMemoryKeyValueStore::new().with_latency(Duration::from_millis(200)));
        let source = SidekiqSource::new(store, "redis://slow").with_timeout(Duration::from_millis(10));
        assert!(matches!(source.export().await, Err(SourceError::Timeout { .. })));
    }
}
