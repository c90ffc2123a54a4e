//! Legacy request body → canonical job, per framework.

use chrono::Utc;
use jobshift_core::{CanonicalJob, ParseError, ParseResult, SourceKind, DEFAULT_QUEUE};
use jobshift_sources::{
    parse_bullmq_job, parse_celery_message, parse_faktory_job, parse_river_job, parse_sidekiq_job,
    DEFAULT_CELERY_QUEUE,
};
use serde_json::Value as JsonValue;

/// Translates bodies posted to the live router using the field-mapping rule
/// of one legacy framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translator {
    source: SourceKind,
}

impl Translator {
    pub fn new(source: SourceKind) -> Self {
        Self { source }
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn translate(&self, body: &[u8]) -> ParseResult<CanonicalJob> {
        let raw = std::str::from_utf8(body)
            .map_err(|e| ParseError::malformed(format!("body is not UTF-8: {e}")))?;

        match self.source {
            SourceKind::Sidekiq => parse_sidekiq_job(raw),
            SourceKind::BullMq => {
                let queue = queue_hint(raw, &[&["queue"]]);
                parse_bullmq_job(queue.as_deref().unwrap_or(DEFAULT_QUEUE), raw, Utc::now())
            }
            SourceKind::Celery => {
                let queue = queue_hint(
                    raw,
                    &[&["queue"], &["properties", "delivery_info", "routing_key"]],
                );
                parse_celery_message(queue.as_deref().unwrap_or(DEFAULT_CELERY_QUEUE), raw)
            }
            SourceKind::Faktory => parse_faktory_job(raw),
            SourceKind::River => parse_river_job(DEFAULT_QUEUE, raw),
        }
    }
}

/// First non-empty string found at one of `paths`; `None` for non-JSON input
/// (the framework parser reports that).
fn queue_hint(raw: &str, paths: &[&[&str]]) -> Option<String> {
    let doc: JsonValue = serde_json::from_str(raw).ok()?;
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(&doc, |node, key| node.get(key))
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}
