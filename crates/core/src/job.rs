//! The canonical job record exchanged by adapters, the transfer pipeline, and
//! the live router.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::Violation;

/// Queue used when the source record names none.
pub const DEFAULT_QUEUE: &str = "default";

/// A job description in the target system's vocabulary.
///
/// Built once per raw legacy record and never mutated afterwards; the
/// `with_*` builders consume and return a new value.
///
/// Deserialization is lenient on purpose (missing `type`, `queue` or `args`
/// become empty/null) so that files produced elsewhere can be checked with
/// [`CanonicalJob::violations`] instead of failing as malformed JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalJob {
    /// Dotted lowercase job type, e.g. `email.send`.
    #[serde(rename = "type", default)]
    pub job_type: String,
    #[serde(default)]
    pub queue: String,
    /// Always a JSON array for records produced by this crate.
    #[serde(default)]
    pub args: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// RFC3339 timestamp, present only for delayed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
    /// Source provenance (original id, framework tag, leftovers).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, JsonValue>,
}

impl CanonicalJob {
    /// Create a job. `args` is wrapped into a one-element array unless it is
    /// already an array; an empty `queue` falls back to [`DEFAULT_QUEUE`].
    pub fn new(job_type: impl Into<String>, queue: impl Into<String>, args: JsonValue) -> Self {
        let queue = queue.into();
        Self {
            job_type: job_type.into(),
            queue: if queue.is_empty() {
                DEFAULT_QUEUE.to_string()
            } else {
                queue
            },
            args: into_args_array(args),
            priority: None,
            scheduled_at: None,
            meta: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(format_timestamp(at));
        self
    }

    /// Keep a timestamp the source already expressed as text.
    pub fn with_scheduled_at_raw(mut self, at: impl Into<String>) -> Self {
        self.scheduled_at = Some(at.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Structural invariants this record violates (empty when valid).
    pub fn violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        if self.job_type.trim().is_empty() {
            out.push(Violation::MissingType);
        }
        if self.queue.trim().is_empty() {
            out.push(Violation::MissingQueue);
        }
        match &self.args {
            JsonValue::Null => out.push(Violation::MissingArgs),
            JsonValue::Array(_) => {}
            _ => out.push(Violation::ArgsNotArray),
        }
        if matches!(self.priority, Some(p) if p < 0) {
            out.push(Violation::NegativePriority);
        }
        out
    }

    pub fn is_valid(&self) -> bool {
        self.violations().is_empty()
    }
}

/// Wrap a legacy payload so the result is always array-shaped.
///
/// Arrays pass through, `null` becomes `[]`, anything else becomes `[value]`.
pub fn into_args_array(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Array(_) => value,
        JsonValue::Null => JsonValue::Array(Vec::new()),
        other => JsonValue::Array(vec![other]),
    }
}

/// RFC3339 with second precision and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
