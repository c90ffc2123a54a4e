//! Record-level error model.

use thiserror::Error;

/// Result of parsing one raw legacy record.
pub type ParseResult<T> = Result<T, ParseError>;

/// A single legacy record could not be turned into a canonical job.
///
/// Always recoverable: callers skip the record, count it, and carry on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The record is not valid JSON (or not the expected JSON shape).
    #[error("malformed record: {0}")]
    Malformed(String),

    /// A field the format requires is absent or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but its value cannot be mapped.
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ParseError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(value: serde_json::Error) -> Self {
        Self::Malformed(value.to_string())
    }
}

/// Structural invariant violated by a canonical record.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Violation {
    #[error("missing required field: type")]
    MissingType,

    #[error("missing required field: queue")]
    MissingQueue,

    #[error("missing required field: args")]
    MissingArgs,

    #[error("args must be a JSON array")]
    ArgsNotArray,

    #[error("priority must be non-negative")]
    NegativePriority,
}

/// An unknown legacy framework tag.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported source: {0} (expected one of sidekiq, bullmq, celery, faktory, river)")]
pub struct UnknownSource(pub String);
