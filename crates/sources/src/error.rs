use std::time::Duration;

use thiserror::Error;

/// A collaborator (Redis, HTTP API, SQL table) call failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Failure of a whole `analyze`/`export` call.
///
/// Every variant is a connection-level failure; record-level problems never
/// surface here (they are skipped and counted).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("connection failure: {0}")]
    Connection(#[from] StoreError),

    #[error("connection failure: {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}
