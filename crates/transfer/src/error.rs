use std::path::PathBuf;

use jobshift_sources::SourceError;
use thiserror::Error;

/// Fatal pipeline failure. Record-level problems are tallied, not raised.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read: {0}")]
    Read(#[source] std::io::Error),

    #[error("write: {0}")]
    Write(#[source] std::io::Error),

    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// The target system did not accept a submission.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("target rejected job with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("target unreachable: {0}")]
    Unreachable(String),
}
