use std::time::Duration;

use jobshift_core::ParseError;
use thiserror::Error;

use crate::session::SessionState;

/// Rejected session operation. The session is left unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {action} while session is {state}")]
    StateConflict {
        action: &'static str,
        state: SessionState,
    },

    #[error("percentage must be between 0 and 100, got {0}")]
    InvalidPercentage(u32),

    #[error("rollback requires a reason")]
    MissingReason,
}

/// The target system could not be reached (or answered the health probe
/// with a failure).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForwardError {
    #[error("forward to target failed: {0}")]
    Failed(String),

    #[error("forward to target timed out after {0:?}")]
    Timeout(Duration),

    #[error("target answered with status {status}")]
    Rejected { status: u16 },
}

/// Failure of one routed request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("translation failed: {0}")]
    Translation(#[from] ParseError),

    #[error(transparent)]
    Forward(#[from] ForwardError),
}
