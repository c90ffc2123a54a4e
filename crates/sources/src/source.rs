//! The adapter seam shared by every legacy framework.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use jobshift_core::{AnalysisResult, CanonicalJob, ParseResult, SourceKind};
use tracing::{debug, error};

use crate::error::{SourceError, StoreError};

/// Upper bound for a single collaborator call when the caller sets none.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Jobs pulled out of a legacy store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exported {
    pub jobs: Vec<CanonicalJob>,
    /// Records that failed to parse and were left behind.
    pub skipped: u64,
}

impl Exported {
    /// Keep a parsed record, or log and count a parse failure.
    pub fn absorb(&mut self, source: SourceKind, queue: &str, parsed: ParseResult<CanonicalJob>) {
        match parsed {
            Ok(job) => self.jobs.push(job),
            Err(err) => {
                debug!(source = %source, queue, error = %err, "skipping unparseable record");
                self.skipped += 1;
            }
        }
    }
}

/// A read-only view of one legacy job store.
///
/// Neither operation mutates the store. Record-level parse failures are
/// skipped; collaborator failures and timeouts abort the call.
#[async_trait]
pub trait Source: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Connection string reported back in [`AnalysisResult::connection`].
    fn connection(&self) -> &str;

    async fn analyze(&self) -> Result<AnalysisResult, SourceError>;

    async fn export(&self) -> Result<Exported, SourceError>;
}

/// Run one collaborator call under `timeout`.
pub(crate) async fn bounded<T, F>(
    timeout: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            error!(operation, error = %err, "legacy store call failed");
            Err(SourceError::Connection(err))
        }
        Err(_) => {
            error!(operation, ?timeout, "legacy store call timed out");
            Err(SourceError::Timeout { operation, timeout })
        }
    }
}
