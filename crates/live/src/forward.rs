//! The seam between the live router and the target system.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use jobshift_core::TargetJobRequest;

use crate::error::ForwardError;

/// What the target answered, relayed to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ForwardResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends translated jobs to the target system.
///
/// A non-2xx answer is a successful forward (it is relayed); only transport
/// failures and timeouts are errors.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, request: &TargetJobRequest) -> Result<ForwardResponse, ForwardError>;

    /// Bounded reachability check of the target.
    async fn probe(&self) -> Result<(), ForwardError>;
}

#[async_trait]
impl<T> Forwarder for Arc<T>
where
    T: Forwarder + ?Sized,
{
    async fn forward(&self, request: &TargetJobRequest) -> Result<ForwardResponse, ForwardError> {
        (**self).forward(request).await
    }

    async fn probe(&self) -> Result<(), ForwardError> {
        (**self).probe().await
    }
}

/// Answers every forward with a fixed response (or a fixed error) and keeps
/// what it was sent.
///
/// Intended for tests/dev.
#[derive(Debug)]
pub struct StaticForwarder {
    outcome: Result<ForwardResponse, ForwardError>,
    calls: AtomicU64,
    received: Mutex<Vec<TargetJobRequest>>,
}

impl StaticForwarder {
    pub fn accepting() -> Self {
        Self::with_outcome(Ok(ForwardResponse {
            status: 201,
            content_type: Some("application/json".to_string()),
            body: br#"{"id":"job-1"}"#.to_vec(),
        }))
    }

    pub fn with_outcome(outcome: Result<ForwardResponse, ForwardError>) -> Self {
        Self {
            outcome,
            calls: AtomicU64::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<TargetJobRequest> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Forwarder for StaticForwarder {
    async fn forward(&self, request: &TargetJobRequest) -> Result<ForwardResponse, ForwardError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.outcome.clone()
    }

    async fn probe(&self) -> Result<(), ForwardError> {
        self.outcome.as_ref().map(|_| ()).map_err(Clone::clone)
    }
}
