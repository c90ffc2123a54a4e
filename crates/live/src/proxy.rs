//! Per-request routing core of the live router.

use std::sync::Arc;

use jobshift_core::TargetJobRequest;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::ProxyError;
use crate::forward::{ForwardResponse, Forwarder};
use crate::session::MigrationSession;
use crate::translate::Translator;

/// Default cap on an inbound job body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1 << 20;

/// Which side a request went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Target,
    Legacy,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Target => "target",
            Route::Legacy => "legacy",
        }
    }
}

/// Outcome of a successfully handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Translated and forwarded; the target's answer, whatever its status.
    Target(ForwardResponse),
    /// Passed through untouched.
    Legacy { size: usize },
}

impl Routed {
    pub fn route(&self) -> Route {
        match self {
            Routed::Target(_) => Route::Target,
            Routed::Legacy { .. } => Route::Legacy,
        }
    }
}

/// Health of the proxy and its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub target_reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
}

/// Splits traffic between legacy pass-through and the target system.
pub struct MigrationProxy {
    session: Arc<MigrationSession>,
    translator: Translator,
    forwarder: Arc<dyn Forwarder>,
    max_body_bytes: usize,
}

impl MigrationProxy {
    pub fn new(session: Arc<MigrationSession>, forwarder: Arc<dyn Forwarder>) -> Self {
        let translator = Translator::new(session.source());
        Self {
            session,
            translator,
            forwarder,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn session(&self) -> &Arc<MigrationSession> {
        &self.session
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Route one legacy-format job.
    ///
    /// A request routed to the target never falls back to legacy: translation
    /// and forward failures are counted and returned.
    #[instrument(skip_all, fields(session = %self.session.id(), size = body.len()))]
    pub async fn handle_job(&self, body: &[u8]) -> Result<Routed, ProxyError> {
        if body.len() > self.max_body_bytes {
            return Err(ProxyError::PayloadTooLarge {
                size: body.len(),
                limit: self.max_body_bytes,
            });
        }

        let stats = self.session.stats();
        if !self.session.should_route_to_target() {
            stats.record_legacy();
            return Ok(Routed::Legacy { size: body.len() });
        }
        stats.record_target();

        let job = self.translator.translate(body).map_err(|err| {
            stats.record_error();
            debug!(error = %err, "translation failed");
            ProxyError::Translation(err)
        })?;

        let request = TargetJobRequest::from(job);
        let response = self.forwarder.forward(&request).await.map_err(|err| {
            stats.record_error();
            warn!(job_type = %request.job_type, error = %err, "forward failed");
            ProxyError::Forward(err)
        })?;

        if !response.is_success() {
            stats.record_error();
            warn!(job_type = %request.job_type, status = response.status, "target rejected job");
        }
        Ok(Routed::Target(response))
    }

    /// Probe the target; never touches the session lock.
    pub async fn health(&self) -> HealthReport {
        match self.forwarder.probe().await {
            Ok(()) => HealthReport {
                target_reachable: true,
                target_error: None,
            },
            Err(err) => HealthReport {
                target_reachable: false,
                target_error: Some(err.to_string()),
            },
        }
    }
}
