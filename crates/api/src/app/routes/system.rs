use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Extension, response::IntoResponse, Json};
use jobshift_live::{HealthReport, MigrationProxy};

use crate::app::dto::HealthResponse;

/// Upper bound on the target probe, so `/health` answers even when the
/// target hangs.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn health(Extension(proxy): Extension<Arc<MigrationProxy>>) -> impl IntoResponse {
    let target = match tokio::time::timeout(HEALTH_PROBE_TIMEOUT, proxy.health()).await {
        Ok(report) => report,
        Err(_) => HealthReport {
            target_reachable: false,
            target_error: Some(format!("probe timed out after {HEALTH_PROBE_TIMEOUT:?}")),
        },
    };
    let session = proxy.session();
    Json(HealthResponse {
        status: "ok",
        state: session.state(),
        percentage: session.percentage(),
        target,
    })
}
