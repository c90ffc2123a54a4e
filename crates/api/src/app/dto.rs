use serde::{Deserialize, Serialize};

use jobshift_live::{HealthReport, SessionState};

#[derive(Debug, Deserialize)]
pub struct SetPercentageRequest {
    pub percentage: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct RollbackRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LegacyPassThrough {
    pub routed: &'static str,
    pub message: &'static str,
    pub size: usize,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub state: SessionState,
    pub percentage: u8,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub state: SessionState,
    pub percentage: u8,
    pub target: HealthReport,
}
