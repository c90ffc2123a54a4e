//! Environment configuration for the `jobshift-proxy` binary.

use std::net::SocketAddr;
use std::time::Duration;

use jobshift_core::SourceKind;
use jobshift_live::DEFAULT_MAX_BODY_BYTES;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_TARGET_URL: &str = "http://localhost:8080";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8090";
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {var}={value:?}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

impl ConfigError {
    fn new(var: &'static str, value: &str, reason: impl ToString) -> Self {
        Self {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub source: SourceKind,
    pub target_url: String,
    pub target_token: Option<String>,
    pub listen: SocketAddr,
    /// When set, the session enters dual_run at boot with this split.
    pub percentage: Option<u32>,
    pub forward_timeout: Duration,
    pub max_body_bytes: usize,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let source = match get("JOBSHIFT_SOURCE") {
            Some(raw) => raw
                .parse::<SourceKind>()
                .map_err(|e| ConfigError::new("JOBSHIFT_SOURCE", &raw, e))?,
            None => SourceKind::Sidekiq,
        };

        let target_url = get("JOBSHIFT_TARGET_URL").unwrap_or_else(|| DEFAULT_TARGET_URL.to_string());

        let target_token = get("JOBSHIFT_TARGET_TOKEN");
        if target_token.is_none() {
            warn!("JOBSHIFT_TARGET_TOKEN not set; forwarding to the target without authentication");
        }

        let listen_raw = get("JOBSHIFT_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::new("JOBSHIFT_LISTEN", &listen_raw, e))?;

        let percentage = match get("JOBSHIFT_PERCENTAGE") {
            Some(raw) => {
                let pct = raw
                    .trim()
                    .parse::<u32>()
                    .map_err(|e| ConfigError::new("JOBSHIFT_PERCENTAGE", &raw, e))?;
                if pct > 100 {
                    return Err(ConfigError::new("JOBSHIFT_PERCENTAGE", &raw, "must be between 0 and 100"));
                }
                Some(pct)
            }
            None => None,
        };

        let forward_timeout = match get("JOBSHIFT_FORWARD_TIMEOUT_MS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => return Err(ConfigError::new("JOBSHIFT_FORWARD_TIMEOUT_MS", &raw, "must be positive")),
                Ok(ms) => Duration::from_millis(ms),
                Err(e) => return Err(ConfigError::new("JOBSHIFT_FORWARD_TIMEOUT_MS", &raw, e)),
            },
            None => DEFAULT_FORWARD_TIMEOUT,
        };

        let max_body_bytes = match get("JOBSHIFT_MAX_BODY_BYTES") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) => return Err(ConfigError::new("JOBSHIFT_MAX_BODY_BYTES", &raw, "must be positive")),
                Ok(n) => n,
                Err(e) => return Err(ConfigError::new("JOBSHIFT_MAX_BODY_BYTES", &raw, e)),
            },
            None => DEFAULT_MAX_BODY_BYTES,
        };

        Ok(Self {
            source,
            target_url,
            target_token,
            listen,
            percentage,
            forward_timeout,
            max_body_bytes,
        })
    }
}
