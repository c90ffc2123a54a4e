//! Legacy store connection settings.

use std::time::Duration;

use jobshift_core::SourceKind;
use jobshift_sources::DEFAULT_CALL_TIMEOUT;

pub const DEFAULT_FAKTORY_URL: &str = "http://localhost:7420";

/// Where a legacy store lives and how long each call may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// `redis://...` for Sidekiq/BullMQ/Celery, `http://...` for Faktory,
    /// `postgres://...` for River.
    pub url: String,
    /// Faktory web UI password (basic auth, empty user).
    pub password: Option<String>,
    pub timeout: Duration,
}

impl SourceConfig {
    pub fn new(kind: SourceKind, url: impl Into<String>) -> Self {
        let url = url.into();
        let url = if url.is_empty() && kind == SourceKind::Faktory {
            DEFAULT_FAKTORY_URL.to_string()
        } else {
            url
        };
        Self {
            kind,
            url,
            password: None,
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
