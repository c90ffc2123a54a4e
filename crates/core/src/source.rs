//! Legacy framework tags.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownSource;

/// The legacy job framework a record (or a live session) comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Class-based jobs in Redis lists (`queue:<name>`).
    Sidekiq,
    /// Named jobs stored as Redis hashes (`bull:<queue>:<id>`).
    #[serde(rename = "bullmq")]
    BullMq,
    /// Task-path messages in Redis lists, base64 bodies.
    Celery,
    /// HTTP job server.
    Faktory,
    /// SQL-table backed jobs (`river_job`).
    River,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Sidekiq,
        SourceKind::BullMq,
        SourceKind::Celery,
        SourceKind::Faktory,
        SourceKind::River,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Sidekiq => "sidekiq",
            SourceKind::BullMq => "bullmq",
            SourceKind::Celery => "celery",
            SourceKind::Faktory => "faktory",
            SourceKind::River => "river",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sidekiq" => Ok(SourceKind::Sidekiq),
            "bullmq" | "bull" => Ok(SourceKind::BullMq),
            "celery" => Ok(SourceKind::Celery),
            "faktory" => Ok(SourceKind::Faktory),
            "river" => Ok(SourceKind::River),
            other => Err(UnknownSource(other.to_string())),
        }
    }
}
