//! Request bodies understood by the target job system.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::job::CanonicalJob;

/// Relative path of the single-job creation endpoint.
pub const JOBS_PATH: &str = "/ojs/v1/jobs";

/// Relative path of the grouped creation endpoint.
pub const BATCH_PATH: &str = "/ojs/v1/jobs/batch";

/// Relative path of the target's health endpoint.
pub const HEALTH_PATH: &str = "/ojs/v1/health";

/// One job-creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetJobRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    pub args: JsonValue,
    pub options: TargetJobOptions,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetJobOptions {
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
}

/// Several job-creation requests in one body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetBatchRequest {
    pub jobs: Vec<TargetJobRequest>,
}

impl From<&CanonicalJob> for TargetJobRequest {
    fn from(job: &CanonicalJob) -> Self {
        Self {
            job_type: job.job_type.clone(),
            args: job.args.clone(),
            options: TargetJobOptions {
                queue: job.queue.clone(),
                priority: job.priority,
                scheduled_at: job.scheduled_at.clone(),
            },
            meta: job.meta.clone(),
        }
    }
}

impl From<CanonicalJob> for TargetJobRequest {
    fn from(job: CanonicalJob) -> Self {
        Self {
            job_type: job.job_type,
            args: job.args,
            options: TargetJobOptions {
                queue: job.queue,
                priority: job.priority,
                scheduled_at: job.scheduled_at,
            },
            meta: job.meta,
        }
    }
}

impl<'a> FromIterator<&'a CanonicalJob> for TargetBatchRequest {
    fn from_iter<I: IntoIterator<Item = &'a CanonicalJob>>(iter: I) -> Self {
        Self {
            jobs: iter.into_iter().map(TargetJobRequest::from).collect(),
        }
    }
}
