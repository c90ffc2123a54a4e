//! The seam between the import loop and the target system.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use jobshift_core::CanonicalJob;

use crate::error::SubmitError;

/// Delivers canonical jobs to the target system.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    /// One job, one request.
    async fn submit(&self, job: &CanonicalJob) -> Result<(), SubmitError>;

    /// Every job in one request; all-or-nothing from the caller's view.
    async fn submit_batch(&self, jobs: &[CanonicalJob]) -> Result<(), SubmitError>;
}

#[async_trait]
impl<T> JobSubmitter for Arc<T>
where
    T: JobSubmitter + ?Sized,
{
    async fn submit(&self, job: &CanonicalJob) -> Result<(), SubmitError> {
        (**self).submit(job).await
    }

    async fn submit_batch(&self, jobs: &[CanonicalJob]) -> Result<(), SubmitError> {
        (**self).submit_batch(jobs).await
    }
}

/// Records what it receives; rejects jobs whose type is listed in
/// [`Self::reject_type`].
///
/// Intended for tests/dev.
#[derive(Debug, Default)]
pub struct RecordingSubmitter {
    accepted: Mutex<Vec<CanonicalJob>>,
    rejected_types: Mutex<BTreeSet<String>>,
    batch_requests: Mutex<u64>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_type(&self, job_type: &str) {
        self.rejected_types
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_type.to_string());
    }

    pub fn accepted(&self) -> Vec<CanonicalJob> {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn batch_requests(&self) -> u64 {
        *self.batch_requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, job: &CanonicalJob) -> Result<(), SubmitError> {
        let rejected = self.rejected_types.lock().unwrap_or_else(PoisonError::into_inner);
        if rejected.contains(&job.job_type) {
            return Err(SubmitError::Rejected {
                status: 422,
                body: format!("unknown job type {}", job.job_type),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl JobSubmitter for RecordingSubmitter {
    async fn submit(&self, job: &CanonicalJob) -> Result<(), SubmitError> {
        self.check(job)?;
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job.clone());
        Ok(())
    }

    async fn submit_batch(&self, jobs: &[CanonicalJob]) -> Result<(), SubmitError> {
        *self.batch_requests.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        for job in jobs {
            self.check(job)?;
        }
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(jobs);
        Ok(())
    }
}
