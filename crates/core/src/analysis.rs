//! Read-only analysis reports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::source::SourceKind;

/// Pending work and job-type mix of one legacy queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueAnalysis {
    pub name: String,
    /// Raw entry count from the store, parse failures included.
    pub pending_jobs: u64,
    /// Canonical job type → number of records that parsed with that type.
    pub job_types: BTreeMap<String, u64>,
}

impl QueueAnalysis {
    pub fn new(name: impl Into<String>, pending_jobs: u64) -> Self {
        Self {
            name: name.into(),
            pending_jobs,
            job_types: BTreeMap::new(),
        }
    }

    pub fn record_type(&mut self, job_type: &str) {
        *self.job_types.entry(job_type.to_string()).or_insert(0) += 1;
    }

    /// Records that parsed successfully.
    pub fn parsed_jobs(&self) -> u64 {
        self.job_types.values().sum()
    }
}

/// Dry-run report for a whole legacy store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub source: SourceKind,
    pub connection: String,
    pub queues: Vec<QueueAnalysis>,
    pub total_jobs: u64,
    pub summary: String,
}

impl AnalysisResult {
    /// Build a report whose total is the sum of per-queue pending counts plus
    /// `extra_jobs` (work that lives outside any queue, e.g. retry sets).
    pub fn from_queues(
        source: SourceKind,
        connection: impl Into<String>,
        queues: Vec<QueueAnalysis>,
        extra_jobs: u64,
    ) -> Self {
        let total_jobs = queues.iter().map(|q| q.pending_jobs).sum::<u64>() + extra_jobs;
        let summary = format!("Found {} queues, {} total jobs", queues.len(), total_jobs);
        Self {
            source,
            connection: connection.into(),
            queues,
            total_jobs,
            summary,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn queue(&self, name: &str) -> Option<&QueueAnalysis> {
        self.queues.iter().find(|q| q.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_include_out_of_queue_work() {
        let mut mailers = QueueAnalysis::new("mailers", 3);
        mailers.record_type("email.send");
        mailers.record_type("email.send");

        let report = AnalysisResult::from_queues(
            SourceKind::Sidekiq,
            "redis://localhost",
            vec![mailers, QueueAnalysis::new("default", 1)],
            2,
        );

        assert_eq!(report.total_jobs, 6);
        assert_eq!(report.summary, "Found 2 queues, 6 total jobs");
        let mailers = report.queue("mailers").unwrap();
        assert_eq!(mailers.job_types["email.send"], 2);
        assert_eq!(mailers.parsed_jobs(), 2);
    }
}
