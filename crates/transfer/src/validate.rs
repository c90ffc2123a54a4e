//! Dry-run validation of an NDJSON export. Reads only; never talks to the
//! target system.

use std::path::Path;

use jobshift_core::CanonicalJob;
use serde::Serialize;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::instrument;

use crate::error::TransferError;
use crate::ndjson::{is_blank, LineReader};

/// One problem found on one line (1-based, blank lines counted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineError {
    pub line: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LineError>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.invalid == 0
    }
}

/// Check every non-blank line against the canonical record invariants.
///
/// A record with several violations contributes one [`LineError`] per
/// violation but counts once in `invalid`.
pub async fn validate_reader<R>(reader: R) -> Result<ValidationReport, TransferError>
where
    R: AsyncBufRead + Unpin,
{
    let mut report = ValidationReport::default();
    let mut lines = LineReader::new(reader);

    while let Some((line_no, line)) = lines.next_line().await.map_err(TransferError::Read)? {
        if is_blank(line) {
            continue;
        }
        report.total += 1;

        let job: CanonicalJob = match serde_json::from_slice(line) {
            Ok(job) => job,
            Err(err) => {
                report.invalid += 1;
                report.errors.push(LineError {
                    line: line_no,
                    message: format!("invalid JSON: {err}"),
                });
                continue;
            }
        };

        let violations = job.violations();
        if violations.is_empty() {
            report.valid += 1;
        } else {
            report.invalid += 1;
            report
                .errors
                .extend(violations.into_iter().map(|v| LineError {
                    line: line_no,
                    message: v.to_string(),
                }));
        }
    }

    Ok(report)
}

#[instrument]
pub async fn validate_file(path: &Path) -> Result<ValidationReport, TransferError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| TransferError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    validate_reader(BufReader::new(file)).await
}
