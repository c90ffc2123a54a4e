//! Batched NDJSON import into the target system.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use jobshift_core::CanonicalJob;
use serde::Serialize;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::error::TransferError;
use crate::ndjson::{is_blank, LineReader};
use crate::submit::JobSubmitter;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Running totals handed to the progress callback after each flushed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Records the target accepted so far.
    pub imported: u64,
    /// Records seen so far, malformed lines included.
    pub seen: u64,
    pub batches: u64,
}

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// How a flushed batch reaches the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportMode {
    /// One request per record; failures are tallied per record.
    #[default]
    PerRecord,
    /// One request per batch; a failed request fails every record in it.
    Batched,
}

#[derive(Clone)]
pub struct ImportOptions {
    pub batch_size: usize,
    pub mode: ImportMode,
    pub progress: Option<ProgressCallback>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            mode: ImportMode::default(),
            progress: None,
        }
    }
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("batch_size", &self.batch_size)
            .field("mode", &self.mode)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ImportOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_progress(mut self, callback: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }
}

/// Final tally of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub batches: u64,
}

/// Forwards progress to the callback on a separate task so a slow callback
/// never stalls the import loop.
struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<Progress>>,
    drain: Option<tokio::task::JoinHandle<()>>,
}

impl ProgressReporter {
    fn spawn(callback: Option<ProgressCallback>) -> Self {
        let Some(callback) = callback else {
            return Self { tx: None, drain: None };
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<Progress>();
        let drain = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                callback(progress);
            }
        });
        Self {
            tx: Some(tx),
            drain: Some(drain),
        }
    }

    fn report(&self, progress: Progress) {
        if let Some(tx) = &self.tx {
            // receiver only goes away if the callback panicked
            let _ = tx.send(progress);
        }
    }

    async fn finish(mut self) {
        self.tx.take();
        if let Some(drain) = self.drain.take() {
            if let Err(err) = drain.await {
                warn!(error = %err, "progress callback task failed");
            }
        }
    }
}

struct Importer<'a, T: ?Sized> {
    submitter: &'a T,
    mode: ImportMode,
    result: ImportResult,
    reporter: ProgressReporter,
}

impl<T: JobSubmitter + ?Sized> Importer<'_, T> {
    async fn flush(&mut self, batch: &mut Vec<CanonicalJob>) {
        if batch.is_empty() {
            return;
        }

        match self.mode {
            ImportMode::PerRecord => {
                for job in batch.iter() {
                    match self.submitter.submit(job).await {
                        Ok(()) => self.result.success += 1,
                        Err(err) => {
                            debug!(job_type = %job.job_type, error = %err, "submission failed");
                            self.result.failed += 1;
                        }
                    }
                }
            }
            ImportMode::Batched => match self.submitter.submit_batch(batch).await {
                Ok(()) => self.result.success += batch.len() as u64,
                Err(err) => {
                    warn!(records = batch.len(), error = %err, "batch submission failed");
                    self.result.failed += batch.len() as u64;
                }
            },
        }

        batch.clear();
        self.result.batches += 1;
        self.reporter.report(Progress {
            imported: self.result.success,
            seen: self.result.total,
            batches: self.result.batches,
        });
    }
}

/// Read NDJSON from `reader` and deliver every record to `submitter`.
///
/// Blank lines are ignored. A malformed line, invalid UTF-8 included, counts
/// as one total and one failed record. Only I/O errors abort the run.
#[instrument(skip_all, fields(batch_size = options.batch_size, mode = ?options.mode))]
pub async fn import<R, T>(
    reader: R,
    submitter: &T,
    options: &ImportOptions,
) -> Result<ImportResult, TransferError>
where
    R: AsyncBufRead + Unpin,
    T: JobSubmitter + ?Sized,
{
    let batch_size = options.batch_size.max(1);
    let mut importer = Importer {
        submitter,
        mode: options.mode,
        result: ImportResult::default(),
        reporter: ProgressReporter::spawn(options.progress.clone()),
    };
    let mut batch = Vec::with_capacity(batch_size);
    let mut lines = LineReader::new(reader);

    loop {
        let (line_no, line) = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                importer.reporter.finish().await;
                return Err(TransferError::Read(err));
            }
        };
        if is_blank(line) {
            continue;
        }

        importer.result.total += 1;
        match serde_json::from_slice::<CanonicalJob>(line) {
            Ok(job) => batch.push(job),
            Err(err) => {
                warn!(line = line_no, error = %err, "skipping malformed line");
                importer.result.failed += 1;
                continue;
            }
        }

        if batch.len() >= batch_size {
            importer.flush(&mut batch).await;
        }
    }
    importer.flush(&mut batch).await;

    let result = importer.result;
    importer.reporter.finish().await;
    info!(
        total = result.total,
        success = result.success,
        failed = result.failed,
        batches = result.batches,
        "import finished"
    );
    Ok(result)
}

/// [`import`] from a file on disk.
pub async fn import_file<T>(
    path: &Path,
    submitter: &T,
    options: &ImportOptions,
) -> Result<ImportResult, TransferError>
where
    T: JobSubmitter + ?Sized,
{
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| TransferError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    import(BufReader::new(file), submitter, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::RecordingSubmitter;
    use std::sync::Mutex;

    fn line(job_type: &str) -> String {
        format!(r#"{{"type":"{job_type}","queue":"default","args":[]}}"#)
    }

    #[tokio::test]
    async fn malformed_line_is_counted_not_fatal() {
        let input = format!("{}\n{{not json\n{}\n", line("a.one"), line("a.two"));
        let submitter = RecordingSubmitter::new();

        let result = import(input.as_bytes(), &submitter, &ImportOptions::default())
            .await
            .unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.success, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.batches, 1);
        let types: Vec<String> = submitter.accepted().into_iter().map(|j| j.job_type).collect();
        assert_eq!(types, ["a.one", "a.two"]);
    }

    #[tokio::test]
    async fn non_utf8_line_is_counted_not_fatal() {
        let mut input = line("a.one").into_bytes();
        input.extend_from_slice(b"\n\xff\xfe garbage\n");
        input.extend_from_slice(line("a.two").as_bytes());
        input.push(b'\n');
        let submitter = RecordingSubmitter::new();

        let result = import(input.as_slice(), &submitter, &ImportOptions::default())
            .await
            .unwrap();

        assert_eq!((result.total, result.success, result.failed), (3, 2, 1));
        let types: Vec<String> = submitter.accepted().into_iter().map(|j| j.job_type).collect();
        assert_eq!(types, ["a.one", "a.two"]);
    }

    #[tokio::test]
    async fn blank_lines_are_ignored() {
        let input = format!("\n{}\n   \n\n{}\n", line("a"), line("b"));
        let result = import(input.as_bytes(), &RecordingSubmitter::new(), &ImportOptions::default())
            .await
            .unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.success, 2);
    }

    #[tokio::test]
    async fn one_rejected_record_does_not_fail_its_batch() {
        let input: String = ["a", "bad", "c"].iter().map(|t| line(t) + "\n").collect();
        let submitter = RecordingSubmitter::new();
        submitter.reject_type("bad");

        let result = import(input.as_bytes(), &submitter, &ImportOptions::default())
            .await
            .unwrap();
        assert_eq!((result.success, result.failed), (2, 1));
    }

    #[tokio::test]
    async fn batched_mode_fails_whole_batch_but_keeps_earlier_ones() {
        let input: String = ["a", "b", "bad", "d"].iter().map(|t| line(t) + "\n").collect();
        let submitter = RecordingSubmitter::new();
        submitter.reject_type("bad");
        let options = ImportOptions::default()
            .with_batch_size(2)
            .with_mode(ImportMode::Batched);

        let result = import(input.as_bytes(), &submitter, &options).await.unwrap();

        assert_eq!(result, ImportResult { total: 4, success: 2, failed: 2, batches: 2 });
        assert_eq!(submitter.batch_requests(), 2);
    }

    #[tokio::test]
    async fn progress_fires_once_per_flushed_batch() {
        let input: String = (0..250).map(|i| line(&format!("job.{i}")) + "\n").collect();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = ImportOptions::default().with_progress(move |p| sink.lock().unwrap().push(p));

        let result = import(input.as_bytes(), &RecordingSubmitter::new(), &options)
            .await
            .unwrap();
        assert_eq!(result.batches, 3);

        let reports = seen.lock().unwrap().clone();
        let running: Vec<(u64, u64)> = reports.iter().map(|p| (p.imported, p.seen)).collect();
        assert_eq!(running, [(100, 100), (200, 200), (250, 250)]);
    }

    #[tokio::test]
    async fn import_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.ndjson");
        std::fs::write(&path, format!("{}\nnot json\n{}\n", line("x"), line("y"))).unwrap();

        let result = import_file(&path, &RecordingSubmitter::new(), &ImportOptions::default())
            .await
            .unwrap();
        assert_eq!((result.total, result.success, result.failed), (3, 2, 1));

        let missing = import_file(&dir.path().join("missing"), &RecordingSubmitter::new(), &ImportOptions::default()).await;
        assert!(matches!(missing, Err(TransferError::Open { .. })));
    }
}
