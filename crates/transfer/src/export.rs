//! NDJSON export.

use std::path::Path;

use jobshift_core::CanonicalJob;
use jobshift_sources::Source;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{info, instrument};

use crate::error::TransferError;

/// Outcome of one export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub written: u64,
    /// Legacy records the adapter could not parse.
    pub skipped: u64,
}

/// Write `jobs` as newline-delimited JSON, in order, then flush.
pub async fn write_ndjson<W>(writer: W, jobs: &[CanonicalJob]) -> Result<u64, TransferError>
where
    W: AsyncWrite + Unpin,
{
    let mut out = BufWriter::new(writer);
    let mut line = Vec::with_capacity(256);
    for job in jobs {
        line.clear();
        serde_json::to_writer(&mut line, job)?;
        line.push(b'\n');
        out.write_all(&line).await.map_err(TransferError::Write)?;
    }
    out.flush().await.map_err(TransferError::Write)?;
    Ok(jobs.len() as u64)
}

/// Run `source.export()` once and stream the result to `writer`.
#[instrument(skip_all, fields(source = %source.kind()))]
pub async fn export<S, W>(source: &S, writer: W) -> Result<ExportSummary, TransferError>
where
    S: Source + ?Sized,
    W: AsyncWrite + Unpin,
{
    let exported = source.export().await?;
    let written = write_ndjson(writer, &exported.jobs).await?;
    info!(written, skipped = exported.skipped, "export finished");
    Ok(ExportSummary {
        written,
        skipped: exported.skipped,
    })
}

/// Export into `path`.
///
/// Output goes to a temporary file in the same directory and is renamed into
/// place only after every line was written and synced; on failure the
/// temporary file is removed and `path` is left untouched.
#[instrument(skip(source), fields(source = %source.kind()))]
pub async fn export_to_file<S>(source: &S, path: &Path) -> Result<ExportSummary, TransferError>
where
    S: Source + ?Sized,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    let open_err = |source| TransferError::Open {
        path: path.to_path_buf(),
        source,
    };

    let staging = tempfile::Builder::new()
        .prefix(".jobshift-export-")
        .suffix(".ndjson.tmp")
        .tempfile_in(&dir)
        .map_err(open_err)?;
    let handle = staging.as_file().try_clone().map_err(open_err)?;
    let mut file = tokio::fs::File::from_std(handle);

    let summary = export(source, &mut file).await?;
    file.sync_all().await.map_err(TransferError::Write)?;
    drop(file);

    staging
        .persist(path)
        .map_err(|e| TransferError::Write(e.error))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobshift_sources::sidekiq::{queue_key, QUEUES_KEY};
    use jobshift_sources::{InMemoryKeyValueStore, SidekiqSource};
    use serde_json::json;
    use std::sync::Arc;

    fn sidekiq() -> SidekiqSource<Arc<InMemoryKeyValueStore>> {
        let store = Arc::new(InMemoryKeyValueStore::new());
        store.sadd(QUEUES_KEY, "mailers");
        store.rpush(
            &queue_key("mailers"),
            r#"{"class":"Mailers::WelcomeEmail","args":[],"queue":"mailers","jid":"d1"}"#,
        );
        store.rpush(&queue_key("mailers"), "{oops");
        store.rpush(
            &queue_key("mailers"),
            r#"{"class":"Mailers::Digest","args":[3],"queue":"mailers","jid":"d2"}"#,
        );
        SidekiqSource::new(store, "redis://test")
    }

    #[tokio::test]
    async fn writes_one_line_per_job_in_source_order() {
        let mut buf = Vec::new();
        let summary = export(&sidekiq(), &mut buf).await.unwrap();
        assert_eq!(summary, ExportSummary { written: 2, skipped: 1 });

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], json!("mailers.welcome.email"));
        assert_eq!(lines[1]["type"], json!("mailers.digest"));
        assert!(text.ends_with('\n'));
    }

    #[tokio::test]
    async fn export_to_file_replaces_destination_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.ndjson");
        std::fs::write(&path, "stale\n").unwrap();

        let summary = export_to_file(&sidekiq(), &path).await.unwrap();
        assert_eq!(summary.written, 2);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(!text.contains("stale"));
        // only the destination remains, no staging leftovers
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn failed_source_leaves_no_partial_file() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        store.set_unavailable(Some("connection refused"));
        let source = SidekiqSource::new(store, "redis://down");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.ndjson");
        let err = export_to_file(&source, &path).await.unwrap_err();

        assert!(matches!(err, TransferError::Source(_)));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_directory_is_an_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("jobs.ndjson");
        let err = export_to_file(&sidekiq(), &path).await.unwrap_err();
        assert!(matches!(err, TransferError::Open { .. }));
    }
}
