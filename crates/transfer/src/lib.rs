//! `jobshift-transfer`: batch movement of canonical jobs.
//!
//! Export streams a source adapter's jobs to NDJSON, import replays an NDJSON
//! file into the target system in bounded batches, and validation checks a
//! file without touching the target.

pub mod error;
pub mod export;
pub mod import;
mod ndjson;
pub mod submit;
pub mod validate;

pub use error::{SubmitError, TransferError};
pub use export::{export, export_to_file, write_ndjson, ExportSummary};
pub use import::{
    import, import_file, ImportMode, ImportOptions, ImportResult, Progress, ProgressCallback,
    DEFAULT_BATCH_SIZE,
};
pub use submit::{JobSubmitter, RecordingSubmitter};
pub use validate::{validate_file, validate_reader, LineError, ValidationReport};
