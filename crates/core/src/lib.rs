//! `jobshift-core`: canonical job model and naming rules.
//!
//! This crate is pure: no I/O, no async. Adapters, the transfer pipeline and
//! the live router all build on the types here.

pub mod analysis;
pub mod canonical;
pub mod error;
pub mod id;
pub mod job;
pub mod source;
pub mod target;

pub use analysis::{AnalysisResult, QueueAnalysis};
pub use canonical::{canonicalize, is_canonical};
pub use error::{ParseError, ParseResult, UnknownSource, Violation};
pub use id::SessionId;
pub use job::{into_args_array, format_timestamp, CanonicalJob, DEFAULT_QUEUE};
pub use source::SourceKind;
pub use target::{TargetBatchRequest, TargetJobOptions, TargetJobRequest};
