//! Error types for the sorter.
//!
//! Per-line problems never leave the classifier; everything here is either
//! fatal at startup (asset loading) or reported in the run summary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, SorterError>;

/// A line that does not carry a usable domain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no domain found in {line:?}")]
pub struct MalformedAddress {
    pub line: String,
}

/// Errors surfaced to the caller of the sorter.
#[derive(Error, Debug)]
pub enum SorterError {
    /// The TLD map or geo database could not be opened or decoded.
    #[error("lookup asset {path:?} could not be loaded: {reason}")]
    LookupAssetMissing { path: PathBuf, reason: String },

    /// Writing one output target failed.
    #[error("failed to write {target} output to {path:?}: {source}")]
    OutputWriteFailure {
        target: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The input stream broke before it was exhausted.
    #[error("input source failed after {lines_read} lines: {source}")]
    InputSourceFailure {
        lines_read: u64,
        #[source]
        source: io::Error,
    },

    /// The worker pool could not be started.
    #[error("worker pool could not be started: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// A pipeline thread panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

impl SorterError {
    pub fn asset_missing(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        SorterError::LookupAssetMissing {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
