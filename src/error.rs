//! Error kinds for the CSX engine.

use thiserror::Error;

/// Every fallible entry point in this crate returns `Result<T, Error>`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("entry not found at ({row}, {col})")]
    EntryNotFound { row: usize, col: usize },

    #[error("index out of bounds: {index} (limit {limit})")]
    IndexOutOfBounds { index: usize, limit: usize },

    #[error("failed to open file {path}: {source}")]
    FileOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write file {path}: {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("memory allocation failed: {0}")]
    MemoryAllocation(String),

    #[error("corrupt or incompatible archive: {0}")]
    BadArchive(String),

    #[error("kernel specialization failed: {0}")]
    JitFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
