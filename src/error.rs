//! Error types for the inspection tools
//!
//! Two classes of failure exist. [`Error`] aborts a whole run: bad
//! configuration, an unreadable data directory, or a report that cannot be
//! written. [`StorageError`] is scoped to a single storage file; the scanner
//! reports it as a skip and moves on to the next file.

use std::path::PathBuf;
use thiserror::Error;

use crate::cardinality::CounterMergeError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors that terminate an inspection run
#[derive(Error, Debug)]
pub enum Error {
    /// No database directory was configured
    #[error("path to database directory must be provided")]
    MissingDbPath,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Walking the data directory failed
    #[error("{}: {source}", path.display())]
    Walk {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A storage file sits in a directory that is not `<db>/<rp>/<shard id>`
    #[error("invalid shard layout: {0}")]
    ShardLayout(String),

    /// Writing the report or a diagnostic failed
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),

    /// Storage error surfaced outside the per-file skip path
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Partial results could not be combined
    #[error("Merge error: {0}")]
    Merge(#[from] CounterMergeError),

    /// The scan worker pool could not be started
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors opening, parsing or closing one storage file
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO operation failed
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// File is smaller than header plus footer
    #[error("file too small: {size} bytes (min: {min} bytes)")]
    FileTooSmall {
        /// Actual file size
        size: u64,
        /// Minimum size for a valid file
        min: u64,
    },

    /// Header magic number mismatch
    #[error("invalid magic number: expected 0x{expected:08x}, got 0x{actual:08x}")]
    InvalidMagic {
        /// Expected magic
        expected: u32,
        /// Magic found in the file
        actual: u32,
    },

    /// Header version is not supported
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// Index offset in the footer points outside the file
    #[error("index offset {offset} out of bounds (index must lie within {start}..{end})")]
    IndexOutOfBounds {
        /// Offset read from the footer
        offset: u64,
        /// First valid index byte
        start: u64,
        /// End of the index region
        end: u64,
    },

    /// An index entry runs past the end of the index
    #[error("truncated index entry at offset {offset}: {detail}")]
    TruncatedIndex {
        /// Byte offset of the entry
        offset: usize,
        /// What was missing
        detail: &'static str,
    },

    /// Releasing the reader failed
    #[error("{0}")]
    Close(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_error_names_path() {
        let err = Error::Walk {
            path: PathBuf::from("/data/db0"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "/data/db0: denied");
    }

    #[test]
    fn test_storage_error_converts_to_fatal() {
        let err: Error = StorageError::UnsupportedVersion(9).into();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(err.to_string(), "Storage error: unsupported version: 9");
    }

    #[test]
    fn test_magic_is_hex_formatted() {
        let err = StorageError::InvalidMagic {
            expected: 0x16D1_D1A5,
            actual: 0xdead_beef,
        };
        assert_eq!(
            err.to_string(),
            "invalid magic number: expected 0x16d1d1a5, got 0xdeadbeef"
        );
    }
}
