//! Storage access for offline inspection
//!
//! This module exposes the pieces of the on-disk layout that inspection
//! tools need: locating shards under a data directory and reading the key
//! index of each TSM file.
//!
//! # Key Components
//!
//! - **StorageReader**: ordered key index over one opened storage file
//! - **TsmReader**: memory-mapped implementation for TSM files
//! - **Shard discovery**: maps shard IDs to directories and lists their files
//!
//! # Example
//!
//! ```rust,no_run
//! use kuba_inspect::storage::{discover_shards, walk_shard_files};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! for (id, dir) in discover_shards("/var/lib/tsdb/data".as_ref())? {
//!     let files = walk_shard_files(&dir)?;
//!     println!("shard {}: {} files", id, files.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::fs::File;

use crate::error::StorageError;

/// Shard discovery and shard file listing
pub mod shard;
/// TSM index reader and index-only writer
pub mod tsm;

pub use shard::{discover_shards, walk_shard_files, ShardFile};
pub use tsm::{TsmIndexBuilder, TsmReader};

/// Ordered key index of one storage file
///
/// Implementations take ownership of the opened file. Dropping a reader
/// releases the file; `close` does the same but reports failures.
pub trait StorageReader: Sized {
    /// Build a reader over an opened, read-only file
    fn open(file: File) -> Result<Self, StorageError>;

    /// Number of keys in the index
    fn key_count(&self) -> usize;

    /// Key at `index`, in index order
    fn key_at(&self, index: usize) -> Option<&[u8]>;

    /// Release the reader
    fn close(self) -> Result<(), StorageError>;
}
