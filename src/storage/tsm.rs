//! TSM file index reader
//!
//! Only the key index of a TSM file is needed to count cardinality, so the
//! reader maps the file, validates the header and footer, and walks the index
//! once to record where every key starts. Block data is never touched.
//!
//! # File Layout
//!
//! ```text
//! ┌────────┬─────────┬──────────┬──────────────┬──────────────┐
//! │ magic  │ version │ blocks…  │ index…       │ index offset │
//! │ u32 BE │ u8      │          │              │ u64 BE       │
//! └────────┴─────────┴──────────┴──────────────┴──────────────┘
//!
//! index entry:
//! ┌─────────┬─────┬────────────┬─────────────┬───────────────────────┐
//! │ key len │ key │ block type │ entry count │ entry count × 28 bytes │
//! │ u16 BE  │     │ u8         │ u16 BE      │ min,max,offset,size    │
//! └─────────┴─────┴────────────┴─────────────┴───────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use kuba_inspect::storage::{StorageReader, TsmReader};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let file = std::fs::File::open("/var/lib/tsdb/data/db0/autogen/1/000000001-000000001.tsm")?;
//! let reader = TsmReader::open(file)?;
//! for i in 0..reader.key_count() {
//!     if let Some(key) = reader.key_at(i) {
//!         println!("{}", String::from_utf8_lossy(key));
//!     }
//! }
//! reader.close()?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use super::StorageReader;
use crate::error::StorageError;

/// Magic number at the start of every TSM file
pub const TSM_MAGIC: u32 = 0x16D1_D1A5;

/// Supported TSM format version
pub const TSM_VERSION: u8 = 1;

/// File extension of TSM files
pub const TSM_EXTENSION: &str = "tsm";

const HEADER_SIZE: usize = 5;
const FOOTER_SIZE: usize = 8;
const INDEX_ENTRY_SIZE: usize = 28;

/// Smallest valid file: header plus footer with an empty index
const MIN_FILE_SIZE: usize = HEADER_SIZE + FOOTER_SIZE;

/// Memory-mapped TSM key index
#[derive(Debug)]
pub struct TsmReader {
    /// File handle (kept open for the lifetime of the map)
    file: File,

    /// Read-only map of the whole file
    mmap: Mmap,

    /// Start of each index entry, in key order
    key_offsets: Vec<usize>,
}

impl TsmReader {
    fn parse_index(buf: &[u8]) -> Result<Vec<usize>, StorageError> {
        let magic = read_u32(buf, 0);
        if magic != TSM_MAGIC {
            return Err(StorageError::InvalidMagic {
                expected: TSM_MAGIC,
                actual: magic,
            });
        }
        let version = buf[4];
        if version != TSM_VERSION {
            return Err(StorageError::UnsupportedVersion(version));
        }

        let end = buf.len() - FOOTER_SIZE;
        let offset = read_u64(buf, end);
        if offset < HEADER_SIZE as u64 || offset > end as u64 {
            return Err(StorageError::IndexOutOfBounds {
                offset,
                start: HEADER_SIZE as u64,
                end: end as u64,
            });
        }

        let mut offsets = Vec::new();
        let mut pos = offset as usize;
        while pos < end {
            if pos + 2 > end {
                return Err(truncated(pos, "key length"));
            }
            let key_len = read_u16(buf, pos) as usize;
            let key_end = pos + 2 + key_len;
            if key_end > end {
                return Err(truncated(pos, "key"));
            }
            if key_end + 3 > end {
                return Err(truncated(pos, "block type and entry count"));
            }
            let entries = read_u16(buf, key_end + 1) as usize;
            let next = key_end + 3 + entries * INDEX_ENTRY_SIZE;
            if next > end {
                return Err(truncated(pos, "index entries"));
            }
            offsets.push(pos);
            pos = next;
        }
        Ok(offsets)
    }

    /// Size of the mapped file in bytes
    pub fn file_size(&self) -> usize {
        self.mmap.len()
    }
}

impl StorageReader for TsmReader {
    fn open(file: File) -> Result<Self, StorageError> {
        let size = file.metadata()?.len();
        if size < MIN_FILE_SIZE as u64 {
            return Err(StorageError::FileTooSmall {
                size,
                min: MIN_FILE_SIZE as u64,
            });
        }

        // SAFETY: the map is read-only and TSM files are immutable once written
        let mmap = unsafe { Mmap::map(&file)? };

        #[cfg(unix)]
        mmap.advise(memmap2::Advice::Sequential)?;

        let key_offsets = Self::parse_index(&mmap)?;
        Ok(Self {
            file,
            mmap,
            key_offsets,
        })
    }

    fn key_count(&self) -> usize {
        self.key_offsets.len()
    }

    fn key_at(&self, index: usize) -> Option<&[u8]> {
        let pos = *self.key_offsets.get(index)?;
        let len = read_u16(&self.mmap, pos) as usize;
        self.mmap.get(pos + 2..pos + 2 + len)
    }

    fn close(self) -> Result<(), StorageError> {
        let Self { file, mmap, .. } = self;
        drop(mmap);
        drop(file);
        Ok(())
    }
}

fn truncated(offset: usize, detail: &'static str) -> StorageError {
    StorageError::TruncatedIndex { offset, detail }
}

// Callers bounds-check before reading.
fn read_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_be_bytes([buf[pos], buf[pos + 1]])
}

fn read_u32(buf: &[u8], pos: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[pos..pos + 4]);
    u32::from_be_bytes(bytes)
}

fn read_u64(buf: &[u8], pos: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[pos..pos + 8]);
    u64::from_be_bytes(bytes)
}

// ============================================================================
// Index-only writer
// ============================================================================

/// Writes TSM files that carry an index but no block data.
///
/// Keys are sorted and de-duplicated the way a TSM index requires. Each key
/// gets a single placeholder index entry. Useful for seeding fixtures and
/// benchmarks without a full storage engine.
#[derive(Debug, Clone, Default)]
pub struct TsmIndexBuilder {
    keys: BTreeSet<Vec<u8>>,
}

impl TsmIndexBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw key
    pub fn key(mut self, key: impl AsRef<[u8]>) -> Self {
        self.keys.insert(key.as_ref().to_vec());
        self
    }

    /// Add many raw keys
    pub fn keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        self.keys.extend(keys.into_iter().map(|k| k.as_ref().to_vec()));
        self
    }

    /// Encode the file
    ///
    /// # Errors
    ///
    /// Fails with `InvalidInput` if a key is longer than `u16::MAX` bytes.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(MIN_FILE_SIZE + self.keys.len() * 64);
        buf.extend_from_slice(&TSM_MAGIC.to_be_bytes());
        buf.push(TSM_VERSION);

        let index_offset = buf.len() as u64;
        for key in &self.keys {
            let len = u16::try_from(key.len()).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("key of {} bytes exceeds {} bytes", key.len(), u16::MAX),
                )
            })?;
            buf.extend_from_slice(&len.to_be_bytes());
            buf.extend_from_slice(key);
            buf.push(0); // float block
            buf.extend_from_slice(&1u16.to_be_bytes());
            buf.extend_from_slice(&0i64.to_be_bytes()); // min time
            buf.extend_from_slice(&0i64.to_be_bytes()); // max time
            buf.extend_from_slice(&(HEADER_SIZE as i64).to_be_bytes()); // block offset
            buf.extend_from_slice(&0u32.to_be_bytes()); // block size
        }
        buf.extend_from_slice(&index_offset.to_be_bytes());
        Ok(buf)
    }

    /// Write the file to `path`
    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        std::fs::write(path, self.to_bytes()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_bytes(dir: &TempDir, name: &str, bytes: &[u8]) -> Result<TsmReader, StorageError> {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        TsmReader::open(File::open(&path).unwrap())
    }

    #[test]
    fn test_reads_keys_in_sorted_order() {
        let dir = TempDir::new().unwrap();
        let bytes = TsmIndexBuilder::new()
            .key("mem,host=a#!~#used")
            .key("cpu,host=b#!~#value")
            .key("cpu,host=a#!~#value")
            .to_bytes()
            .unwrap();

        let reader = open_bytes(&dir, "a.tsm", &bytes).unwrap();
        assert_eq!(reader.key_count(), 3);
        assert_eq!(reader.key_at(0), Some(&b"cpu,host=a#!~#value"[..]));
        assert_eq!(reader.key_at(1), Some(&b"cpu,host=b#!~#value"[..]));
        assert_eq!(reader.key_at(2), Some(&b"mem,host=a#!~#used"[..]));
        assert_eq!(reader.key_at(3), None);
        reader.close().unwrap();
    }

    #[test]
    fn test_builder_deduplicates_keys() {
        let dir = TempDir::new().unwrap();
        let bytes = TsmIndexBuilder::new()
            .keys(["a#!~#f", "a#!~#f", "b#!~#f"])
            .to_bytes()
            .unwrap();
        let reader = open_bytes(&dir, "dup.tsm", &bytes).unwrap();
        assert_eq!(reader.key_count(), 2);
    }

    #[test]
    fn test_empty_index_is_valid() {
        let dir = TempDir::new().unwrap();
        let bytes = TsmIndexBuilder::new().to_bytes().unwrap();
        assert_eq!(bytes.len(), MIN_FILE_SIZE);

        let reader = open_bytes(&dir, "empty.tsm", &bytes).unwrap();
        assert_eq!(reader.key_count(), 0);
        assert_eq!(reader.file_size(), MIN_FILE_SIZE);
    }

    #[test]
    fn test_rejects_small_file() {
        let dir = TempDir::new().unwrap();
        let err = open_bytes(&dir, "tiny.tsm", b"abc").unwrap_err();
        assert!(matches!(err, StorageError::FileTooSmall { size: 3, .. }));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let mut bytes = TsmIndexBuilder::new().key("a").to_bytes().unwrap();
        bytes[0] = 0;
        let err = open_bytes(&dir, "magic.tsm", &bytes).unwrap_err();
        assert!(matches!(err, StorageError::InvalidMagic { .. }));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        let mut bytes = TsmIndexBuilder::new().key("a").to_bytes().unwrap();
        bytes[4] = 2;
        let err = open_bytes(&dir, "version.tsm", &bytes).unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_rejects_index_offset_past_footer() {
        let dir = TempDir::new().unwrap();
        let mut bytes = TsmIndexBuilder::new().key("a").to_bytes().unwrap();
        let footer = bytes.len() - FOOTER_SIZE;
        bytes[footer..].copy_from_slice(&u64::MAX.to_be_bytes());
        let err = open_bytes(&dir, "offset.tsm", &bytes).unwrap_err();
        assert!(matches!(err, StorageError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn test_rejects_truncated_entry() {
        let dir = TempDir::new().unwrap();
        let bytes = TsmIndexBuilder::new().key("cpu#!~#value").to_bytes().unwrap();

        // Drop the last index entry byte but keep a valid footer
        let footer = bytes[bytes.len() - FOOTER_SIZE..].to_vec();
        let mut truncated = bytes[..bytes.len() - FOOTER_SIZE - 1].to_vec();
        truncated.extend_from_slice(&footer);

        let err = open_bytes(&dir, "trunc.tsm", &truncated).unwrap_err();
        assert!(matches!(
            err,
            StorageError::TruncatedIndex {
                detail: "index entries",
                ..
            }
        ));
    }

    #[test]
    fn test_builder_rejects_oversized_key() {
        let key = vec![b'x'; u16::MAX as usize + 1];
        let err = TsmIndexBuilder::new().key(key).to_bytes().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
