//! Shard scanning
//!
//! Feeds every key of every TSM file under a set of shards into a
//! [`CardinalityIndex`]. A file that cannot be opened or parsed is reported
//! as a [`Diagnostic`] and skipped; keys already counted are never lost.
//! Failures listing a shard's files abort the scan.
//!
//! # Concurrency
//!
//! With `concurrency == 1` shards are scanned one after another. Larger
//! values scan shards on a dedicated rayon pool of that many threads. Each
//! worker folds into a private [`ScanOutcome`] and the partials are merged at
//! the end. Counter merges (set union, register max) are exact, so the
//! resulting counts do not depend on the worker count.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::cardinality::index::record_in;
use crate::cardinality::{CardinalityIndex, CounterMergeError, CountingMode};
use crate::error::{Error, Result};
use crate::storage::{walk_shard_files, ShardFile, StorageReader, TsmReader};

/// Non-fatal problem encountered while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// File could not be opened or parsed and contributed nothing
    Skipped {
        /// Shard being scanned
        shard_id: u64,
        /// Offending file
        path: PathBuf,
        /// Error message
        reason: String,
    },

    /// File was read but releasing it failed; its keys still count
    CloseFailed {
        /// Shard being scanned
        shard_id: u64,
        /// Offending file
        path: PathBuf,
        /// Error message
        reason: String,
    },
}

impl Diagnostic {
    /// Shard the diagnostic belongs to
    pub fn shard_id(&self) -> u64 {
        match self {
            Diagnostic::Skipped { shard_id, .. } | Diagnostic::CloseFailed { shard_id, .. } => {
                *shard_id
            },
        }
    }

    /// File the diagnostic is about
    pub fn path(&self) -> &Path {
        match self {
            Diagnostic::Skipped { path, .. } | Diagnostic::CloseFailed { path, .. } => path,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Skipped { path, reason, .. } => {
                write!(f, "error: {}: {}. Skipping.", path.display(), reason)
            },
            Diagnostic::CloseFailed { path, reason, .. } => {
                write!(f, "error closing: {}: {}.", path.display(), reason)
            },
        }
    }
}

/// Counters describing one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Shards scanned
    pub shards: u64,
    /// Storage files found
    pub files: u64,
    /// Files skipped because they could not be opened or parsed
    pub files_skipped: u64,
    /// Keys read from the files that were scanned
    pub keys: u64,
    /// Readers that failed to close
    pub close_failures: u64,
}

impl ScanStats {
    fn merge(&mut self, other: &ScanStats) {
        self.shards += other.shards;
        self.files += other.files;
        self.files_skipped += other.files_skipped;
        self.keys += other.keys;
        self.close_failures += other.close_failures;
    }
}

/// Result of scanning a set of shards
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Populated index
    pub index: CardinalityIndex,
    /// Scan counters
    pub stats: ScanStats,
    /// Skip and close diagnostics, ordered by shard ID
    pub diagnostics: Vec<Diagnostic>,
}

impl ScanOutcome {
    /// Empty outcome whose index counts with `mode`
    pub fn new(mode: CountingMode) -> Self {
        Self {
            index: CardinalityIndex::new(mode),
            stats: ScanStats::default(),
            diagnostics: Vec::new(),
        }
    }

    fn merge(&mut self, other: ScanOutcome) -> std::result::Result<(), CounterMergeError> {
        self.index.merge(other.index)?;
        self.stats.merge(&other.stats);
        self.diagnostics.extend(other.diagnostics);
        Ok(())
    }
}

/// Worker result: what was scanned, plus the lowest failing shard if any
struct Partial {
    outcome: ScanOutcome,
    failure: Option<(u64, Error)>,
}

impl Partial {
    fn new(mode: CountingMode) -> Self {
        Self {
            outcome: ScanOutcome::new(mode),
            failure: None,
        }
    }

    fn merge(&mut self, other: Partial) -> std::result::Result<(), CounterMergeError> {
        self.outcome.merge(other.outcome)?;
        if let Some((theirs, error)) = other.failure {
            let lower = match &self.failure {
                Some((mine, _)) => theirs < *mine,
                None => true,
            };
            if lower {
                self.failure = Some((theirs, error));
            }
        }
        Ok(())
    }
}

/// Scans shard directories into a cardinality index
pub struct ShardScanner<R = TsmReader> {
    mode: CountingMode,
    concurrency: usize,
    _reader: PhantomData<fn() -> R>,
}

impl<R> fmt::Debug for ShardScanner<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardScanner")
            .field("mode", &self.mode)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl ShardScanner<TsmReader> {
    /// Scanner reading TSM files
    pub fn new(mode: CountingMode, concurrency: usize) -> Self {
        Self::with_reader(mode, concurrency)
    }
}

impl<R: StorageReader> ShardScanner<R> {
    /// Scanner reading files with `R`
    pub fn with_reader(mode: CountingMode, concurrency: usize) -> Self {
        Self {
            mode,
            concurrency: concurrency.max(1),
            _reader: PhantomData,
        }
    }

    /// Scan every shard in `shards`
    ///
    /// # Errors
    ///
    /// Fails if a shard's files cannot be listed or the worker pool cannot
    /// be started. Per-file failures are diagnostics, not errors.
    pub fn scan(&self, shards: &BTreeMap<u64, PathBuf>) -> Result<ScanOutcome> {
        self.scan_with(shards, |_| Ok(()))
    }

    /// Scan every shard in `shards`, handing each diagnostic to `emit`.
    ///
    /// Sequential scans emit a shard's diagnostics as soon as the shard is
    /// done. Parallel scans emit them, ordered by shard ID, once all workers
    /// finish. When a shard fails, diagnostics from lower shard IDs are
    /// emitted before the error is returned, so the two paths agree.
    pub fn scan_with<F>(&self, shards: &BTreeMap<u64, PathBuf>, mut emit: F) -> Result<ScanOutcome>
    where
        F: FnMut(&Diagnostic) -> Result<()>,
    {
        let mut outcome = if self.concurrency == 1 || shards.len() <= 1 {
            let mut outcome = ScanOutcome::new(self.mode);
            for (&shard_id, path) in shards {
                let emitted = outcome.diagnostics.len();
                let result = self.scan_shard(&mut outcome, shard_id, path);
                for diagnostic in &outcome.diagnostics[emitted..] {
                    emit(diagnostic)?;
                }
                result?;
            }
            outcome
        } else {
            let Partial { mut outcome, failure } = self.scan_parallel(shards)?;
            outcome.diagnostics.sort_by_key(Diagnostic::shard_id);
            if let Some((failed_shard, _)) = &failure {
                outcome.diagnostics.retain(|d| d.shard_id() < *failed_shard);
            }
            for diagnostic in &outcome.diagnostics {
                emit(diagnostic)?;
            }
            if let Some((_, error)) = failure {
                return Err(error);
            }
            outcome
        };

        outcome.diagnostics.sort_by_key(Diagnostic::shard_id);

        let stats = outcome.stats;
        info!(
            shards = stats.shards,
            files = stats.files,
            files_skipped = stats.files_skipped,
            keys = stats.keys,
            close_failures = stats.close_failures,
            buckets = outcome.index.len(),
            "scan complete"
        );
        Ok(outcome)
    }

    fn scan_parallel(&self, shards: &BTreeMap<u64, PathBuf>) -> Result<Partial> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .thread_name(|i| format!("shard-scan-{}", i))
            .build()?;
        debug!(workers = self.concurrency, shards = shards.len(), "parallel scan");

        let work: Vec<(u64, &PathBuf)> = shards.iter().map(|(&id, path)| (id, path)).collect();
        pool.install(|| {
            work.par_iter()
                .try_fold(
                    || Partial::new(self.mode),
                    |mut acc: Partial, &(shard_id, path)| -> Result<Partial> {
                        // A worker stops at its first failing shard
                        if acc.failure.is_none() {
                            if let Err(e) = self.scan_shard(&mut acc.outcome, shard_id, path) {
                                acc.failure = Some((shard_id, e));
                            }
                        }
                        Ok(acc)
                    },
                )
                .try_reduce(
                    || Partial::new(self.mode),
                    |mut acc: Partial, other: Partial| -> Result<Partial> {
                        acc.merge(other)?;
                        Ok(acc)
                    },
                )
        })
    }

    /// Scan all storage files of one shard into `outcome`
    pub fn scan_shard(&self, outcome: &mut ScanOutcome, shard_id: u64, path: &Path) -> Result<()> {
        let files = walk_shard_files(path)?;
        debug!(shard_id, path = %path.display(), files = files.len(), "scanning shard");

        outcome.stats.shards += 1;
        for file in &files {
            self.scan_file(outcome, shard_id, file);
        }
        Ok(())
    }

    /// Scan one storage file. Never fails; problems become diagnostics.
    pub fn scan_file(&self, outcome: &mut ScanOutcome, shard_id: u64, file: &ShardFile) {
        outcome.stats.files += 1;

        let handle = match File::open(&file.path) {
            Ok(handle) => handle,
            Err(e) => return skip(outcome, shard_id, &file.path, e.to_string()),
        };
        // The handle is closed when `open` fails and drops it
        let reader = match R::open(handle) {
            Ok(reader) => reader,
            Err(e) => return skip(outcome, shard_id, &file.path, e.to_string()),
        };

        let key_count = reader.key_count();
        if key_count > 0 {
            let measurements = outcome
                .index
                .measurements_mut(
                    file.database.as_encoded_bytes(),
                    file.retention_policy.as_encoded_bytes(),
                );
            for i in 0..key_count {
                if let Some(key) = reader.key_at(i) {
                    record_in(measurements, self.mode, key);
                }
            }
        }
        outcome.stats.keys += key_count as u64;
        debug!(path = %file.path.display(), keys = key_count, "scanned storage file");

        if let Err(e) = reader.close() {
            debug!(path = %file.path.display(), error = %e, "close failed");
            outcome.stats.close_failures += 1;
            outcome.diagnostics.push(Diagnostic::CloseFailed {
                shard_id,
                path: file.path.clone(),
                reason: e.to_string(),
            });
        }
    }
}

fn skip(outcome: &mut ScanOutcome, shard_id: u64, path: &Path, reason: String) {
    debug!(path = %path.display(), error = %reason, "skipping storage file");
    outcome.stats.files_skipped += 1;
    outcome.diagnostics.push(Diagnostic::Skipped {
        shard_id,
        path: path.to_path_buf(),
        reason,
    });
}
