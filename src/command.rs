//! The `cardinality` command
//!
//! Discovers shards under the configured data directory, scans them and
//! writes the report to stdout. Skip and close diagnostics go to stderr.
//! Both writers are injected so runs can be captured in tests.

use std::io::Write;

use tracing::info;

use crate::config::InspectConfig;
use crate::error::{Error, Result};
use crate::report::CardinalityReport;
use crate::scan::{Diagnostic, ScanStats, ShardScanner};
use crate::storage::{discover_shards, StorageReader, TsmReader};

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct CardinalityRun {
    /// Rendered report
    pub report: CardinalityReport,
    /// Scan counters
    pub stats: ScanStats,
    /// Diagnostics written to stderr
    pub diagnostics: Vec<Diagnostic>,
}

/// One invocation of the cardinality command
pub struct CardinalityCommand<O, E> {
    config: InspectConfig,
    stdout: O,
    stderr: E,
}

impl<O: Write, E: Write> CardinalityCommand<O, E> {
    /// Command writing the report to `stdout` and diagnostics to `stderr`
    pub fn new(config: InspectConfig, stdout: O, stderr: E) -> Self {
        Self {
            config,
            stdout,
            stderr,
        }
    }

    /// Run with TSM readers
    pub fn run(self) -> Result<CardinalityRun> {
        self.run_with::<TsmReader>()
    }

    /// Run with a custom storage reader
    ///
    /// # Errors
    ///
    /// Invalid configuration, an unreadable data directory or shard, and
    /// failures writing output are fatal. Unreadable storage files are not.
    pub fn run_with<R: StorageReader>(mut self) -> Result<CardinalityRun> {
        self.config.validate()?;
        let db_path = self.config.db_path.clone().ok_or(Error::MissingDbPath)?;
        let mode = self.config.counting_mode();

        let shards = discover_shards(&db_path)?;
        info!(path = %db_path.display(), shards = shards.len(), "discovered shards");
        if shards.is_empty() {
            writeln!(self.stderr, "No shards under {}", db_path.display()).map_err(Error::Output)?;
        }

        let stderr = &mut self.stderr;
        let scanned = ShardScanner::<R>::with_reader(mode, self.config.concurrency)
            .scan_with(&shards, |diagnostic| {
                writeln!(stderr, "{}", diagnostic).map_err(Error::Output)
            });
        // Diagnostics already written still reach the terminal on failure
        self.stderr.flush().map_err(Error::Output)?;
        let outcome = scanned?;

        let report = CardinalityReport::from_index(&outcome.index);
        report.write_table(&mut self.stdout).map_err(Error::Output)?;
        self.stdout.flush().map_err(Error::Output)?;
        self.stderr.flush().map_err(Error::Output)?;

        Ok(CardinalityRun {
            report,
            stats: outcome.stats,
            diagnostics: outcome.diagnostics,
        })
    }
}
