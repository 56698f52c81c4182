//! Kuba Inspect - offline inspection of TSM shard directories
//!
//! This library answers "how many distinct series and fields exist per
//! measurement" for a data directory without loading it into memory:
//! - Shard discovery under `<root>/<db>/<rp>/<shard id>/`
//! - Memory-mapped TSM key index reading
//! - Exact (set) or estimated (HyperLogLog) distinct counting
//! - Optional parallel shard scanning with deterministic results
//! - Tab-aligned cardinality report with combined ("cloud2") cardinality

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod report;
pub mod scan;
pub mod storage;

/// Exact and estimated distinct counting, hierarchical index
pub mod cardinality;

/// Configuration management with TOML support
pub mod config;

/// The `cardinality` command: discover, scan, report
pub mod command;

// Re-export main types
pub use cardinality::{CardinalityIndex, CountingMode};
pub use command::{CardinalityCommand, CardinalityRun};
pub use config::InspectConfig;
pub use error::{Error, Result};
pub use report::CardinalityReport;
pub use scan::{Diagnostic, ScanStats, ShardScanner};
