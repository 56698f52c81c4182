//! Cardinality aggregation
//!
//! Counts distinct series keys and field names per
//! (database, retention policy, measurement), either exactly or with a
//! bounded-memory HyperLogLog sketch.
//!
//! # Example
//!
//! ```rust
//! use kuba_inspect::cardinality::{CardinalityIndex, CountingMode};
//!
//! let mut index = CardinalityIndex::new(CountingMode::Exact);
//! index.record_key("db0", "autogen", b"cpu,host=a#!~#usage");
//! index.record_key("db0", "autogen", b"cpu,host=b#!~#usage");
//!
//! let cpu = index.get("db0", "autogen", "cpu").unwrap();
//! assert_eq!(cpu.series.count(), 2);
//! assert_eq!(cpu.fields.count(), 1);
//! ```

/// Exact and estimated distinct counters
pub mod counter;
/// HyperLogLog sketch
pub mod hll;
/// Database / retention policy / measurement index
pub mod index;

pub use counter::{Counter, CounterMergeError, CountingMode, ExactCounter};
pub use hll::HyperLogLog;
pub use index::{CardinalityIndex, MeasurementCounters, MeasurementMap};
