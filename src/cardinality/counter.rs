//! Distinct-item counters
//!
//! A run counts either exactly or approximately, never both. The choice is
//! made once through [`CountingMode`], which then mints every [`Counter`] the
//! index needs, so the aggregation code never branches on the strategy.

use std::collections::HashSet;

use super::hll::{HyperLogLog, DEFAULT_PRECISION, MAX_PRECISION, MIN_PRECISION};

// ============================================================================
// Merge Errors
// ============================================================================

/// Error when combining two counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterMergeError {
    /// An exact counter cannot absorb an estimated one, or vice versa
    MismatchedMode,

    /// The two sketches use a different number of registers
    MismatchedPrecision {
        /// Precision of the receiving sketch
        self_precision: u8,
        /// Precision of the sketch being merged in
        other_precision: u8,
    },
}

impl std::fmt::Display for CounterMergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterMergeError::MismatchedMode => {
                write!(f, "Cannot merge exact and estimated counters")
            },
            CounterMergeError::MismatchedPrecision {
                self_precision,
                other_precision,
            } => write!(
                f,
                "Cannot merge sketches with different precision: {} vs {}",
                self_precision, other_precision
            ),
        }
    }
}

impl std::error::Error for CounterMergeError {}

// ============================================================================
// Counting Mode
// ============================================================================

/// Run-wide counting strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountingMode {
    /// Remember every distinct item; memory grows with cardinality
    Exact,
    /// HyperLogLog sketch with the given precision; bounded memory
    Estimated {
        /// Register selection bits
        precision: u8,
    },
}

impl CountingMode {
    /// Pick the mode from the "want exact" flag. Precision is clamped to
    /// the range the sketch supports.
    pub fn from_exact_flag(exact: bool, precision: u8) -> Self {
        if exact {
            CountingMode::Exact
        } else {
            CountingMode::Estimated {
                precision: precision.clamp(MIN_PRECISION, MAX_PRECISION),
            }
        }
    }

    /// Create an empty counter of this mode
    pub fn new_counter(&self) -> Counter {
        match *self {
            CountingMode::Exact => Counter::Exact(ExactCounter::default()),
            CountingMode::Estimated { precision } => {
                Counter::Estimated(HyperLogLog::new(precision))
            },
        }
    }

    /// Whether counts are true cardinalities
    pub fn is_exact(&self) -> bool {
        matches!(self, CountingMode::Exact)
    }

    /// Suffix appended to report titles
    pub fn title_suffix(&self) -> &'static str {
        match self {
            CountingMode::Exact => "",
            CountingMode::Estimated { .. } => " (estimated)",
        }
    }
}

impl Default for CountingMode {
    fn default() -> Self {
        CountingMode::Estimated {
            precision: DEFAULT_PRECISION,
        }
    }
}

// ============================================================================
// Counters
// ============================================================================

/// Exact distinct counter backed by a set of every item seen
#[derive(Debug, Clone, Default)]
pub struct ExactCounter {
    items: HashSet<Vec<u8>>,
}

impl ExactCounter {
    /// Add an item; only allocates for unseen items
    pub fn add(&mut self, item: &[u8]) {
        if !self.items.contains(item) {
            self.items.insert(item.to_vec());
        }
    }

    /// Number of distinct items
    pub fn count(&self) -> u64 {
        self.items.len() as u64
    }

    /// Set union with another counter
    pub fn merge(&mut self, other: ExactCounter) {
        if self.items.len() < other.items.len() {
            let mine = std::mem::replace(&mut self.items, other.items);
            self.items.extend(mine);
        } else {
            self.items.extend(other.items);
        }
    }
}

/// Add-only distinct counter
#[derive(Debug, Clone)]
pub enum Counter {
    /// True cardinality
    Exact(ExactCounter),
    /// Sketch estimate
    Estimated(HyperLogLog),
}

impl Counter {
    /// Record an item. Adding the same item again never changes the count.
    pub fn add(&mut self, item: &[u8]) {
        match self {
            Counter::Exact(c) => c.add(item),
            Counter::Estimated(c) => c.add(item),
        }
    }

    /// Number of distinct items seen (estimated for sketches)
    pub fn count(&self) -> u64 {
        match self {
            Counter::Exact(c) => c.count(),
            Counter::Estimated(c) => c.count(),
        }
    }

    /// Absorb another counter of the same mode
    ///
    /// # Errors
    ///
    /// Returns `CounterMergeError` when modes or sketch precisions differ.
    pub fn merge(&mut self, other: Counter) -> Result<(), CounterMergeError> {
        match (self, other) {
            (Counter::Exact(mine), Counter::Exact(theirs)) => {
                mine.merge(theirs);
                Ok(())
            },
            (Counter::Estimated(mine), Counter::Estimated(theirs)) => mine.merge(&theirs),
            _ => Err(CounterMergeError::MismatchedMode),
        }
    }
}
