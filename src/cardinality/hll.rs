//! HyperLogLog distinct-count sketch
//!
//! Memory is bounded by `2^precision` bytes regardless of how many distinct
//! items are added. Small sketches start sparse (only touched registers are
//! stored) and switch to a dense register array once more than `m / 8`
//! registers are set, which keeps per-measurement counters cheap when a
//! measurement has only a handful of series.
//!
//! Standard error is `1.04 / sqrt(m)`:
//! - precision 10: ~3.2%
//! - precision 12: ~1.6%
//! - precision 14: ~0.8% (default)

use std::collections::BTreeMap;
use std::hash::Hasher;

use twox_hash::XxHash64;

use super::counter::CounterMergeError;

/// Smallest supported precision
pub const MIN_PRECISION: u8 = 4;

/// Largest supported precision
pub const MAX_PRECISION: u8 = 18;

/// Default precision (16384 registers)
pub const DEFAULT_PRECISION: u8 = 14;

#[derive(Debug, Clone)]
enum Registers {
    /// register index -> rank, only for registers that were touched
    Sparse(BTreeMap<u32, u8>),
    Dense(Vec<u8>),
}

/// HyperLogLog sketch over byte strings
#[derive(Debug, Clone)]
pub struct HyperLogLog {
    precision: u8,
    registers: Registers,
}

impl HyperLogLog {
    /// Create an empty sketch.
    ///
    /// # Panics
    /// Panics if precision is outside `MIN_PRECISION..=MAX_PRECISION`.
    pub fn new(precision: u8) -> Self {
        assert!(
            (MIN_PRECISION..=MAX_PRECISION).contains(&precision),
            "precision must be within {}..={}",
            MIN_PRECISION,
            MAX_PRECISION
        );
        Self {
            precision,
            registers: Registers::Sparse(BTreeMap::new()),
        }
    }

    /// Create an empty sketch, returning None if precision is invalid
    pub fn try_new(precision: u8) -> Option<Self> {
        if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
            return None;
        }
        Some(Self::new(precision))
    }

    /// Precision (bits of hash used for register selection)
    pub fn precision(&self) -> u8 {
        self.precision
    }

    fn num_registers(&self) -> usize {
        1usize << self.precision
    }

    /// True while the sketch stores only touched registers
    pub fn is_sparse(&self) -> bool {
        matches!(self.registers, Registers::Sparse(_))
    }

    /// Add an item
    pub fn add(&mut self, item: &[u8]) {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(item);
        let hash = hasher.finish();

        let index = (hash >> (64 - self.precision)) as u32;
        let remaining = hash << self.precision;
        let rank = if remaining == 0 {
            64 - self.precision + 1
        } else {
            remaining.leading_zeros() as u8 + 1
        };
        self.update(index, rank);
    }

    fn update(&mut self, index: u32, rank: u8) {
        let threshold = self.num_registers() / 8;
        match &mut self.registers {
            Registers::Sparse(sparse) => {
                let slot = sparse.entry(index).or_insert(0);
                if rank > *slot {
                    *slot = rank;
                }
                if sparse.len() > threshold {
                    self.densify();
                }
            },
            Registers::Dense(dense) => {
                let slot = &mut dense[index as usize];
                if rank > *slot {
                    *slot = rank;
                }
            },
        }
    }

    fn densify(&mut self) {
        if let Registers::Sparse(sparse) = &self.registers {
            let mut dense = vec![0u8; self.num_registers()];
            for (&index, &rank) in sparse {
                dense[index as usize] = rank;
            }
            self.registers = Registers::Dense(dense);
        }
    }

    /// Estimated number of distinct items added
    pub fn count(&self) -> u64 {
        let m = self.num_registers() as f64;

        let (sum, zeros) = match &self.registers {
            Registers::Sparse(sparse) => {
                if sparse.is_empty() {
                    return 0;
                }
                let touched: f64 = sparse.values().map(|&r| 2f64.powi(-(r as i32))).sum();
                let untouched = self.num_registers() - sparse.len();
                (touched + untouched as f64, untouched)
            },
            Registers::Dense(dense) => {
                let mut sum = 0.0;
                let mut zeros = 0usize;
                for &r in dense {
                    sum += 2f64.powi(-(r as i32));
                    if r == 0 {
                        zeros += 1;
                    }
                }
                (sum, zeros)
            },
        };

        let raw = alpha(self.num_registers()) * m * m / sum;

        // Linear counting is more accurate while many registers are still empty
        if raw <= 2.5 * m && zeros > 0 {
            return (m * (m / zeros as f64).ln()).round() as u64;
        }
        raw.round() as u64
    }

    /// Fold another sketch into this one (register-wise maximum)
    pub fn merge(&mut self, other: &HyperLogLog) -> Result<(), CounterMergeError> {
        if self.precision != other.precision {
            return Err(CounterMergeError::MismatchedPrecision {
                self_precision: self.precision,
                other_precision: other.precision,
            });
        }

        match &other.registers {
            Registers::Sparse(sparse) => {
                for (&index, &rank) in sparse {
                    self.update(index, rank);
                }
            },
            Registers::Dense(dense) => {
                self.densify();
                if let Registers::Dense(mine) = &mut self.registers {
                    for (slot, &rank) in mine.iter_mut().zip(dense) {
                        *slot = (*slot).max(rank);
                    }
                }
            },
        }
        Ok(())
    }

    /// Approximate heap usage in bytes
    pub fn memory_bytes(&self) -> usize {
        match &self.registers {
            // key + value + BTreeMap node overhead, roughly
            Registers::Sparse(sparse) => sparse.len() * 16,
            Registers::Dense(dense) => dense.capacity(),
        }
    }
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION)
    }
}

fn alpha(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}
