//! Hierarchical cardinality index
//!
//! ```text
//! database -> retention policy -> measurement -> MeasurementCounters
//! ```
//!
//! Buckets are created on first observation and then only mutated. Every
//! level is a `BTreeMap` keyed on raw bytes, so names that are not valid
//! UTF-8 stay distinct, and iteration is grouped and ordered by database,
//! then retention policy, then measurement.

use std::collections::BTreeMap;

use super::counter::{Counter, CounterMergeError, CountingMode};
use crate::key;

/// Series and field counters for one (database, retention policy, measurement)
#[derive(Debug, Clone)]
pub struct MeasurementCounters {
    /// Distinct series keys
    pub series: Counter,
    /// Distinct field names
    pub fields: Counter,
}

impl MeasurementCounters {
    /// Empty counters of the given mode
    pub fn new(mode: CountingMode) -> Self {
        Self {
            series: mode.new_counter(),
            fields: mode.new_counter(),
        }
    }

    fn merge(&mut self, other: MeasurementCounters) -> Result<(), CounterMergeError> {
        self.series.merge(other.series)?;
        self.fields.merge(other.fields)
    }
}

/// Measurements of one retention policy
pub type MeasurementMap = BTreeMap<Vec<u8>, MeasurementCounters>;

/// Retention policies of one database
pub type RetentionPolicyMap = BTreeMap<Vec<u8>, MeasurementMap>;

/// Three-level map from database to measurement counters
#[derive(Debug, Clone)]
pub struct CardinalityIndex {
    mode: CountingMode,
    databases: BTreeMap<Vec<u8>, RetentionPolicyMap>,
}

impl CardinalityIndex {
    /// Create an empty index whose counters all use `mode`
    pub fn new(mode: CountingMode) -> Self {
        Self {
            mode,
            databases: BTreeMap::new(),
        }
    }

    /// Counting mode shared by every bucket
    pub fn mode(&self) -> CountingMode {
        self.mode
    }

    /// Measurements of `(db, rp)`, creating empty levels as needed
    pub fn measurements_mut(&mut self, db: impl AsRef<[u8]>, rp: impl AsRef<[u8]>) -> &mut MeasurementMap {
        self.databases
            .entry(db.as_ref().to_vec())
            .or_default()
            .entry(rp.as_ref().to_vec())
            .or_default()
    }

    /// Bucket for the triple, created empty on first use
    pub fn bucket_mut(
        &mut self,
        db: impl AsRef<[u8]>,
        rp: impl AsRef<[u8]>,
        measurement: impl AsRef<[u8]>,
    ) -> &mut MeasurementCounters {
        let mode = self.mode;
        self.measurements_mut(db, rp)
            .entry(measurement.as_ref().to_vec())
            .or_insert_with(|| MeasurementCounters::new(mode))
    }

    /// Bucket for the triple if it has been observed
    pub fn get(
        &self,
        db: impl AsRef<[u8]>,
        rp: impl AsRef<[u8]>,
        measurement: impl AsRef<[u8]>,
    ) -> Option<&MeasurementCounters> {
        self.databases
            .get(db.as_ref())?
            .get(rp.as_ref())?
            .get(measurement.as_ref())
    }

    /// Route a raw storage key into its bucket.
    ///
    /// The series key (everything before the field separator) feeds the
    /// series counter and the field name feeds the field counter.
    pub fn record_key(&mut self, db: impl AsRef<[u8]>, rp: impl AsRef<[u8]>, raw_key: &[u8]) {
        let mode = self.mode;
        record_in(self.measurements_mut(db, rp), mode, raw_key);
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.databases
            .values()
            .flat_map(|rps| rps.values())
            .map(|ms| ms.len())
            .sum()
    }

    /// True if no key has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate buckets in database, retention policy, measurement order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8], &[u8], &MeasurementCounters)> + '_ {
        self.databases.iter().flat_map(|(db, rps)| {
            rps.iter().flat_map(move |(rp, ms)| {
                ms.iter()
                    .map(move |(m, counters)| (db.as_slice(), rp.as_slice(), m.as_slice(), counters))
            })
        })
    }

    /// Fold another index into this one.
    ///
    /// Buckets only present in `other` move over untouched; shared buckets
    /// merge their counters.
    pub fn merge(&mut self, other: CardinalityIndex) -> Result<(), CounterMergeError> {
        if self.mode.is_exact() != other.mode.is_exact() {
            return Err(CounterMergeError::MismatchedMode);
        }

        for (db, rps) in other.databases {
            let mine = self.databases.entry(db).or_default();
            for (rp, measurements) in rps {
                let mine = mine.entry(rp).or_default();
                for (name, counters) in measurements {
                    match mine.get_mut(&name) {
                        Some(existing) => existing.merge(counters)?,
                        None => {
                            mine.insert(name, counters);
                        },
                    }
                }
            }
        }
        Ok(())
    }
}

/// Decompose `raw_key` and add its parts to the bucket in `measurements`
pub(crate) fn record_in(measurements: &mut MeasurementMap, mode: CountingMode, raw_key: &[u8]) {
    let (series_key, field) = key::split_key(raw_key);
    let bucket = measurements
        .entry(key::measurement(series_key).into_owned())
        .or_insert_with(|| MeasurementCounters::new(mode));
    bucket.series.add(series_key);
    bucket.fields.add(field);
}
