//! Named counters reported by each stage.
//!
//! Every map and reduce worker owns a private [`Counters`] set; the stage
//! driver merges them once the phase has finished, so incrementing never needs
//! synchronization.

use std::collections::BTreeMap;

/// Records handed to a map function, whether or not they could be processed.
pub const ROWS_PROCESSED: &str = "Rows Processed";
/// Records skipped because the map function rejected them.
pub const MAP_ERRORS: &str = "Map Errors";
/// Groups skipped because the reduce function rejected them.
pub const REDUCE_ERRORS: &str = "Reduce Errors";
/// Records written to the stage output.
pub const OUTPUT_RECORDS: &str = "Output Records";

/// A set of monotonic named counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    values: BTreeMap<&'static str, u64>,
}

impl Counters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, name: &'static str, by: u64) {
        *self.values.entry(name).or_insert(0) += by;
    }

    /// Current value of `name`; counters never incremented read as zero.
    #[must_use]
    pub fn get(&self, name: &str) -> u64 {
        self.values.get(name).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &Counters) {
        for (name, value) in &other.values {
            self.increment(*name, *value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.values.iter().map(|(name, value)| (*name, *value))
    }
}
