//! Column storage for one execution pass, with consumer accounting.
//!
//! Peak memory on large populations is bounded by dropping intermediate
//! columns once their last consumer has executed. The ledger owns that
//! bookkeeping: every node declares its consumer count up front, and
//! `consume` releases a column when the count reaches zero, unless the
//! column is protected (targets, or everything in debug mode).

use crate::data::Column;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct Ledger {
    columns: HashMap<String, Column>,
    remaining_consumers: HashMap<String, usize>,
    protected: HashSet<String>,
    keep_all: bool,
}

impl Ledger {
    /// With `keep_all`, nothing is ever dropped; debug mode wants every
    /// intermediate in the result.
    pub fn new(keep_all: bool) -> Self {
        Self {
            keep_all,
            ..Self::default()
        }
    }

    /// Exempts a column from garbage collection.
    pub fn protect(&mut self, name: &str) {
        self.protected.insert(name.to_string());
    }

    pub fn set_consumers(&mut self, name: &str, count: usize) {
        self.remaining_consumers.insert(name.to_string(), count);
    }

    pub fn insert(&mut self, name: &str, column: Column) {
        self.columns.insert(name.to_string(), column);
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Records that one consumer of `name` has executed; drops the column
    /// once the last one has.
    pub fn consume(&mut self, name: &str) {
        let Some(remaining) = self.remaining_consumers.get_mut(name) else {
            return;
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 && !self.keep_all && !self.protected.contains(name) {
            self.columns.remove(name);
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn into_columns(self) -> HashMap<String, Column> {
        self.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_dropped_after_last_consumer() {
        let mut ledger = Ledger::new(false);
        ledger.set_consumers("x", 2);
        ledger.insert("x", Column::from_floats(vec![1.0]));

        ledger.consume("x");
        assert!(ledger.contains("x"));
        ledger.consume("x");
        assert!(!ledger.contains("x"));
    }

    #[test]
    fn test_protected_columns_survive() {
        let mut ledger = Ledger::new(false);
        ledger.set_consumers("x", 1);
        ledger.protect("x");
        ledger.insert("x", Column::from_floats(vec![1.0]));
        ledger.consume("x");
        assert!(ledger.contains("x"));
    }

    #[test]
    fn test_keep_all_disables_collection() {
        let mut ledger = Ledger::new(true);
        ledger.set_consumers("x", 1);
        ledger.insert("x", Column::from_floats(vec![1.0]));
        ledger.consume("x");
        assert!(ledger.contains("x"));
    }
}
