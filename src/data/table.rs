//! The validated input table.
//!
//! Validation runs like a linter, before any graph work: it checks the
//! structural invariants the engine relies on (unique `p_id`, grouping ids
//! present, group-suffixed columns constant within their group, sane foreign
//! keys) and reports the first violation with the offending column named.

use crate::config::GroupingConfig;
use crate::data::column::{Column, DType};
use crate::error::{EngineError, SpecificationError};
use std::collections::{HashMap, HashSet};

/// Foreign-key columns reference another person's `p_id`; this sentinel
/// marks "no such person" (e.g. a missing second parent).
pub const MISSING_P_ID: i64 = -1;

/// A name→column mapping with a stable column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    n_rows: usize,
    names: Vec<String>,
    columns: HashMap<String, Column>,
}

impl DataTable {
    /// Builds a table, rejecting duplicate names and ragged columns.
    pub fn new<N, I>(columns: I) -> Result<Self, SpecificationError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Column)>,
    {
        let mut table = Self::default();
        for (name, column) in columns {
            table.push(name.into(), column)?;
        }
        Ok(table)
    }

    pub(crate) fn push(
        &mut self,
        name: String,
        column: Column,
    ) -> Result<(), SpecificationError> {
        if self.columns.contains_key(&name) {
            return Err(SpecificationError::DuplicateColumn { column: name });
        }
        if self.names.is_empty() {
            self.n_rows = column.len();
        } else if column.len() != self.n_rows {
            return Err(SpecificationError::ColumnLengthMismatch {
                column: name,
                len: column.len(),
                expected: self.n_rows,
            });
        }
        self.names.push(name.clone());
        self.columns.insert(name, column);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// An integer view of a column, applying the safe-conversion contract.
    pub(crate) fn int_column(&self, name: &str) -> Result<Vec<i64>, EngineError> {
        let column = self
            .get(name)
            .ok_or_else(|| SpecificationError::MissingGroupingColumn {
                column: name.to_string(),
            })?;
        let coerced = column.coerce(DType::Int, name)?;
        Ok(coerced.ints().expect("BUG: coerce(Int) must yield ints").to_vec())
    }

    /// Runs all structural input checks for the configured grouping levels.
    pub fn validate(&self, config: &GroupingConfig) -> Result<(), EngineError> {
        // p_id: present, integer, unique.
        if !self.contains("p_id") {
            return Err(SpecificationError::MissingPersonId.into());
        }
        let p_ids = self.int_column("p_id")?;
        let mut seen = HashSet::with_capacity(p_ids.len());
        for &id in &p_ids {
            if !seen.insert(id) {
                return Err(SpecificationError::NonUniquePersonId { id }.into());
            }
        }

        // Grouping ids: present, integer; group-suffixed columns constant
        // within their group.
        for level in config.levels() {
            let id_column = config.id_column(level);
            let group_ids = self.int_column(&id_column)?;
            let suffix = config.suffix(level);

            for name in self.names() {
                if !name.ends_with(&suffix) || name == id_column {
                    continue;
                }
                let column = &self.columns[name];
                if let Some(group_id) = first_inconstant_group(&group_ids, column) {
                    return Err(SpecificationError::GroupConstancyViolation {
                        column: name.to_string(),
                        suffix: suffix.clone(),
                        group_id,
                    }
                    .into());
                }
            }
        }

        // Foreign keys: every p_id_* column points at an existing person
        // and never at its own row.
        for name in self.names() {
            if !name.starts_with("p_id_") {
                continue;
            }
            let links = self.int_column(name)?;
            for (row, &target) in links.iter().enumerate() {
                if target == MISSING_P_ID {
                    continue;
                }
                if target == p_ids[row] {
                    return Err(SpecificationError::SelfReferencingForeignKey {
                        column: name.to_string(),
                        target,
                        row,
                    }
                    .into());
                }
                if !seen.contains(&target) {
                    return Err(SpecificationError::DanglingForeignKey {
                        column: name.to_string(),
                        target,
                        row,
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}

/// The first group in which `column` takes more than one value, if any.
fn first_inconstant_group(group_ids: &[i64], column: &Column) -> Option<i64> {
    fn check<T: PartialEq + Copy>(group_ids: &[i64], values: &[T]) -> Option<i64> {
        let mut first_seen: HashMap<i64, T> = HashMap::new();
        for (&group, &value) in group_ids.iter().zip(values) {
            match first_seen.get(&group) {
                None => {
                    first_seen.insert(group, value);
                }
                Some(&expected) if expected != value => return Some(group),
                Some(_) => {}
            }
        }
        None
    }

    match column {
        Column::Bool(v) => check(group_ids, v),
        Column::Int(v) => check(group_ids, v),
        Column::Float(v) => check(group_ids, v),
    }
}
