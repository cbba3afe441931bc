//! Crate-level error taxonomy.
//!
//! Structural problems (a target nobody can produce, a missing input column,
//! a cycle in the formula library) are `SpecificationError`s and always abort
//! a call before or during setup. Failures inside a formula body are
//! `FormulaError`s and are the only kind that debug mode isolates. The
//! `EngineError` umbrella is what the public entry points return.

use crate::data::ConversionError;
use crate::dates::DateError;
use crate::params::ParamError;
use crate::piecewise::PiecewiseError;
use crate::registry::FormulaError;
use chrono::NaiveDate;
use thiserror::Error;

/// A structural defect in the call specification: wrong targets, wrong data,
/// or an inconsistent formula library. Always fatal, never isolated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpecificationError {
    #[error("target '{name}' is neither produced by any function nor present in the input data")]
    UnknownTarget { name: String },

    #[error("no targets requested and the policy environment declares no default targets")]
    NoTargets,

    #[error("input column '{column}' is required by {required_by:?} but missing from the data")]
    MissingInputColumn {
        column: String,
        required_by: Vec<String>,
    },

    #[error("duplicate input column '{column}'")]
    DuplicateColumn { column: String },

    #[error("input column '{column}' has {len} rows, expected {expected}")]
    ColumnLengthMismatch {
        column: String,
        len: usize,
        expected: usize,
    },

    #[error("column 'p_id' is missing from the input data")]
    MissingPersonId,

    #[error("column 'p_id' contains duplicate id {id}")]
    NonUniquePersonId { id: i64 },

    #[error("grouping column '{column}' is missing from the input data")]
    MissingGroupingColumn { column: String },

    #[error(
        "column '{column}' carries the '{suffix}' group suffix but is not constant \
         within group {group_id}"
    )]
    GroupConstancyViolation {
        column: String,
        suffix: String,
        group_id: i64,
    },

    #[error("foreign-key column '{column}' points to unknown p_id {target} at row {row}")]
    DanglingForeignKey {
        column: String,
        target: i64,
        row: usize,
    },

    #[error("foreign-key column '{column}' references its own row (p_id {target}) at row {row}")]
    SelfReferencingForeignKey {
        column: String,
        target: i64,
        row: usize,
    },

    #[error(
        "override column '{column}' is not used by anything in the pruned graph \
         (set check_minimal_specification to \"ignore\" to allow this)"
    )]
    UnusedOverride { column: String },

    #[error(
        "input column '{column}' is not used by anything in the pruned graph \
         (set check_minimal_specification to \"ignore\" to allow this)"
    )]
    UnusedInputColumn { column: String },

    #[error("override '{column}' was requested explicitly but no such data column exists")]
    OverrideColumnMissing { column: String },

    #[error("no variant of function '{name}' is active on {date}")]
    NoActiveVariant { name: String, date: NaiveDate },

    #[error("multiple variants of function '{name}' are active on {date}")]
    AmbiguousVariant { name: String, date: NaiveDate },

    #[error("the validity windows of two '{name}' variants overlap")]
    OverlappingWindows { name: String },

    #[error("cycle detected in the dependency graph involving '{name}'")]
    Cycle { name: String },

    #[error("aggregation target '{name}' carries no configured grouping suffix")]
    UnknownAggregationLevel { name: String },

    #[error(
        "function '{function}' must be rounded but parameter group '{group}' \
         provides no rounding spec for it"
    )]
    MissingRoundingSpec { function: String, group: String },

    #[error("function '{function}': rounding base must be positive, got {base}")]
    InvalidRoundingBase { function: String, base: f64 },

    #[error("function '{function}' returned {len} rows, expected {expected}")]
    FormulaOutputLength {
        function: String,
        len: usize,
        expected: usize,
    },
}

/// Everything a public entry point can fail with.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Specification(#[from] SpecificationError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Params(#[from] ParamError),

    #[error(transparent)]
    Piecewise(#[from] PiecewiseError),

    #[error(transparent)]
    Date(#[from] DateError),

    #[error("function '{function}' failed: {source}")]
    Formula {
        function: String,
        source: FormulaError,
    },
}
