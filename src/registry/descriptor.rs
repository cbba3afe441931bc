//! Function descriptors: the named, pure computation units of the engine.

use crate::data::{Column, ConversionError, DType};
use crate::groups::AggregationError;
use crate::groups::GroupReducer;
use crate::params::{ParamError, ParamGroup};
use crate::piecewise::PiecewiseError;
use crate::registry::temporal::DateWindow;
use chrono::NaiveDate;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Arguments carrying this suffix name a parameter group instead of a
/// variable. They never become graph nodes; the engine binds the resolved
/// group at call time.
pub const PARAMS_SUFFIX: &str = "_params";

/// An error raised inside a formula body. This is the only error kind debug
/// mode isolates; everything structural lives in `SpecificationError`.
#[derive(Error, Debug)]
pub enum FormulaError {
    #[error("{message}")]
    Failed { message: String },

    #[error("argument {index} has dtype {got:?}, expected {expected:?}")]
    ArgumentDType {
        index: usize,
        expected: DType,
        got: DType,
    },

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Piecewise(#[from] PiecewiseError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl FormulaError {
    pub fn failed(message: impl Into<String>) -> Self {
        FormulaError::Failed {
            message: message.into(),
        }
    }
}

/// The resolved inputs of one function call: data columns in declared order
/// (parameter-group arguments removed) and the bound parameter groups in
/// declared order.
pub struct Invocation<'a> {
    columns: &'a [Column],
    params: &'a [&'a ParamGroup],
    n_rows: usize,
}

impl<'a> Invocation<'a> {
    pub fn new(columns: &'a [Column], params: &'a [&'a ParamGroup], n_rows: usize) -> Self {
        Self {
            columns,
            params,
            n_rows,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn floats(&self, index: usize) -> Result<&[f64], FormulaError> {
        self.columns[index]
            .floats()
            .ok_or_else(|| self.dtype_error(index, DType::Float))
    }

    pub fn ints(&self, index: usize) -> Result<&[i64], FormulaError> {
        self.columns[index]
            .ints()
            .ok_or_else(|| self.dtype_error(index, DType::Int))
    }

    pub fn bools(&self, index: usize) -> Result<&[bool], FormulaError> {
        self.columns[index]
            .bools()
            .ok_or_else(|| self.dtype_error(index, DType::Bool))
    }

    pub fn group(&self, index: usize) -> &ParamGroup {
        self.params[index]
    }

    fn dtype_error(&self, index: usize, expected: DType) -> FormulaError {
        FormulaError::ArgumentDType {
            index,
            expected,
            got: self.columns[index].dtype(),
        }
    }
}

pub type FormulaFn = Arc<dyn Fn(&Invocation) -> Result<Column, FormulaError> + Send + Sync>;

/// Where a function came from. Synthesized functions behave exactly like
/// registered ones; provenance exists for diagnostics and the dependency
/// trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Registered,
    TimeConversion {
        source: String,
    },
    GroupAggregation {
        source: Option<String>,
        level: String,
        reducer: GroupReducer,
    },
    LinkAggregation {
        source: Option<String>,
        link: String,
        reducer: GroupReducer,
    },
}

/// A named, pure computation: one output variable, computed from other
/// variables and parameter groups.
#[derive(Clone)]
pub struct PolicyFunction {
    name: String,
    args: SmallVec<[String; 4]>,
    arg_types: SmallVec<[Option<DType>; 4]>,
    window: DateWindow,
    rounding_group: Option<String>,
    provenance: Provenance,
    func: FormulaFn,
}

impl fmt::Debug for PolicyFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyFunction")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("window", &self.window)
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

impl PolicyFunction {
    pub fn new<F>(name: impl Into<String>, args: &[&str], func: F) -> Self
    where
        F: Fn(&Invocation) -> Result<Column, FormulaError> + Send + Sync + 'static,
    {
        let args: SmallVec<[String; 4]> = args.iter().map(|a| a.to_string()).collect();
        let arg_types = args.iter().map(|_| None).collect();
        Self {
            name: name.into(),
            args,
            arg_types,
            window: DateWindow::default(),
            rounding_group: None,
            provenance: Provenance::Registered,
            func: Arc::new(func),
        }
    }

    /// First date (inclusive) on which this variant is in force.
    pub fn valid_from(mut self, date: NaiveDate) -> Self {
        self.window.start = Some(date);
        self
    }

    /// Last date (inclusive) on which this variant is in force.
    pub fn valid_until(mut self, date: NaiveDate) -> Self {
        self.window.end = Some(date);
        self
    }

    /// Declares the semantic dtype of one data argument; the engine coerces
    /// the incoming column under the safe-conversion contract before the
    /// call.
    pub fn arg_dtype(mut self, index: usize, dtype: DType) -> Self {
        self.arg_types[index] = Some(dtype);
        self
    }

    /// Flags this function as roundable; the named parameter group must
    /// carry a rounding spec for it.
    pub fn rounded_by(mut self, group: impl Into<String>) -> Self {
        self.rounding_group = Some(group.into());
        self
    }

    pub(crate) fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub(crate) fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All declared argument names, parameter groups included.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(String::as_str)
    }

    /// Data arguments (graph edges) with their declared dtypes.
    pub fn data_args(&self) -> impl Iterator<Item = (&str, Option<DType>)> {
        self.args
            .iter()
            .zip(&self.arg_types)
            .filter(|(name, _)| !name.ends_with(PARAMS_SUFFIX))
            .map(|(name, dtype)| (name.as_str(), *dtype))
    }

    /// Parameter groups this function binds, in declared order (suffix
    /// stripped).
    pub fn param_groups(&self) -> impl Iterator<Item = &str> {
        self.args
            .iter()
            .filter(|name| name.ends_with(PARAMS_SUFFIX))
            .map(|name| &name[..name.len() - PARAMS_SUFFIX.len()])
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    pub fn rounding_group(&self) -> Option<&str> {
        self.rounding_group.as_deref()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn call(&self, invocation: &Invocation) -> Result<Column, FormulaError> {
        (self.func)(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_args_exclude_parameter_groups() {
        let f = PolicyFunction::new(
            "kindergeld_m",
            &["kind_anz_tu", "kindergeld_params"],
            |_| Ok(Column::from_floats(vec![])),
        );
        let data: Vec<_> = f.data_args().map(|(name, _)| name.to_string()).collect();
        assert_eq!(data, vec!["kind_anz_tu"]);
        let groups: Vec<_> = f.param_groups().collect();
        assert_eq!(groups, vec!["kindergeld"]);
    }

    #[test]
    fn test_invocation_dtype_mismatch_names_the_argument() {
        let columns = [Column::from_ints(vec![1, 2])];
        let invocation = Invocation::new(&columns, &[], 2);
        let err = invocation.floats(0).unwrap_err();
        assert!(err.to_string().contains("argument 0"), "got: {err}");
        assert!(invocation.ints(0).is_ok());
    }
}
