//! A computation engine for tax-and-transfer policy simulation.
//!
//! Given a population of individuals grouped into households and tax units,
//! a policy date, and a set of requested output variables, the engine
//! resolves which functions are needed, builds the dependency graph from
//! argument names to output names, selects the time-period-specific variant
//! of each function, substitutes user-supplied override columns, executes
//! the graph topologically with aggregation across grouping levels, and
//! fails with actionable diagnostics when the call specification is
//! incomplete, contradictory, or redundant.
//!
//! The crate deliberately knows nothing about any concrete tax formula.
//! Formulas are opaque leaf computations registered against the engine:
//! each declares its output name (= its variable name) and its argument
//! names (= other variables' names or `*_params` parameter groups).
//!
//! ```
//! use fiskal_core::{
//!     compute, set_up_policy_environment, Column, ComputeOptions, DataTable,
//!     EngineConfig, FunctionCatalog, GroupingConfig, PolicyFunction, PolicySpec,
//! };
//!
//! let mut catalog = FunctionCatalog::new();
//! catalog.register(PolicyFunction::new(
//!     "nettolohn_m",
//!     &["bruttolohn_m"],
//!     |invocation| {
//!         let gross = invocation.floats(0)?;
//!         Ok(Column::from_floats(gross.iter().map(|v| v * 0.7).collect()))
//!     },
//! ));
//!
//! let spec = PolicySpec {
//!     catalog,
//!     config: EngineConfig {
//!         groupings: GroupingConfig::new(["hh"]),
//!         default_targets: vec!["nettolohn_m".to_string()],
//!     },
//!     ..PolicySpec::default()
//! };
//! let environment = set_up_policy_environment(2024, &spec).unwrap();
//!
//! let data = DataTable::new([
//!     ("p_id".to_string(), Column::from_ints(vec![1, 2])),
//!     ("hh_id".into(), Column::from_ints(vec![1, 1])),
//!     ("bruttolohn_m".into(), Column::from_floats(vec![3000.0, 1000.0])),
//! ])
//! .unwrap();
//!
//! let result = compute(&data, &environment, &ComputeOptions::default()).unwrap();
//! assert_eq!(
//!     result.get("nettolohn_m").unwrap().floats().unwrap(),
//!     &[2100.0, 700.0]
//! );
//! ```

pub mod config;
pub mod data;
pub mod dates;
pub mod engine;
pub mod environment;
pub mod error;
pub mod graph;
pub mod groups;
pub mod interface;
pub mod params;
pub mod piecewise;
pub mod registry;

pub use config::{EngineConfig, GroupingConfig, Strictness};
pub use data::{Column, ConversionError, DType, DataTable, MISSING_P_ID};
pub use dates::DateInput;
pub use environment::{set_up_policy_environment, PolicyEnvironment, PolicySpec};
pub use error::{EngineError, SpecificationError};
pub use groups::{
    aggregate_by_group, aggregate_by_p_id, AggregationError, GroupIndex, GroupReducer,
};
pub use interface::{compute, ComputeOptions};
pub use params::{
    ParamError, ParamGroup, ParamHistories, ParamValue, Params, RoundingDirection, RoundingSpec,
};
pub use piecewise::{derive_schedule, PiecewiseError, PiecewiseSchedule, ProgressionMode};
pub use registry::{
    AggregationSpec, FormulaError, FunctionCatalog, Invocation, PolicyFunction, Provenance,
    TimeUnit,
};
