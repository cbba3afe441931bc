//! The function pool: explicit registration, temporal variant selection,
//! and synthesized derived functions.
//!
//! Every computation unit declares its output name and its input names up
//! front; the catalog is an immutable name→descriptor table built once per
//! policy date. No runtime reflection is involved.

pub mod catalog;
pub mod derived;
pub mod descriptor;
pub mod temporal;

pub use catalog::FunctionCatalog;
pub use derived::{synthesize_functions, AggregationSpec, TimeUnit};
pub use descriptor::{
    FormulaError, FormulaFn, Invocation, PolicyFunction, Provenance, PARAMS_SUFFIX,
};
pub use temporal::{select_for_date, DateWindow};
