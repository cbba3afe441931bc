//! The dependency graph over variable names.

pub mod builder;
pub mod dag;
pub mod trace;

pub use builder::{build_execution_plan, ExecutionPlan};
pub use dag::{DependencyDag, NodeRole, VarNode};
pub use trace::format_trace;
