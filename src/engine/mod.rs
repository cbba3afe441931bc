//! Topological execution of a pruned plan.

pub mod executor;
pub mod ledger;
pub mod rounding;

pub use executor::{execute_plan, ExecutionOutcome, SkipReason, SkippedNode};
pub use ledger::Ledger;
pub use rounding::apply_rounding;
