//! Generic reduce-then-broadcast primitives over grouping levels.
//!
//! Aggregation maps each group key to a contiguous code, reduces into a
//! dense per-group buffer, and gathers back into one value per original row.
//! A second family aggregates by foreign key (`p_id` link) instead of by
//! partition.

pub mod index;
pub mod link;
pub mod reduce;

pub use index::GroupIndex;
pub use link::aggregate_by_p_id;
pub use reduce::{aggregate_by_group, AggregationError, GroupReducer};
