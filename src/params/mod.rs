//! Policy parameters with temporal versioning.
//!
//! Parameter files record the full history of law changes as date-keyed
//! version entries. `ParamHistories` is that declarative record;
//! `ParamHistories::resolve` walks it for a concrete policy date and
//! produces immutable `ParamGroup` trees in which every leaf is a concrete
//! number, nested map, or materialized bracket schedule.

pub mod history;
pub mod loader;
pub mod value;

pub use history::{Deviation, GroupHistory, ParamHistories, ParameterHistory, RawValue, VersionEntry};
pub use loader::ParamError;
pub use value::{ParamGroup, ParamValue, Params, RoundingDirection, RoundingSpec};
