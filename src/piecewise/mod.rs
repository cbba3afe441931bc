//! Bracket/tariff schedules: piecewise polynomials with configurable degree.
//!
//! Tax tariffs are written in law as bracket tables. This module evaluates
//! such tables (`PiecewiseSchedule`) and builds them from the redundant,
//! author-facing form found in parameter files (`derive_schedule`), deriving
//! missing intercepts bracket by bracket so the resulting function is
//! continuous at every boundary.

pub mod derive;
pub mod schedule;

pub use derive::{derive_schedule, ProgressionMode, RawInterval};
pub use schedule::{PiecewiseError, PiecewiseSchedule};
