//! Policy environments: one date's law, resolved and ready to execute.
//!
//! A `PolicySpec` is the declarative description of a policy system — the
//! function catalog with all temporal variants, the parameter histories,
//! aggregation specs, and engine configuration. `set_up_policy_environment`
//! freezes it for one policy date: parameters resolved, one function per
//! logical name.

use crate::config::EngineConfig;
use crate::dates::DateInput;
use crate::error::EngineError;
use crate::params::{ParamHistories, Params};
use crate::registry::{AggregationSpec, FunctionCatalog, PolicyFunction};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// The declarative description of a policy system, date-independent.
#[derive(Debug, Clone, Default)]
pub struct PolicySpec {
    pub catalog: FunctionCatalog,
    pub histories: ParamHistories,
    pub aggregations: Vec<AggregationSpec>,
    pub config: EngineConfig,
}

/// One policy date's law: resolved parameters and temporally selected
/// functions. Owns no caller data; build one per date and reuse it across
/// `compute` calls.
#[derive(Debug, Clone)]
pub struct PolicyEnvironment {
    pub date: NaiveDate,
    pub params: Params,
    pub functions: BTreeMap<String, PolicyFunction>,
    pub aggregations: Vec<AggregationSpec>,
    pub config: EngineConfig,
}

/// Normalizes the date input (year, ISO string, or date) and resolves the
/// spec for it.
pub fn set_up_policy_environment(
    date: impl Into<DateInput>,
    spec: &PolicySpec,
) -> Result<PolicyEnvironment, EngineError> {
    let date = date.into().resolve()?;
    debug!(%date, "setting up policy environment");

    let params = spec.histories.resolve(date)?;
    let functions = spec.catalog.select_for_date(date)?;

    Ok(PolicyEnvironment {
        date,
        params,
        functions,
        aggregations: spec.aggregations.clone(),
        config: spec.config.clone(),
    })
}
