//! Synthesized functions: time-unit conversions and group aggregations.
//!
//! Both families are folded into the active function pool before the graph
//! is built, so the DAG builder never distinguishes them from hand-written
//! functions. Synthesis only ever fills referenced-but-undefined names;
//! explicit aggregation specs beat the automatic sum fallback, and a
//! registered function beats both.

use crate::config::GroupingConfig;
use crate::data::{Column, DType};
use crate::error::SpecificationError;
use crate::groups::{aggregate_by_group, aggregate_by_p_id, GroupIndex, GroupReducer};
use crate::registry::descriptor::{FormulaError, Invocation, PolicyFunction, Provenance};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

/// The time units variable names can carry as a trailing suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Year,
    Month,
    Week,
    Day,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 4] = [
        TimeUnit::Year,
        TimeUnit::Month,
        TimeUnit::Week,
        TimeUnit::Day,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Year => "_y",
            TimeUnit::Month => "_m",
            TimeUnit::Week => "_w",
            TimeUnit::Day => "_d",
        }
    }

    /// Fixed conversion-factor table, anchored on a 365.25-day year.
    pub fn periods_per_year(self) -> f64 {
        match self {
            TimeUnit::Year => 1.0,
            TimeUnit::Month => 12.0,
            TimeUnit::Week => 365.25 / 7.0,
            TimeUnit::Day => 365.25,
        }
    }
}

/// Splits a trailing time-unit suffix off a variable name.
fn split_time_suffix(name: &str) -> Option<(&str, TimeUnit)> {
    TimeUnit::ALL.iter().find_map(|&unit| {
        name.strip_suffix(unit.suffix())
            .filter(|prefix| !prefix.is_empty())
            .map(|prefix| (prefix, unit))
    })
}

/// An explicit aggregation declaration. `link` selects foreign-key
/// aggregation (the named `p_id_*` column); otherwise the grouping level is
/// read off the target's suffix.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AggregationSpec {
    pub target: String,
    /// Absent only for `count`.
    #[serde(default)]
    pub source: Option<String>,
    pub reducer: GroupReducer,
    #[serde(default)]
    pub link: Option<String>,
}

/// Folds explicit aggregation specs and auto-derived functions into
/// `active` until nothing referenced-but-undefined remains derivable.
pub fn synthesize_functions(
    active: &mut BTreeMap<String, PolicyFunction>,
    targets: &[String],
    specs: &[AggregationSpec],
    config: &GroupingConfig,
    data_columns: &HashSet<String>,
) -> Result<(), SpecificationError> {
    for spec in specs {
        if active.contains_key(&spec.target) {
            debug!(target = %spec.target, "explicit function wins over aggregation spec");
            continue;
        }
        let function = match &spec.link {
            Some(link) => link_aggregation(spec, link),
            None => {
                let level = config.level_of(&spec.target).ok_or_else(|| {
                    SpecificationError::UnknownAggregationLevel {
                        name: spec.target.clone(),
                    }
                })?;
                group_aggregation(&spec.target, spec.source.clone(), spec.reducer, config, level)
            }
        };
        active.insert(spec.target.clone(), function);
    }

    // Auto-derivation runs to a fixpoint: an aggregation synthesized in one
    // round may reference a base variable that itself needs a time-unit
    // conversion in the next.
    loop {
        let referenced = referenced_names(active, targets);
        let mut changed = false;

        for name in referenced {
            if active.contains_key(&name) || data_columns.contains(&name) {
                continue;
            }

            if let Some(conversion) = derive_time_conversion(&name, active, data_columns) {
                debug!(name = %name, "synthesized time-unit conversion");
                active.insert(name.clone(), conversion);
                changed = true;
                continue;
            }

            if let Some(level) = config.level_of(&name) {
                let base = config.base_variable(&name, level).to_string();
                let mut base_defined =
                    active.contains_key(&base) || data_columns.contains(&base);
                if !base_defined {
                    if let Some(conversion) = derive_time_conversion(&base, active, data_columns)
                    {
                        debug!(name = %base, "synthesized time-unit conversion");
                        active.insert(base.clone(), conversion);
                        base_defined = true;
                    }
                }
                if base_defined {
                    debug!(name = %name, source = %base, "synthesized sum aggregation");
                    let function = group_aggregation(
                        &name,
                        Some(base),
                        GroupReducer::Sum,
                        config,
                        level,
                    );
                    active.insert(name, function);
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(());
        }
    }
}

/// Every variable name the current pool or the caller asks for.
fn referenced_names(
    active: &BTreeMap<String, PolicyFunction>,
    targets: &[String],
) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = targets.iter().cloned().collect();
    for function in active.values() {
        names.extend(function.data_args().map(|(arg, _)| arg.to_string()));
    }
    names
}

fn group_aggregation(
    target: &str,
    source: Option<String>,
    reducer: GroupReducer,
    config: &GroupingConfig,
    level: &str,
) -> PolicyFunction {
    let provenance = Provenance::GroupAggregation {
        source: source.clone(),
        level: level.to_string(),
        reducer,
    };
    let id_column = config.id_column(level);
    let mut args: Vec<&str> = Vec::new();
    if let Some(source) = source.as_deref() {
        args.push(source);
    }
    args.push(&id_column);

    let has_source = source.is_some();
    let body = move |invocation: &Invocation| -> Result<Column, FormulaError> {
        let (values, ids_at) = if has_source {
            (Some(invocation.column(0)), 1)
        } else {
            (None, 0)
        };
        let index = GroupIndex::from_ids(invocation.ints(ids_at)?);
        Ok(aggregate_by_group(values, &index, reducer)?)
    };

    let ids_at = if has_source { 1 } else { 0 };
    PolicyFunction::new(target, &args, body)
        .arg_dtype(ids_at, DType::Int)
        .with_provenance(provenance)
}

fn link_aggregation(spec: &AggregationSpec, link: &str) -> PolicyFunction {
    let mut args: Vec<&str> = Vec::new();
    if let Some(source) = spec.source.as_deref() {
        args.push(source);
    }
    args.push(link);
    args.push("p_id");

    let has_source = spec.source.is_some();
    let reducer = spec.reducer;
    let body = move |invocation: &Invocation| -> Result<Column, FormulaError> {
        let (values, link_at) = if has_source {
            (Some(invocation.column(0)), 1)
        } else {
            (None, 0)
        };
        let link_ids = invocation.ints(link_at)?;
        let p_ids = invocation.ints(link_at + 1)?;
        Ok(aggregate_by_p_id(values, link_ids, p_ids, reducer)?)
    };

    let link_at = if has_source { 1 } else { 0 };
    PolicyFunction::new(spec.target.as_str(), &args, body)
        .arg_dtype(link_at, DType::Int)
        .arg_dtype(link_at + 1, DType::Int)
        .with_provenance(Provenance::LinkAggregation {
            source: spec.source.clone(),
            link: link.to_string(),
            reducer,
        })
}

/// A scaling function for a missing time-unit variant of an existing
/// variable, if one exists to convert from.
fn derive_time_conversion(
    name: &str,
    active: &BTreeMap<String, PolicyFunction>,
    data_columns: &HashSet<String>,
) -> Option<PolicyFunction> {
    let (prefix, target_unit) = split_time_suffix(name)?;

    for source_unit in TimeUnit::ALL {
        if source_unit == target_unit {
            continue;
        }
        let candidate = format!("{prefix}{}", source_unit.suffix());
        if !active.contains_key(&candidate) && !data_columns.contains(&candidate) {
            continue;
        }
        let factor = source_unit.periods_per_year() / target_unit.periods_per_year();
        let body = move |invocation: &Invocation| -> Result<Column, FormulaError> {
            let values = invocation.column(0).to_floats();
            Ok(Column::from_floats(
                values.into_iter().map(|v| v * factor).collect(),
            ))
        };
        return Some(
            PolicyFunction::new(name, &[candidate.as_str()], body).with_provenance(
                Provenance::TimeConversion {
                    source: candidate.clone(),
                },
            ),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(function: &PolicyFunction, columns: &[Column], n_rows: usize) -> Column {
        let invocation = Invocation::new(columns, &[], n_rows);
        function.call(&invocation).unwrap()
    }

    fn config() -> GroupingConfig {
        GroupingConfig::new(["hh"])
    }

    fn pool(names: &[&str]) -> BTreeMap<String, PolicyFunction> {
        names
            .iter()
            .map(|&name| {
                (
                    name.to_string(),
                    PolicyFunction::new(name, &[], |_| Ok(Column::from_floats(vec![]))),
                )
            })
            .collect()
    }

    #[test]
    fn test_auto_sum_for_referenced_group_suffix() {
        let mut active = pool(&["einkommen_m"]);
        let targets = vec!["einkommen_m_hh".to_string()];
        synthesize_functions(&mut active, &targets, &[], &config(), &HashSet::new()).unwrap();

        let synthesized = &active["einkommen_m_hh"];
        let args: Vec<_> = synthesized.args().collect();
        assert_eq!(args, vec!["einkommen_m", "hh_id"]);

        let out = call(
            synthesized,
            &[
                Column::from_floats(vec![10.0, 20.0, 5.0]),
                Column::from_ints(vec![1, 1, 2]),
            ],
            3,
        );
        assert_eq!(out.floats().unwrap(), &[30.0, 30.0, 5.0]);
    }

    #[test]
    fn test_unreferenced_names_are_not_synthesized() {
        let mut active = pool(&["einkommen_m"]);
        synthesize_functions(&mut active, &[], &[], &config(), &HashSet::new()).unwrap();
        assert!(!active.contains_key("einkommen_m_hh"));
    }

    #[test]
    fn test_explicit_spec_beats_auto_sum() {
        let mut active = pool(&["arbeitslos"]);
        let targets = vec!["arbeitslos_hh".to_string()];
        let specs = vec![AggregationSpec {
            target: "arbeitslos_hh".into(),
            source: Some("arbeitslos".into()),
            reducer: GroupReducer::Any,
            link: None,
        }];
        synthesize_functions(&mut active, &targets, &specs, &config(), &HashSet::new()).unwrap();

        let out = call(
            &active["arbeitslos_hh"],
            &[
                Column::from_bools(vec![false, true, false]),
                Column::from_ints(vec![1, 1, 2]),
            ],
            3,
        );
        // Any, not the default sum.
        assert_eq!(out.bools().unwrap(), &[true, true, false]);
    }

    #[test]
    fn test_registered_function_beats_spec() {
        let mut active = pool(&["sonderwert_hh"]);
        let specs = vec![AggregationSpec {
            target: "sonderwert_hh".into(),
            source: Some("sonderwert".into()),
            reducer: GroupReducer::Sum,
            link: None,
        }];
        synthesize_functions(
            &mut active,
            &["sonderwert_hh".to_string()],
            &specs,
            &config(),
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(active["sonderwert_hh"].provenance(), &Provenance::Registered);
    }

    #[test]
    fn test_time_conversion_yearly_to_monthly() {
        let mut active = pool(&["rente_y"]);
        let targets = vec!["rente_m".to_string()];
        synthesize_functions(&mut active, &targets, &[], &config(), &HashSet::new()).unwrap();

        let out = call(&active["rente_m"], &[Column::from_floats(vec![1200.0])], 1);
        assert_eq!(out.floats().unwrap(), &[100.0]);
    }

    #[test]
    fn test_chained_conversion_and_aggregation() {
        // x_m_hh is requested; only x_y exists. The aggregation pulls in a
        // conversion for its base variable.
        let mut active = pool(&["x_y"]);
        let targets = vec!["x_m_hh".to_string()];
        synthesize_functions(&mut active, &targets, &[], &config(), &HashSet::new()).unwrap();
        assert!(active.contains_key("x_m"));
        assert!(active.contains_key("x_m_hh"));
    }

    #[test]
    fn test_spec_without_group_suffix_is_rejected() {
        let mut active = pool(&[]);
        let specs = vec![AggregationSpec {
            target: "kinder_anzahl".into(),
            source: None,
            reducer: GroupReducer::Count,
            link: None,
        }];
        let err = synthesize_functions(&mut active, &[], &specs, &config(), &HashSet::new())
            .unwrap_err();
        assert!(matches!(err, SpecificationError::UnknownAggregationLevel { .. }));
    }

    #[test]
    fn test_link_aggregation_spec() {
        let mut active = pool(&[]);
        let specs = vec![AggregationSpec {
            target: "kindergeld_kind_summe_m".into(),
            source: Some("kindergeld_anspruch_m".into()),
            reducer: GroupReducer::Sum,
            link: Some("p_id_kindergeld_empf".into()),
        }];
        synthesize_functions(&mut active, &[], &specs, &config(), &HashSet::new()).unwrap();

        let function = &active["kindergeld_kind_summe_m"];
        let args: Vec<_> = function.args().collect();
        assert_eq!(
            args,
            vec!["kindergeld_anspruch_m", "p_id_kindergeld_empf", "p_id"]
        );
        let out = call(
            function,
            &[
                Column::from_floats(vec![0.0, 219.0, 219.0]),
                Column::from_ints(vec![-1, 1, 1]),
                Column::from_ints(vec![1, 2, 3]),
            ],
            3,
        );
        assert_eq!(out.floats().unwrap(), &[438.0, 0.0, 0.0]);
    }
}
