//! The single topological pass over a pruned plan.
//!
//! Normal mode: the first formula failure aborts the whole call. Debug
//! mode: the failing node and its transitive descendants are marked skipped
//! and unrelated branches keep executing, so the partial result remains
//! usable for diagnosis. Only formula errors are isolated this way;
//! configuration problems (missing parameter group, missing rounding spec,
//! unsafe dtype conversion) abort in either mode.

use crate::data::{Column, DataTable};
use crate::engine::ledger::Ledger;
use crate::engine::rounding::apply_rounding;
use crate::error::{EngineError, SpecificationError};
use crate::graph::{ExecutionPlan, NodeRole};
use crate::params::{ParamGroup, Params};
use crate::registry::{FormulaError, Invocation};
use petgraph::stable_graph::NodeIndex;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("formula failed: {0}")]
    Failed(FormulaError),

    #[error("upstream node '{failed}' failed")]
    Upstream { failed: String },
}

/// A node debug mode did not compute, and why.
#[derive(Debug)]
pub struct SkippedNode {
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug)]
pub struct ExecutionOutcome {
    pub columns: HashMap<String, Column>,
    /// Empty outside debug mode.
    pub skipped: Vec<SkippedNode>,
}

pub fn execute_plan(
    plan: &ExecutionPlan,
    data: &DataTable,
    params: &Params,
    rounding: bool,
    debug_mode: bool,
) -> Result<ExecutionOutcome, EngineError> {
    let n_rows = data.n_rows();
    let mut ledger = Ledger::new(debug_mode);
    for &index in &plan.order {
        let node = plan.dag.node(index);
        ledger.set_consumers(&node.name, plan.dag.consumer_count(index));
    }
    for target in &plan.targets {
        ledger.protect(target);
    }

    let mut skipped_indices: HashSet<NodeIndex> = HashSet::new();
    let mut skipped: Vec<SkippedNode> = Vec::new();

    for &index in &plan.order {
        let node = plan.dag.node(index);

        if skipped_indices.contains(&index) {
            release_predecessors(plan, index, &mut ledger);
            continue;
        }

        let column = match node.role {
            // Overrides substitute the input column for the function; roots
            // are input columns by definition. Both were validated by the
            // builder.
            NodeRole::Input | NodeRole::Override => data
                .get(&node.name)
                .expect("BUG: root column validated by the builder")
                .clone(),

            NodeRole::Function => {
                let function = plan
                    .functions
                    .get(&node.name)
                    .expect("BUG: function node without a function");

                let mut groups: Vec<&ParamGroup> = Vec::new();
                for group_name in function.param_groups() {
                    groups.push(params.group(group_name)?);
                }

                let mut columns: Vec<Column> = Vec::new();
                for (arg, dtype) in function.data_args() {
                    let column = ledger
                        .get(arg)
                        .expect("BUG: predecessor executes before its consumer")
                        .clone();
                    let column = match dtype {
                        Some(want) => column.coerce(want, arg)?,
                        None => column,
                    };
                    columns.push(column);
                }

                let invocation = Invocation::new(&columns, &groups, n_rows);
                match function.call(&invocation) {
                    Ok(column) => {
                        if column.len() != n_rows {
                            return Err(SpecificationError::FormulaOutputLength {
                                function: node.name.clone(),
                                len: column.len(),
                                expected: n_rows,
                            }
                            .into());
                        }
                        round_if_configured(column, function.rounding_group(), &node.name, params, rounding)?
                    }
                    Err(error) if debug_mode => {
                        warn!(function = %node.name, %error, "formula failed; skipping its subtree");
                        mark_skipped(plan, index, error, &mut skipped_indices, &mut skipped);
                        release_predecessors(plan, index, &mut ledger);
                        continue;
                    }
                    Err(error) => {
                        return Err(EngineError::Formula {
                            function: node.name.clone(),
                            source: error,
                        })
                    }
                }
            }
        };

        ledger.insert(&node.name, column);
        release_predecessors(plan, index, &mut ledger);
    }

    debug!(
        computed = ledger.len(),
        skipped = skipped.len(),
        "execution pass finished"
    );
    Ok(ExecutionOutcome {
        columns: ledger.into_columns(),
        skipped,
    })
}

fn round_if_configured(
    column: Column,
    rounding_group: Option<&str>,
    function: &str,
    params: &Params,
    rounding: bool,
) -> Result<Column, EngineError> {
    let Some(group_name) = rounding_group else {
        return Ok(column);
    };
    if !rounding {
        return Ok(column);
    }
    let group = params.group(group_name)?;
    let spec = group
        .rounding_for(function)
        .ok_or_else(|| SpecificationError::MissingRoundingSpec {
            function: function.to_string(),
            group: group_name.to_string(),
        })?;
    Ok(apply_rounding(&column, spec, function)?)
}

/// Marks `index` and everything downstream of it as skipped.
fn mark_skipped(
    plan: &ExecutionPlan,
    index: NodeIndex,
    error: FormulaError,
    skipped_indices: &mut HashSet<NodeIndex>,
    skipped: &mut Vec<SkippedNode>,
) {
    let failed_name = plan.dag.node(index).name.clone();
    let mut error = Some(error);
    for descendant in plan.dag.descendants(&[index]) {
        if !skipped_indices.insert(descendant) {
            continue;
        }
        let name = plan.dag.node(descendant).name.clone();
        let reason = if descendant == index {
            SkipReason::Failed(error.take().expect("BUG: failing node visited twice"))
        } else {
            SkipReason::Upstream {
                failed: failed_name.clone(),
            }
        };
        skipped.push(SkippedNode { name, reason });
    }
}

/// GC step: a predecessor whose consumers have all executed is released.
fn release_predecessors(plan: &ExecutionPlan, index: NodeIndex, ledger: &mut Ledger) {
    for predecessor in plan.dag.predecessors(index) {
        ledger.consume(&plan.dag.node(predecessor).name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GroupingConfig, Strictness};
    use crate::graph::build_execution_plan;
    use crate::registry::PolicyFunction;
    use std::collections::BTreeMap;

    fn passthrough(name: &str, arg: &str) -> PolicyFunction {
        PolicyFunction::new(name, &[arg], |invocation: &Invocation| {
            Ok(invocation.column(0).clone())
        })
    }

    fn failing(name: &str, arg: &str) -> PolicyFunction {
        PolicyFunction::new(name, &[arg], |_| {
            Err(FormulaError::failed("deliberate test failure"))
        })
    }

    fn plan_for(
        functions: BTreeMap<String, PolicyFunction>,
        data: &DataTable,
        targets: &[&str],
    ) -> ExecutionPlan {
        let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
        build_execution_plan(
            &functions,
            &[],
            &GroupingConfig::new(["hh"]),
            data,
            &targets,
            None,
            Strictness::Ignore,
        )
        .unwrap()
    }

    fn data_with_a() -> DataTable {
        DataTable::new([("a".to_string(), Column::from_floats(vec![1.0, 2.0]))]).unwrap()
    }

    /// a -> b -> c, d independent of the failing chain.
    fn partial_failure_functions() -> BTreeMap<String, PolicyFunction> {
        BTreeMap::from([
            ("b".to_string(), failing("b", "a")),
            ("c".to_string(), passthrough("c", "b")),
            ("d".to_string(), passthrough("d", "a")),
        ])
    }

    #[test]
    fn test_normal_mode_aborts_on_failure() {
        let data = data_with_a();
        let plan = plan_for(partial_failure_functions(), &data, &["c", "d"]);
        let err = execute_plan(&plan, &data, &Params::default(), true, false).unwrap_err();
        match err {
            EngineError::Formula { function, .. } => assert_eq!(function, "b"),
            other => panic!("expected a formula error, got {other}"),
        }
    }

    #[test]
    fn test_debug_mode_isolates_the_failing_subtree() {
        let data = data_with_a();
        let plan = plan_for(partial_failure_functions(), &data, &["c", "d"]);
        let outcome = execute_plan(&plan, &data, &Params::default(), true, true).unwrap();

        // The unrelated branch still computed.
        assert_eq!(outcome.columns["d"].floats().unwrap(), &[1.0, 2.0]);
        // The failing node and its descendant did not.
        assert!(!outcome.columns.contains_key("b"));
        assert!(!outcome.columns.contains_key("c"));

        let skipped: Vec<&str> = outcome.skipped.iter().map(|s| s.name.as_str()).collect();
        assert!(skipped.contains(&"b"));
        assert!(skipped.contains(&"c"));
        let b = outcome.skipped.iter().find(|s| s.name == "b").unwrap();
        assert!(matches!(b.reason, SkipReason::Failed(_)));
        let c = outcome.skipped.iter().find(|s| s.name == "c").unwrap();
        assert!(matches!(c.reason, SkipReason::Upstream { .. }));
    }

    #[test]
    fn test_intermediates_are_collected_targets_survive() {
        let functions = BTreeMap::from([
            ("b".to_string(), passthrough("b", "a")),
            ("c".to_string(), passthrough("c", "b")),
        ]);
        let data = data_with_a();
        let plan = plan_for(functions, &data, &["c"]);
        let outcome = execute_plan(&plan, &data, &Params::default(), true, false).unwrap();

        assert!(outcome.columns.contains_key("c"));
        // a and b were intermediates; both were released after their last
        // consumer.
        assert!(!outcome.columns.contains_key("a"));
        assert!(!outcome.columns.contains_key("b"));
    }

    #[test]
    fn test_override_idempotence() {
        // Supplying a column matching the function's correct output changes
        // nothing about the result.
        let functions = BTreeMap::from([
            ("b".to_string(), passthrough("b", "a")),
            ("c".to_string(), passthrough("c", "b")),
        ]);
        let data = data_with_a();
        let plan = plan_for(functions.clone(), &data, &["c"]);
        let computed = execute_plan(&plan, &data, &Params::default(), true, false).unwrap();

        let overridden_data = DataTable::new([
            ("a".to_string(), Column::from_floats(vec![1.0, 2.0])),
            ("b".to_string(), Column::from_floats(vec![1.0, 2.0])),
        ])
        .unwrap();
        let plan = plan_for(functions, &overridden_data, &["c"]);
        let overridden =
            execute_plan(&plan, &overridden_data, &Params::default(), true, false).unwrap();

        assert_eq!(computed.columns["c"], overridden.columns["c"]);
    }

    #[test]
    fn test_missing_rounding_spec_is_a_call_time_error() {
        let functions = BTreeMap::from([(
            "b".to_string(),
            passthrough("b", "a").rounded_by("kindergeld"),
        )]);
        let data = data_with_a();
        let plan = plan_for(functions, &data, &["b"]);
        let err = execute_plan(&plan, &data, &Params::default(), true, false).unwrap_err();
        // The group itself is missing here, which is just as much a
        // configuration error.
        assert!(matches!(err, EngineError::Params(_)));
    }

    #[test]
    fn test_rounding_disabled_skips_the_lookup() {
        let functions = BTreeMap::from([(
            "b".to_string(),
            passthrough("b", "a").rounded_by("kindergeld"),
        )]);
        let data = data_with_a();
        let plan = plan_for(functions, &data, &["b"]);
        let outcome = execute_plan(&plan, &data, &Params::default(), false, false).unwrap();
        assert_eq!(outcome.columns["b"].floats().unwrap(), &[1.0, 2.0]);
    }
}
