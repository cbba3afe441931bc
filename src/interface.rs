//! The primary entry point: `compute`.
//!
//! One call wires the whole pipeline: input validation → plan construction
//! (collect, build, prune, validate) → topological execution → result
//! assembly. Nothing survives the call; every call builds its own graph.

use crate::config::Strictness;
use crate::data::{Column, DataTable};
use crate::engine::executor::{execute_plan, ExecutionOutcome};
use crate::environment::PolicyEnvironment;
use crate::error::{EngineError, SpecificationError};
use crate::graph::build_execution_plan;
use std::collections::HashSet;
use tracing::debug;

/// Per-call options. `targets: None` falls back to the environment's
/// default target list; `overrides: None` auto-detects data columns that
/// collide with function names.
#[derive(Debug, Clone)]
pub struct ComputeOptions {
    pub targets: Option<Vec<String>>,
    pub overrides: Option<Vec<String>>,
    pub check_minimal_specification: Strictness,
    pub rounding: bool,
    pub debug: bool,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            targets: None,
            overrides: None,
            check_minimal_specification: Strictness::Ignore,
            rounding: true,
            debug: false,
        }
    }
}

impl ComputeOptions {
    pub fn with_targets<T, I>(targets: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = T>,
    {
        Self {
            targets: Some(targets.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

/// Computes the requested targets for one population under one policy
/// environment.
///
/// The result table holds exactly the targets — or, in debug mode,
/// everything computed plus the raw input — with grouping-id columns
/// leading in canonical order (household, sub-groupings, person id).
pub fn compute(
    data: &DataTable,
    environment: &PolicyEnvironment,
    options: &ComputeOptions,
) -> Result<DataTable, EngineError> {
    data.validate(&environment.config.groupings)?;

    let targets: Vec<String> = match &options.targets {
        Some(targets) if !targets.is_empty() => targets.clone(),
        _ => environment.config.default_targets.clone(),
    };
    if targets.is_empty() {
        return Err(SpecificationError::NoTargets.into());
    }
    debug!(?targets, n_rows = data.n_rows(), "compute call started");

    let plan = build_execution_plan(
        &environment.functions,
        &environment.aggregations,
        &environment.config.groupings,
        data,
        &targets,
        options.overrides.as_deref(),
        options.check_minimal_specification,
    )?;

    let outcome = execute_plan(
        &plan,
        data,
        &environment.params,
        options.rounding,
        options.debug,
    )?;

    Ok(assemble(
        outcome,
        data,
        &targets,
        environment,
        options.debug,
    )?)
}

/// Selects and orders the result columns.
fn assemble(
    outcome: ExecutionOutcome,
    data: &DataTable,
    targets: &[String],
    environment: &PolicyEnvironment,
    debug_mode: bool,
) -> Result<DataTable, SpecificationError> {
    let canonical = environment.config.groupings.canonical_id_columns();
    let mut result = DataTable::default();
    let mut taken: HashSet<String> = HashSet::new();

    let mut push = |result: &mut DataTable,
                    taken: &mut HashSet<String>,
                    name: &str,
                    column: Column|
     -> Result<(), SpecificationError> {
        if taken.insert(name.to_string()) {
            result.push(name.to_string(), column)?;
        }
        Ok(())
    };

    if debug_mode {
        // Everything, for diagnosability: ids first, then the raw input,
        // then every computed intermediate that survived.
        for id in &canonical {
            if let Some(column) = data.get(id) {
                push(&mut result, &mut taken, id, column.clone())?;
            }
        }
        for name in data.names() {
            push(&mut result, &mut taken, name, data.get(name).expect("BUG: named column").clone())?;
        }
        let mut computed: Vec<&String> = outcome
            .columns
            .keys()
            .filter(|name| !taken.contains(*name))
            .collect();
        computed.sort();
        for name in computed {
            push(&mut result, &mut taken, name, outcome.columns[name].clone())?;
        }
    } else {
        // Exactly the targets, grouping ids among them leading.
        for id in &canonical {
            if targets.iter().any(|t| t == id) {
                let column = resolve_target(&outcome, data, id);
                push(&mut result, &mut taken, id, column)?;
            }
        }
        for target in targets {
            if !taken.contains(target) {
                let column = resolve_target(&outcome, data, target);
                push(&mut result, &mut taken, target, column)?;
            }
        }
    }

    Ok(result)
}

fn resolve_target(outcome: &ExecutionOutcome, data: &DataTable, name: &str) -> Column {
    outcome
        .columns
        .get(name)
        .cloned()
        .or_else(|| data.get(name).cloned())
        .expect("BUG: target survived planning but was never produced")
}
