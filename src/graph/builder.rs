//! The per-call build pipeline: collect → build → prune → validate.
//!
//! Phases, in order: collect the active function pool (synthesized
//! functions included), build the producer→consumer graph from argument
//! names, prune to the ancestors of the requested targets, validate the
//! override set, prune again with override upstreams cut, then check that
//! every remaining root is satisfied by the input data. The result is an
//! immutable plan the executor walks once.

use crate::config::{GroupingConfig, Strictness};
use crate::data::DataTable;
use crate::error::{EngineError, SpecificationError};
use crate::graph::dag::{DependencyDag, NodeRole};
use crate::registry::{synthesize_functions, AggregationSpec, PolicyFunction};
use petgraph::stable_graph::NodeIndex;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Everything the executor needs for one topological pass.
#[derive(Debug)]
pub struct ExecutionPlan {
    pub dag: DependencyDag,
    pub order: Vec<NodeIndex>,
    /// The pruned function pool, synthesized functions included.
    pub functions: BTreeMap<String, PolicyFunction>,
    pub targets: Vec<String>,
}

#[allow(clippy::too_many_arguments)]
pub fn build_execution_plan(
    functions: &BTreeMap<String, PolicyFunction>,
    aggregation_specs: &[AggregationSpec],
    config: &GroupingConfig,
    data: &DataTable,
    targets: &[String],
    explicit_overrides: Option<&[String]>,
    strictness: Strictness,
) -> Result<ExecutionPlan, EngineError> {
    let data_columns: HashSet<String> = data.names().map(str::to_string).collect();

    // --- Collect ---
    let mut active = functions.clone();
    synthesize_functions(&mut active, targets, aggregation_specs, config, &data_columns)?;

    let overrides: HashSet<String> = match explicit_overrides {
        Some(list) => {
            for name in list {
                if !data.contains(name) {
                    return Err(SpecificationError::OverrideColumnMissing {
                        column: name.clone(),
                    }
                    .into());
                }
            }
            list.iter().cloned().collect()
        }
        // Default: every data column that collides with a function name
        // substitutes for it.
        None => data
            .names()
            .filter(|name| active.contains_key(*name))
            .map(str::to_string)
            .collect(),
    };

    for target in targets {
        if !active.contains_key(target) && !data.contains(target) {
            return Err(SpecificationError::UnknownTarget {
                name: target.clone(),
            }
            .into());
        }
    }

    // --- Build ---
    let mut dag = DependencyDag::new();
    for name in active.keys() {
        dag.ensure_node(name, NodeRole::Function);
    }
    for (name, function) in &active {
        let consumer = dag.index_of(name).expect("BUG: function node just added");
        for (arg, _) in function.data_args() {
            let producer = dag.ensure_node(arg, NodeRole::Input);
            dag.add_edge(producer, consumer);
        }
    }
    for target in targets {
        // A target satisfied by data alone still needs a node to survive
        // pruning and reach the result.
        dag.ensure_node(target, NodeRole::Input);
    }
    for name in &overrides {
        dag.set_role(name, NodeRole::Override);
    }
    debug!(nodes = dag.len(), "built full dependency graph");

    // --- Prune to targets ---
    let target_indices: Vec<NodeIndex> = targets
        .iter()
        .map(|t| dag.index_of(t).expect("BUG: target node just ensured"))
        .collect();
    let keep = dag.ancestors(&target_indices, false);
    dag.retain(&keep);

    // --- Validate overrides ---
    for name in &overrides {
        if dag.contains(name) {
            continue;
        }
        match strictness {
            Strictness::Raise => {
                return Err(SpecificationError::UnusedOverride {
                    column: name.clone(),
                }
                .into())
            }
            Strictness::Warn => warn!(column = %name, "override column is unused"),
            Strictness::Ignore => {}
        }
    }

    // --- Prune override upstreams ---
    // An ancestor whose consumers are all overridden (or themselves dead)
    // disappears transitively: the ancestor walk simply never enters an
    // override's upstream.
    let keep = dag.ancestors(&target_indices, true);
    dag.retain(&keep);
    debug!(nodes = dag.len(), "pruned dependency graph");

    // --- Validate roots ---
    for index in dag.node_indices().collect::<Vec<_>>() {
        let node = dag.node(index);
        if node.role == NodeRole::Input && !data.contains(&node.name) {
            let required_by: Vec<String> = dag
                .consumers(index)
                .into_iter()
                .map(|consumer| dag.node(consumer).name.clone())
                .collect();
            return Err(SpecificationError::MissingInputColumn {
                column: node.name.clone(),
                required_by,
            }
            .into());
        }
    }

    // --- Minimal-specification check for data columns ---
    if strictness != Strictness::Ignore {
        let structural: HashSet<String> = {
            let mut columns: HashSet<String> =
                config.levels().map(|l| config.id_column(l)).collect();
            columns.insert("p_id".to_string());
            columns
        };
        for name in data.names() {
            if structural.contains(name) || dag.contains(name) {
                continue;
            }
            match strictness {
                Strictness::Raise => {
                    return Err(SpecificationError::UnusedInputColumn {
                        column: name.to_string(),
                    }
                    .into())
                }
                Strictness::Warn => warn!(column = %name, "input column is unused"),
                Strictness::Ignore => unreachable!(),
            }
        }
    }

    let order = dag.topological_order()?;
    let functions = active
        .into_iter()
        .filter(|(name, _)| {
            dag.index_of(name)
                .map_or(false, |index| dag.node(index).role == NodeRole::Function)
        })
        .collect();

    Ok(ExecutionPlan {
        dag,
        order,
        functions,
        targets: targets.to_vec(),
    })
}
