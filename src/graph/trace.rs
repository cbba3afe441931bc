//! Diagnostic dependency trace.
//!
//! Renders, for one variable of a built plan, the resolved dependency tree
//! with per-node provenance. Used in error paths and tests when a pruning
//! or synthesis decision needs to be inspected.

use crate::graph::builder::ExecutionPlan;
use crate::graph::dag::NodeRole;
use crate::registry::Provenance;
use petgraph::stable_graph::NodeIndex;
use std::collections::HashMap;
use std::fmt::Write;

pub fn format_trace(plan: &ExecutionPlan, target: &str) -> String {
    let mut output = String::new();
    let Some(index) = plan.dag.index_of(target) else {
        let _ = writeln!(output, "'{target}' is not a node of the pruned graph");
        return output;
    };

    let _ = writeln!(output, "DEPENDENCY TRACE for '{target}':");
    let _ = writeln!(output, "--------------------------------------------------");
    let mut tracer = Tracer {
        plan,
        visited_at_level: HashMap::new(),
        output,
    };
    tracer.trace_node(index, 1, "");
    tracer.output
}

struct Tracer<'a> {
    plan: &'a ExecutionPlan,
    visited_at_level: HashMap<NodeIndex, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, index: NodeIndex, level: usize, prefix: &str) {
        let name = &self.plan.dag.node(index).name;
        if let Some(&first_seen) = self.visited_at_level.get(&index) {
            let _ = writeln!(self.output, "{prefix}{name} -> (see L{first_seen})");
            return;
        }
        self.visited_at_level.insert(index, level);

        let kind = self.describe(index);
        let _ = writeln!(self.output, "{prefix}{name} [{kind}]");

        let mut parents = self.plan.dag.predecessors(index);
        parents.sort_by(|&a, &b| self.plan.dag.node(a).name.cmp(&self.plan.dag.node(b).name));
        let child_prefix = format!("{prefix}  ");
        for parent in parents {
            self.trace_node(parent, level + 1, &child_prefix);
        }
    }

    fn describe(&self, index: NodeIndex) -> String {
        let node = self.plan.dag.node(index);
        match node.role {
            NodeRole::Input => "input".to_string(),
            NodeRole::Override => "override".to_string(),
            NodeRole::Function => match self
                .plan
                .functions
                .get(&node.name)
                .map(|function| function.provenance())
            {
                Some(Provenance::Registered) | None => "function".to_string(),
                Some(Provenance::TimeConversion { source }) => {
                    format!("converted from {source}")
                }
                Some(Provenance::GroupAggregation { reducer, level, .. }) => {
                    format!("{} over {level}", reducer.name())
                }
                Some(Provenance::LinkAggregation { reducer, link, .. }) => {
                    format!("{} by {link}", reducer.name())
                }
            },
        }
    }
}
