//! Graph structure and algorithms over variable names.

use crate::error::SpecificationError;
use petgraph::algo::toposort;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// How a node's value is produced during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// A root satisfied by an input data column.
    Input,
    /// Computed by a function.
    Function,
    /// A function whose value is substituted by an input column; its
    /// upstream edges are dead.
    Override,
}

#[derive(Debug, Clone)]
pub struct VarNode {
    pub name: String,
    pub role: NodeRole,
}

/// A directed acyclic graph over variable names, edges pointing from
/// producer to consumer. Built fresh per call and mutated only during the
/// pruning phases.
#[derive(Debug, Clone, Default)]
pub struct DependencyDag {
    graph: StableDiGraph<VarNode, ()>,
    index: HashMap<String, NodeIndex>,
}

impl DependencyDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the node if absent; an existing node keeps its role.
    pub fn ensure_node(&mut self, name: &str, role: NodeRole) -> NodeIndex {
        if let Some(&existing) = self.index.get(name) {
            return existing;
        }
        let added = self.graph.add_node(VarNode {
            name: name.to_string(),
            role,
        });
        self.index.insert(name.to_string(), added);
        added
    }

    pub fn set_role(&mut self, name: &str, role: NodeRole) {
        if let Some(&existing) = self.index.get(name) {
            self.graph[existing].role = role;
        }
    }

    pub fn add_edge(&mut self, producer: NodeIndex, consumer: NodeIndex) {
        self.graph.update_edge(producer, consumer, ());
    }

    pub fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node(&self, index: NodeIndex) -> &VarNode {
        &self.graph[index]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(|node| node.name.as_str())
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn predecessors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(index, Direction::Incoming)
            .collect()
    }

    pub fn consumers(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect()
    }

    pub fn consumer_count(&self, index: NodeIndex) -> usize {
        self.graph
            .neighbors_directed(index, Direction::Outgoing)
            .count()
    }

    /// All ancestors of `starts` (the start nodes included). With
    /// `stop_at_overrides`, traversal does not continue past an override
    /// node: its upstream is dead unless something else needs it.
    pub fn ancestors(&self, starts: &[NodeIndex], stop_at_overrides: bool) -> HashSet<NodeIndex> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = starts.iter().copied().collect();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            if stop_at_overrides && self.graph[node].role == NodeRole::Override {
                continue;
            }
            for parent in self.graph.neighbors_directed(node, Direction::Incoming) {
                queue.push_back(parent);
            }
        }
        visited
    }

    /// All descendants of `starts` (the start nodes included). Used by
    /// debug mode to mark the failing subtree as skipped.
    pub fn descendants(&self, starts: &[NodeIndex]) -> HashSet<NodeIndex> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = starts.iter().copied().collect();

        while let Some(node) = queue.pop_front() {
            if visited.insert(node) {
                for child in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    queue.push_back(child);
                }
            }
        }
        visited
    }

    /// Drops every node not in `keep`, with its edges.
    pub fn retain(&mut self, keep: &HashSet<NodeIndex>) {
        let doomed: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|index| !keep.contains(index))
            .collect();
        for index in doomed {
            let name = self.graph[index].name.clone();
            self.graph.remove_node(index);
            self.index.remove(&name);
        }
    }

    /// Producer-before-consumer order over the whole graph. A cycle is an
    /// authoring error and names one involved variable.
    pub fn topological_order(&self) -> Result<Vec<NodeIndex>, SpecificationError> {
        toposort(&self.graph, None).map_err(|cycle| SpecificationError::Cycle {
            name: self.graph[cycle.node_id()].name.clone(),
        })
    }
}
