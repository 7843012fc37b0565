//! The logical plan: an `Operation` DAG built directly from the wire
//! format, before any push-down or resolution has happened (spec §4.2).

use std::collections::{HashMap, HashSet};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use query_core::{QueryError, Result};

use crate::opspec::OpSpec;

pub struct Operation {
    pub id: String,
    pub spec: Box<dyn OpSpec>,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub parent: String,
    pub child: String,
}

/// A query's logical operations and the edges between them. Multiple
/// parents model `join`; multiple children model a shared upstream read
/// feeding two downstream branches (spec §8 S2).
#[derive(Default)]
pub struct LogicalPlan {
    operations: HashMap<String, Operation>,
    order: Vec<String>,
    edges: Vec<Edge>,
}

impl LogicalPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operation(&mut self, op: Operation) {
        self.order.push(op.id.clone());
        self.operations.insert(op.id.clone(), op);
    }

    pub fn add_edge(&mut self, parent: impl Into<String>, child: impl Into<String>) {
        self.edges.push(Edge {
            parent: parent.into(),
            child: child.into(),
        });
    }

    pub fn operation(&self, id: &str) -> Option<&Operation> {
        self.operations.get(id)
    }

    /// Operations in the order they were added (stable, for deterministic
    /// physical-plan construction).
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.order.iter().map(move |id| &self.operations[id])
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn parents_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.child == id)
            .map(|e| e.parent.as_str())
    }

    pub fn children_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.parent == id)
            .map(|e| e.child.as_str())
    }

    /// Checks the structural invariants from spec §4.2: edges reference
    /// known operations, the graph is acyclic, and every non-source
    /// operation has at least one parent.
    pub fn validate(&self, source_kinds: &HashSet<&str>) -> Result<()> {
        for edge in &self.edges {
            if !self.operations.contains_key(&edge.parent) {
                return Err(QueryError::validation(format!(
                    "edge references unknown operation {:?}",
                    edge.parent
                )));
            }
            if !self.operations.contains_key(&edge.child) {
                return Err(QueryError::validation(format!(
                    "edge references unknown operation {:?}",
                    edge.child
                )));
            }
        }

        let mut graph = DiGraph::<(), ()>::new();
        let mut idx_of: HashMap<&str, NodeIndex> = HashMap::new();
        for id in &self.order {
            idx_of.insert(id.as_str(), graph.add_node(()));
        }
        for edge in &self.edges {
            graph.add_edge(idx_of[edge.parent.as_str()], idx_of[edge.child.as_str()], ());
        }
        if is_cyclic_directed(&graph) {
            return Err(QueryError::validation("operation graph contains a cycle"));
        }

        for id in &self.order {
            let op = &self.operations[id];
            let has_parent = self.edges.iter().any(|e| e.child == *id);
            let is_source = source_kinds.contains(op.spec.kind());
            if !is_source && !has_parent {
                return Err(QueryError::validation(format!(
                    "operation {id:?} of kind {:?} is not a source and has no parent",
                    op.spec.kind()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opspec::{FromOpSpec, RangeOpSpec};

    fn op(id: &str, spec: Box<dyn OpSpec>) -> Operation {
        Operation { id: id.to_string(), spec }
    }

    #[test]
    fn validate_rejects_a_non_source_with_no_parent() {
        let mut plan = LogicalPlan::new();
        plan.add_operation(op("rng", Box::new(RangeOpSpec {
            bounds: crate::opspec::BoundsSpec {
                start: query_core::QueryTime::Absolute(query_core::Time(0)),
                stop: query_core::QueryTime::Absolute(query_core::Time(10)),
            },
        })));
        let sources: HashSet<&str> = ["from"].into_iter().collect();
        assert!(plan.validate(&sources).is_err());
    }

    #[test]
    fn validate_rejects_a_cycle() {
        let mut plan = LogicalPlan::new();
        plan.add_operation(op("a", Box::new(FromOpSpec { database: "d".into() })));
        plan.add_operation(op("b", Box::new(FromOpSpec { database: "d".into() })));
        plan.add_edge("a", "b");
        plan.add_edge("b", "a");
        let sources: HashSet<&str> = ["from"].into_iter().collect();
        assert!(plan.validate(&sources).is_err());
    }

    #[test]
    fn validate_accepts_a_well_formed_chain() {
        let mut plan = LogicalPlan::new();
        plan.add_operation(op("src", Box::new(FromOpSpec { database: "d".into() })));
        plan.add_operation(op("rng", Box::new(RangeOpSpec {
            bounds: crate::opspec::BoundsSpec {
                start: query_core::QueryTime::Absolute(query_core::Time(0)),
                stop: query_core::QueryTime::Absolute(query_core::Time(10)),
            },
        })));
        plan.add_edge("src", "rng");
        let sources: HashSet<&str> = ["from"].into_iter().collect();
        assert!(plan.validate(&sources).is_ok());
        assert_eq!(plan.parents_of("rng").collect::<Vec<_>>(), vec!["src"]);
        assert_eq!(plan.children_of("src").collect::<Vec<_>>(), vec!["rng"]);
    }
}
