//! The physical plan: a `ProcedureGraph` of `Procedure` nodes derived from
//! the logical plan, one-to-one before push-down runs (spec §4.3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use query_core::Bounds;

use crate::opspec::ProcedureSpec;

/// A physical-plan node: an operation's procedure spec plus its DAG
/// links, stored by id rather than by owning reference (spec §9 — no
/// ownership cycles, parent/child links are ids into a table).
pub struct Procedure {
    pub id: String,
    pub spec: Box<dyn ProcedureSpec>,
    pub parents: Vec<String>,
    pub children: Vec<String>,
    pub bounds: Option<Bounds>,
}

/// The physical procedure graph. Construction from the logical plan
/// preserves topology node-for-node; the push-down rewriter then fuses
/// and duplicates in place.
pub struct ProcedureGraph {
    nodes: HashMap<String, Procedure>,
    dup_counter: AtomicU64,
}

impl ProcedureGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            dup_counter: AtomicU64::new(0),
        }
    }

    pub fn insert(&mut self, p: Procedure) {
        self.nodes.insert(p.id.clone(), p);
    }

    pub fn get(&self, id: &str) -> Option<&Procedure> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Procedure> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    fn fresh_id(&self, base: &str) -> String {
        let n = self.dup_counter.fetch_add(1, Ordering::SeqCst);
        format!("{base}_dup{n}")
    }

    /// Inserts a fresh node cloning `spec`/`bounds` with the given
    /// `parents`; used while duplicating an ancestor chain.
    pub fn insert_new(
        &mut self,
        base_id: &str,
        spec: Box<dyn ProcedureSpec>,
        parents: Vec<String>,
        bounds: Option<Bounds>,
    ) -> String {
        let id = self.fresh_id(base_id);
        for parent in &parents {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.push(id.clone());
            }
        }
        self.nodes.insert(
            id.clone(),
            Procedure {
                id: id.clone(),
                spec,
                parents,
                children: Vec::new(),
                bounds,
            },
        );
        id
    }

    /// Duplicates the ancestor chain from `pid`'s direct parent up to and
    /// including `root_id`, leaving the original chain (and any other
    /// consumer attached to it) untouched. Returns the id of the
    /// duplicated node corresponding to `pid`'s direct parent — the node
    /// `pid` should be reparented onto.
    pub fn duplicate_ancestor_chain(&mut self, pid: &str, root_id: &str) -> String {
        let mut chain = Vec::new();
        let mut cur = self.nodes[pid].parents[0].clone();
        loop {
            chain.push(cur.clone());
            if cur == root_id {
                break;
            }
            cur = self.nodes[&cur].parents[0].clone();
        }
        // chain[0] == pid's direct parent, chain[last] == root_id
        let mut new_id_for: HashMap<String, String> = HashMap::new();
        for old_id in chain.iter().rev() {
            let old = &self.nodes[old_id];
            let new_spec = old.spec.copy_spec();
            let bounds = old.bounds;
            let parents: Vec<String> = if old_id == root_id {
                old.parents.clone()
            } else {
                let orig_parent = old.parents[0].clone();
                vec![new_id_for.get(&orig_parent).cloned().unwrap_or(orig_parent)]
            };
            let new_id = self.insert_new(old_id, new_spec, parents, bounds);
            new_id_for.insert(old_id.clone(), new_id);
        }
        new_id_for[&chain[0]].clone()
    }

    /// Splices `pid` out of the graph: its children are rewired to its
    /// (single) parent, and `pid` is removed (spec §4.3 step 3).
    pub fn splice_out(&mut self, pid: &str) {
        let (parent_id, children) = {
            let p = &self.nodes[pid];
            (p.parents.first().cloned(), p.children.clone())
        };
        if let Some(parent_id) = &parent_id {
            if let Some(parent) = self.nodes.get_mut(parent_id) {
                parent.children.retain(|c| c != pid);
                for child in &children {
                    parent.children.push(child.clone());
                }
            }
        }
        for child in &children {
            if let Some(c) = self.nodes.get_mut(child) {
                for parent_slot in c.parents.iter_mut() {
                    if parent_slot == pid {
                        *parent_slot = parent_id.clone().unwrap_or_default();
                    }
                }
            }
        }
        self.nodes.remove(pid);
    }

    /// Repoints `pid`'s sole parent pointer without touching the graph
    /// otherwise (used right before `splice_out` when push-down required
    /// duplicating the ancestor chain).
    pub fn reparent(&mut self, pid: &str, new_parent: &str) {
        if let Some(p) = self.nodes.get_mut(pid) {
            if let Some(old_parent) = p.parents.first().cloned() {
                if let Some(old) = self.nodes.get_mut(&old_parent) {
                    old.children.retain(|c| c != pid);
                }
            }
            p.parents = vec![new_parent.to_string()];
        }
        if let Some(np) = self.nodes.get_mut(new_parent) {
            np.children.push(pid.to_string());
        }
    }

    /// A deterministic topological order (parents before children).
    pub fn topological_order(&self) -> Vec<String> {
        let mut graph = DiGraph::<(), ()>::new();
        let mut idx_of: HashMap<&str, NodeIndex> = HashMap::new();
        let mut id_of: HashMap<NodeIndex, &str> = HashMap::new();
        let mut ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        for id in &ids {
            let idx = graph.add_node(());
            idx_of.insert(id, idx);
            id_of.insert(idx, id);
        }
        for id in &ids {
            for parent in &self.nodes[*id].parents {
                if let (Some(&pi), Some(&ci)) = (idx_of.get(parent.as_str()), idx_of.get(id)) {
                    graph.add_edge(pi, ci, ());
                }
            }
        }
        match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(|i| id_of[&i].to_string()).collect(),
            Err(_) => ids.into_iter().map(str::to_string).collect(),
        }
    }
}

impl Default for ProcedureGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procspec::{FromProcedureSpec, RangeProcedureSpec};

    fn simple_chain() -> ProcedureGraph {
        let mut g = ProcedureGraph::new();
        g.insert(Procedure {
            id: "src".into(),
            spec: Box::new(FromProcedureSpec::new("demo")),
            parents: vec![],
            children: vec!["rng".into()],
            bounds: None,
        });
        g.insert(Procedure {
            id: "rng".into(),
            spec: Box::new(RangeProcedureSpec {
                bounds: Bounds::new(query_core::Time(0), query_core::Time(10)),
            }),
            parents: vec!["src".into()],
            children: vec![],
            bounds: None,
        });
        g
    }

    #[test]
    fn topological_order_puts_parents_before_children() {
        let g = simple_chain();
        let order = g.topological_order();
        let src_pos = order.iter().position(|id| id == "src").unwrap();
        let rng_pos = order.iter().position(|id| id == "rng").unwrap();
        assert!(src_pos < rng_pos);
    }

    #[test]
    fn splice_out_rewires_children_to_the_removed_nodes_parent() {
        let mut g = simple_chain();
        g.splice_out("rng");
        assert!(!g.contains("rng"));
        assert!(g.get("src").unwrap().children.is_empty());
    }

    #[test]
    fn duplicate_ancestor_chain_leaves_the_original_chain_intact() {
        let mut g = simple_chain();
        let dup_parent_id = g.duplicate_ancestor_chain("rng", "src");
        assert_ne!(dup_parent_id, "src");
        assert!(g.contains("src"));
        assert!(g.contains(&dup_parent_id));
        assert_eq!(g.get(&dup_parent_id).unwrap().spec.kind(), "from");
    }
}
