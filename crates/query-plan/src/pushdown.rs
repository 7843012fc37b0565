//! The push-down rewriter (spec §4.3).
//!
//! Each `ProcedureSpec` may declare zero or more `PushDownRule`s. The
//! rewriter walks a procedure's unary ancestors looking for the first one
//! whose kind matches `root`, tunneling through any intermediate kind
//! listed in `through`, and whose `match_fn` (if any) accepts that
//! ancestor's current spec. Once found, the procedure fuses its behavior
//! into the root (or, if the root already carries conflicting
//! pushed-down state, into a fresh duplicate of the ancestor chain so the
//! other consumer keeps its own reading) and is spliced out of the
//! graph.

use std::sync::Arc;

use crate::opspec::ProcedureSpec;
use crate::physical::ProcedureGraph;

pub type MatchFn = Arc<dyn Fn(&dyn ProcedureSpec) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct PushDownRule {
    pub root: &'static str,
    pub through: Vec<&'static str>,
    pub match_fn: Option<MatchFn>,
}

impl PushDownRule {
    pub fn new(root: &'static str) -> Self {
        Self {
            root,
            through: Vec::new(),
            match_fn: None,
        }
    }

    pub fn through(mut self, kinds: &[&'static str]) -> Self {
        self.through = kinds.to_vec();
        self
    }

    pub fn matching<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn ProcedureSpec) -> bool + Send + Sync + 'static,
    {
        self.match_fn = Some(Arc::new(f));
        self
    }

    fn matches(&self, spec: &dyn ProcedureSpec) -> bool {
        match &self.match_fn {
            Some(f) => f(spec),
            None => true,
        }
    }
}

/// Applies every applicable push-down rule to `graph`, rewriting it in
/// place. Returns the ids of procedures that were fused away (for
/// diagnostics/tests).
pub fn rewrite(graph: &mut ProcedureGraph) -> Vec<String> {
    let mut removed = Vec::new();
    let order = graph.topological_order();
    for pid in order {
        if !graph.contains(&pid) {
            continue; // already fused away as someone else's ancestor
        }
        let rules = graph.get(&pid).unwrap().spec.push_down_rules();
        if rules.is_empty() {
            continue;
        }
        if let Some(root_id) = find_push_down_target(graph, &pid, &rules) {
            apply_push_down(graph, &pid, &root_id);
            removed.push(pid);
        }
    }
    removed
}

/// Walks `pid`'s unary ancestor chain looking for the first procedure
/// matching one of `rules`.
fn find_push_down_target(
    graph: &ProcedureGraph,
    pid: &str,
    rules: &[PushDownRule],
) -> Option<String> {
    for rule in rules {
        if let Some(found) = walk_for_rule(graph, pid, rule) {
            return Some(found);
        }
    }
    None
}

fn walk_for_rule(graph: &ProcedureGraph, pid: &str, rule: &PushDownRule) -> Option<String> {
    let mut current = graph.get(pid)?;
    loop {
        if current.parents.len() != 1 {
            return None; // only unary ancestry is walked
        }
        let parent_id = &current.parents[0];
        let parent = graph.get(parent_id)?;
        if parent.spec.kind() == rule.root {
            return if rule.matches(parent.spec.as_ref()) {
                Some(parent_id.clone())
            } else {
                None
            };
        }
        if !rule.through.contains(&parent.spec.kind()) {
            return None;
        }
        current = parent;
    }
}

fn apply_push_down(graph: &mut ProcedureGraph, pid: &str, root_id: &str) {
    let spec = graph.get(pid).unwrap().spec.copy_spec();
    let conflicts = spec.conflicts(graph.get(root_id).unwrap().spec.as_ref());
    let target_id = if conflicts {
        let new_parent = graph.duplicate_ancestor_chain(pid, root_id);
        graph.reparent(pid, &new_parent);
        // duplicate_ancestor_chain returns pid's new direct parent; the
        // duplicated root itself is further up that same chain (or is
        // the new parent itself when root was pid's direct parent).
        find_root_copy(graph, pid, root_id)
    } else {
        root_id.to_string()
    };
    spec.push_down(graph.get_mut(&target_id).unwrap().spec.as_mut());
    graph.splice_out(pid);
}

/// After `duplicate_ancestor_chain`, walks `pid`'s (now-reparented)
/// ancestry to find the duplicated node with the same kind as `root_id`.
fn find_root_copy(graph: &ProcedureGraph, pid: &str, root_id: &str) -> String {
    let root_kind = graph.get(root_id).unwrap().spec.kind();
    let mut current = graph.get(pid).unwrap();
    loop {
        let parent_id = &current.parents[0];
        let parent = graph.get(parent_id).unwrap();
        if parent.spec.kind() == root_kind {
            return parent_id.clone();
        }
        current = parent;
    }
}
