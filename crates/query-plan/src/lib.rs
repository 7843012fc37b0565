//! # query-plan
//!
//! Builds the logical `Operation` DAG from the wire format, lowers it
//! into a physical `ProcedureGraph` through the function registry, and
//! runs the push-down rewriter over it (spec §4.1-§4.3).

pub mod builtins;
pub mod logical;
pub mod opspec;
pub mod physical;
pub mod procspec;
pub mod pushdown;
pub mod registry;
pub mod wire;

pub use logical::{Edge, LogicalPlan, Operation};
pub use opspec::{OpSpec, ProcedureSpec};
pub use physical::{Procedure, ProcedureGraph};
pub use pushdown::PushDownRule;
pub use registry::FunctionRegistry;
pub use wire::PlanSpec;

use query_core::Result;

/// Lowers a logical plan into a physical plan one node at a time (no
/// topology change yet — push-down is a separate, explicit pass).
pub fn lower(logical: &LogicalPlan, registry: &FunctionRegistry) -> Result<ProcedureGraph> {
    let mut graph = ProcedureGraph::new();
    for op in logical.operations() {
        let spec = registry.create_procedure(op.spec.as_ref())?;
        let parents: Vec<String> = logical.parents_of(&op.id).map(str::to_string).collect();
        let children: Vec<String> = logical.children_of(&op.id).map(str::to_string).collect();
        graph.insert(Procedure {
            id: op.id.clone(),
            spec,
            parents,
            children,
            bounds: None,
        });
    }
    Ok(graph)
}

/// Builds and optimizes a physical plan from a wire-format `PlanSpec`:
/// parse, lower, push down. This is the entry point `query-exec` and the
/// CLI call.
pub fn plan(spec: &wire::PlanSpec, registry: &FunctionRegistry) -> Result<ProcedureGraph> {
    let logical = spec.to_logical_plan(registry)?;
    let mut physical = lower(&logical, registry)?;
    pushdown::rewrite(&mut physical);
    Ok(physical)
}
