//! The external JSON plan format (spec §6): operations, edges, resource
//! limits, and the query's `now`, as handed to the engine by an
//! (unmodeled) front end.

use std::collections::HashMap;

use query_core::{QueryError, QueryTime, Result, Time};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logical::{LogicalPlan, Operation};
use crate::opspec::{self, OpSpec};
use crate::registry::FunctionRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireOperation {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub spec: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEdge {
    pub parent: String,
    pub child: String,
}

/// Resource limits attached to a plan (spec §5): a zero value means
/// unconstrained, mirroring `Allocator::unlimited`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default)]
    pub memory_bytes: i64,
    #[serde(default)]
    pub concurrency_quota: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSpec {
    pub operations: Vec<WireOperation>,
    pub edges: Vec<WireEdge>,
    #[serde(default)]
    pub resources: ResourceLimits,
    /// RFC3339 timestamp `now` is resolved against for relative bounds.
    pub now: String,
}

impl PlanSpec {
    pub fn now(&self) -> Result<Time> {
        Time::from_rfc3339(&self.now)
            .map_err(|e| QueryError::validation(format!("invalid now {:?}: {e}", self.now)))
    }

    /// Parses every operation's `spec` JSON into a concrete `OpSpec` for
    /// its `kind`, resolves any relative `QueryTime` against `now`, and
    /// assembles the resulting operations and edges into a `LogicalPlan`.
    pub fn to_logical_plan(&self, registry: &FunctionRegistry) -> Result<LogicalPlan> {
        let now = self.now()?;
        let mut plan = LogicalPlan::new();
        for wire_op in &self.operations {
            if !registry.is_registered(&wire_op.kind) {
                return Err(QueryError::UnknownProcedure(wire_op.kind.clone()));
            }
            let spec = parse_opspec(&wire_op.kind, &wire_op.spec, now)?;
            plan.add_operation(Operation {
                id: wire_op.id.clone(),
                spec,
            });
        }
        for edge in &self.edges {
            plan.add_edge(edge.parent.clone(), edge.child.clone());
        }
        let sources = registry.source_kinds();
        plan.validate(&sources)?;
        Ok(plan)
    }
}

fn resolve_query_time(qt: QueryTime, now: Time) -> QueryTime {
    QueryTime::Absolute(qt.resolve(now))
}

fn parse_opspec(kind: &str, value: &Value, now: Time) -> Result<Box<dyn OpSpec>> {
    let bad = |e: serde_json::Error| QueryError::validation(format!("invalid spec for {kind:?}: {e}"));
    let spec: Box<dyn OpSpec> = match kind {
        "from" => Box::new(serde_json::from_value::<opspec::FromOpSpec>(value.clone()).map_err(bad)?),
        "range" => {
            let mut r: opspec::RangeOpSpec = serde_json::from_value(value.clone()).map_err(bad)?;
            r.bounds.start = resolve_query_time(r.bounds.start, now);
            r.bounds.stop = resolve_query_time(r.bounds.stop, now);
            Box::new(r)
        }
        "limit" => Box::new(serde_json::from_value::<opspec::LimitOpSpec>(value.clone()).map_err(bad)?),
        "group" => Box::new(serde_json::from_value::<opspec::GroupOpSpec>(value.clone()).map_err(bad)?),
        "sum" => Box::new(opspec::SumOpSpec),
        "count" => Box::new(opspec::CountOpSpec),
        "mean" => Box::new(opspec::MeanOpSpec),
        "min" => Box::new(opspec::MinOpSpec),
        "max" => Box::new(opspec::MaxOpSpec),
        "stddev" => Box::new(opspec::StddevOpSpec),
        "spread" => Box::new(opspec::SpreadOpSpec),
        "skew" => Box::new(opspec::SkewOpSpec),
        "first" => Box::new(serde_json::from_value::<opspec::FirstOpSpec>(value.clone()).map_err(bad)?),
        "last" => Box::new(serde_json::from_value::<opspec::LastOpSpec>(value.clone()).map_err(bad)?),
        "sample" => Box::new(serde_json::from_value::<opspec::SampleOpSpec>(value.clone()).map_err(bad)?),
        "percentile" => {
            Box::new(serde_json::from_value::<opspec::PercentileOpSpec>(value.clone()).map_err(bad)?)
        }
        "derivative" => {
            Box::new(serde_json::from_value::<opspec::DerivativeOpSpec>(value.clone()).map_err(bad)?)
        }
        "difference" => {
            Box::new(serde_json::from_value::<opspec::DifferenceOpSpec>(value.clone()).map_err(bad)?)
        }
        "covariance" => {
            Box::new(serde_json::from_value::<opspec::CovarianceOpSpec>(value.clone()).map_err(bad)?)
        }
        "join" => Box::new(serde_json::from_value::<opspec::JoinOpSpec>(value.clone()).map_err(bad)?),
        "window" => {
            let mut w: opspec::WindowOpSpec = serde_json::from_value(value.clone()).map_err(bad)?;
            w.start = w.start.map(|s| resolve_query_time(s, now));
            Box::new(w)
        }
        "yield" => Box::new(serde_json::from_value::<opspec::YieldOpSpec>(value.clone()).map_err(bad)?),
        // `filter`/`stateTracking` carry a compiled `RowPredicateFn` that has
        // no wire representation; those plans are built programmatically.
        other => return Err(QueryError::UnknownProcedure(other.to_string())),
    };
    Ok(spec)
}

/// Bare metadata read off a plan without fully parsing it, for quick
/// validation errors before committing to planning.
pub fn operation_kinds(spec: &PlanSpec) -> HashMap<String, String> {
    spec.operations
        .iter()
        .map(|op| (op.id.clone(), op.kind.clone()))
        .collect()
}
