//! The function registry: the kind-keyed table that lets new operations
//! be added without the planner ever matching on a closed enum (spec
//! §4.1). Registration is write-once; `finalize` freezes the table so
//! concurrent planning (read-only from then on) needs no locking.

use std::collections::{HashMap, HashSet};

use query_core::{QueryError, Result, Signature};

use crate::opspec::OpSpec;
use crate::procspec::{
    AggregateProcedureSpec, CovarianceProcedureSpec, DerivativeProcedureSpec,
    DifferenceProcedureSpec, FirstLastProcedureSpec, FromProcedureSpec, GroupProcedureSpec,
    JoinProcedureSpec, LimitProcedureSpec, PercentileProcedureSpec, RangeProcedureSpec,
    SampleProcedureSpec, StateTrackingProcedureSpec, WindowProcedureSpec, YieldProcedureSpec,
};
use crate::{opspec, ProcedureSpec};

type ProcedureCtor = Box<dyn Fn(&dyn OpSpec) -> Result<Box<dyn ProcedureSpec>> + Send + Sync>;

struct Entry {
    signature: Signature,
    is_source: bool,
    ctor: ProcedureCtor,
}

/// Kind string → (parameter signature, source-or-not, logical-to-physical
/// constructor). One entry per operation kind.
pub struct FunctionRegistry {
    entries: HashMap<&'static str, Entry>,
    frozen: bool,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            frozen: false,
        }
    }

    pub fn register<F>(
        &mut self,
        kind: &'static str,
        signature: Signature,
        is_source: bool,
        ctor: F,
    ) -> Result<()>
    where
        F: Fn(&dyn OpSpec) -> Result<Box<dyn ProcedureSpec>> + Send + Sync + 'static,
    {
        if self.frozen {
            return Err(QueryError::validation(format!(
                "registry is frozen, cannot register {kind:?}"
            )));
        }
        if self.entries.contains_key(kind) {
            return Err(QueryError::validation(format!(
                "kind {kind:?} already registered"
            )));
        }
        self.entries.insert(
            kind,
            Entry {
                signature,
                is_source,
                ctor: Box::new(ctor),
            },
        );
        Ok(())
    }

    pub fn finalize(&mut self) {
        self.frozen = true;
    }

    pub fn signature(&self, kind: &str) -> Option<&Signature> {
        self.entries.get(kind).map(|e| &e.signature)
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    pub fn source_kinds(&self) -> HashSet<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_source)
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn create_procedure(&self, op: &dyn OpSpec) -> Result<Box<dyn ProcedureSpec>> {
        let entry = self
            .entries
            .get(op.kind())
            .ok_or_else(|| QueryError::UnknownProcedure(op.kind().to_string()))?;
        (entry.ctor)(op)
    }

    /// The registry this engine ships with: every built-in operation
    /// kind, frozen and ready to plan with.
    pub fn builtin() -> Self {
        let mut r = Self::new();
        register_builtins(&mut r).expect("builtin registrations are internally consistent");
        r.finalize();
        r
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn downcast<'a, T: 'static>(op: &'a dyn OpSpec, kind: &str) -> Result<&'a T> {
    op.as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| QueryError::schema(format!("opspec for {kind:?} had unexpected type")))
}

fn register_builtins(r: &mut FunctionRegistry) -> Result<()> {
    r.register("from", Signature::default().required_param("database", query_core::ParamType::String), true, |op| {
        let spec: &opspec::FromOpSpec = downcast(op, "from")?;
        Ok(Box::new(FromProcedureSpec::new(spec.database.clone())) as Box<dyn ProcedureSpec>)
    })?;

    r.register("range", Signature::default(), false, |op| {
        let spec: &opspec::RangeOpSpec = downcast(op, "range")?;
        // `now` resolution happens when the logical plan is lowered
        // (query_core::QueryTime::resolve); by the time an OpSpec reaches
        // here its bounds are assumed already absolute.
        let start = match spec.bounds.start {
            query_core::QueryTime::Absolute(t) => t,
            _ => return Err(QueryError::validation("range bounds must be resolved before planning")),
        };
        let stop = match spec.bounds.stop {
            query_core::QueryTime::Absolute(t) => t,
            _ => return Err(QueryError::validation("range bounds must be resolved before planning")),
        };
        Ok(Box::new(RangeProcedureSpec {
            bounds: query_core::Bounds::new(start, stop),
        }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("limit", Signature::default(), false, |op| {
        let spec: &opspec::LimitOpSpec = downcast(op, "limit")?;
        Ok(Box::new(LimitProcedureSpec {
            n: spec.n,
            offset: spec.offset,
        }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("group", Signature::default(), false, |op| {
        let spec: &opspec::GroupOpSpec = downcast(op, "group")?;
        Ok(Box::new(GroupProcedureSpec { by: spec.by.clone() }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("filter", Signature::default(), false, |op| {
        let spec: &opspec::FilterOpSpec = downcast(op, "filter")?;
        Ok(Box::new(crate::procspec::FilterProcedureSpec {
            predicate: spec.predicate.clone(),
        }) as Box<dyn ProcedureSpec>)
    })?;

    for (kind, method) in [
        ("sum", "sum"),
        ("count", "count"),
        ("mean", "mean"),
        ("min", "min"),
        ("max", "max"),
        ("stddev", "stddev"),
        ("spread", "spread"),
        ("skew", "skew"),
    ] {
        r.register(kind, Signature::default(), false, move |_op| {
            Ok(Box::new(AggregateProcedureSpec { kind, method }) as Box<dyn ProcedureSpec>)
        })?;
    }

    r.register("first", Signature::default(), false, |op| {
        let spec: &opspec::FirstOpSpec = downcast(op, "first")?;
        Ok(Box::new(FirstLastProcedureSpec {
            kind: "first",
            column: spec.column.clone(),
            use_row_time: spec.use_row_time,
            descending: false,
        }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("last", Signature::default(), false, |op| {
        let spec: &opspec::LastOpSpec = downcast(op, "last")?;
        Ok(Box::new(FirstLastProcedureSpec {
            kind: "last",
            column: spec.column.clone(),
            use_row_time: spec.use_row_time,
            descending: true,
        }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("sample", Signature::default(), false, |op| {
        let spec: &opspec::SampleOpSpec = downcast(op, "sample")?;
        Ok(Box::new(SampleProcedureSpec {
            column: spec.column.clone(),
            use_row_time: spec.use_row_time,
            n: spec.n,
            pos: spec.pos,
        }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("percentile", Signature::default(), false, |op| {
        let spec: &opspec::PercentileOpSpec = downcast(op, "percentile")?;
        Ok(Box::new(PercentileProcedureSpec {
            percentile: spec.percentile,
            compression: spec.compression,
            exact: spec.exact,
            column: String::new(),
        }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("derivative", Signature::default(), false, |op| {
        let spec: &opspec::DerivativeOpSpec = downcast(op, "derivative")?;
        Ok(Box::new(DerivativeProcedureSpec {
            unit: spec.unit,
            non_negative: spec.non_negative,
            column: spec.column.clone(),
        }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("difference", Signature::default(), false, |op| {
        let spec: &opspec::DifferenceOpSpec = downcast(op, "difference")?;
        Ok(Box::new(DifferenceProcedureSpec {
            non_negative: spec.non_negative,
            column: spec.column.clone(),
        }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("covariance", Signature::default(), false, |op| {
        let spec: &opspec::CovarianceOpSpec = downcast(op, "covariance")?;
        Ok(Box::new(CovarianceProcedureSpec {
            pearsonr: spec.pearsonr,
            on: spec.on.clone(),
        }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("join", Signature::default(), false, |op| {
        let spec: &opspec::JoinOpSpec = downcast(op, "join")?;
        Ok(Box::new(JoinProcedureSpec { on: spec.on.clone() }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("window", Signature::default(), false, |op| {
        let spec: &opspec::WindowOpSpec = downcast(op, "window")?;
        let start = match spec.start {
            Some(query_core::QueryTime::Absolute(t)) => Some(t),
            Some(_) => {
                return Err(QueryError::validation(
                    "window start must be resolved before planning",
                ))
            }
            None => None,
        };
        Ok(Box::new(WindowProcedureSpec {
            every: spec.every,
            period: spec.period,
            start,
            round: spec.round,
        }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("stateTracking", Signature::default(), false, |op| {
        let spec: &opspec::StateTrackingOpSpec = downcast(op, "stateTracking")?;
        Ok(Box::new(StateTrackingProcedureSpec {
            predicate: spec.predicate.clone(),
            count_label: spec.count_label.clone(),
            duration_label: spec.duration_label.clone(),
            duration_unit: spec.duration_unit,
        }) as Box<dyn ProcedureSpec>)
    })?;

    r.register("yield", Signature::default(), false, |op| {
        let spec: &opspec::YieldOpSpec = downcast(op, "yield")?;
        Ok(Box::new(YieldProcedureSpec { name: spec.name.clone() }) as Box<dyn ProcedureSpec>)
    })?;

    Ok(())
}
