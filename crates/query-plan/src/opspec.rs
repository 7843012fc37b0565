//! Operation kinds: the logical-plan `OpSpec` side and the physical-plan
//! `ProcedureSpec` side, one pair per registered kind (spec §4.1, §4.3).
//!
//! Both sides are trait objects rather than a closed enum: the function
//! registry (`crate::registry`) is what lets new kinds be added without
//! touching the planner, so the planner can only ever see `dyn OpSpec` /
//! `dyn ProcedureSpec`.

use std::any::Any;
use std::fmt::Debug;

use query_core::{Duration, RowPredicateFn};
use serde::{Deserialize, Serialize};

use crate::pushdown::PushDownRule;

/// A logical-plan operation's kind-specific parameters.
pub trait OpSpec: Any + Send + Sync + Debug {
    fn kind(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

/// A physical-plan procedure's kind-specific parameters.
///
/// `copy_spec` replaces Go's `Copy() ProcedureSpec`: push-down
/// duplication needs a deep clone of a subtree's specs, and trait objects
/// can't derive `Clone` directly.
pub trait ProcedureSpec: Any + Send + Sync + Debug {
    fn kind(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn copy_spec(&self) -> Box<dyn ProcedureSpec>;

    /// Push-down rules this procedure offers, if any (spec §4.3). Most
    /// kinds return an empty vec and simply remain a separate node.
    fn push_down_rules(&self) -> Vec<PushDownRule> {
        Vec::new()
    }

    /// True if `root` already carries pushed-down state that conflicts
    /// with what `self` would fuse into it — the rewriter then fuses into
    /// a duplicate of `root`'s ancestor chain instead of `root` itself, so
    /// the other consumer already depending on `root` keeps its reading.
    fn conflicts(&self, _root: &dyn ProcedureSpec) -> bool {
        false
    }

    /// Fuses `self`'s behavior into `root`'s spec (already matched by one
    /// of `push_down_rules()`, and already confirmed non-conflicting via
    /// `conflicts` — or into a fresh duplicate when it was conflicting).
    fn push_down(&self, _root: &mut dyn ProcedureSpec) {}
}

macro_rules! simple_opspec {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, Default)]
        pub struct $name;
        impl OpSpec for $name {
            fn kind(&self) -> &'static str {
                $kind
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

// --- Logical op specs -------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FromOpSpec {
    pub database: String,
}
impl OpSpec for FromOpSpec {
    fn kind(&self) -> &'static str {
        "from"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundsSpec {
    pub start: query_core::QueryTime,
    pub stop: query_core::QueryTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeOpSpec {
    pub bounds: BoundsSpec,
}
impl OpSpec for RangeOpSpec {
    fn kind(&self) -> &'static str {
        "range"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitOpSpec {
    pub n: i64,
    pub offset: i64,
}
impl OpSpec for LimitOpSpec {
    fn kind(&self) -> &'static str {
        "limit"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupOpSpec {
    pub by: Vec<String>,
}
impl OpSpec for GroupOpSpec {
    fn kind(&self) -> &'static str {
        "group"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone)]
pub struct FilterOpSpec {
    pub predicate: RowPredicateFn,
}
impl OpSpec for FilterOpSpec {
    fn kind(&self) -> &'static str {
        "filter"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

simple_opspec!(SumOpSpec, "sum");
simple_opspec!(CountOpSpec, "count");
simple_opspec!(MeanOpSpec, "mean");
simple_opspec!(MinOpSpec, "min");
simple_opspec!(MaxOpSpec, "max");
simple_opspec!(StddevOpSpec, "stddev");
simple_opspec!(SpreadOpSpec, "spread");
simple_opspec!(SkewOpSpec, "skew");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirstOpSpec {
    pub column: String,
    pub use_row_time: bool,
}
impl OpSpec for FirstOpSpec {
    fn kind(&self) -> &'static str {
        "first"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastOpSpec {
    pub column: String,
    pub use_row_time: bool,
}
impl OpSpec for LastOpSpec {
    fn kind(&self) -> &'static str {
        "last"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleOpSpec {
    pub column: String,
    pub use_row_time: bool,
    pub n: i64,
    pub pos: i64,
}
impl OpSpec for SampleOpSpec {
    fn kind(&self) -> &'static str {
        "sample"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PercentileOpSpec {
    pub percentile: f64,
    pub compression: f64,
    pub exact: bool,
}
impl OpSpec for PercentileOpSpec {
    fn kind(&self) -> &'static str {
        "percentile"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivativeOpSpec {
    pub unit: Duration,
    pub non_negative: bool,
    pub column: String,
}
impl OpSpec for DerivativeOpSpec {
    fn kind(&self) -> &'static str {
        "derivative"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifferenceOpSpec {
    pub non_negative: bool,
    pub column: String,
}
impl OpSpec for DifferenceOpSpec {
    fn kind(&self) -> &'static str {
        "difference"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CovarianceOpSpec {
    pub pearsonr: bool,
    pub on: Vec<String>,
}
impl OpSpec for CovarianceOpSpec {
    fn kind(&self) -> &'static str {
        "covariance"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinOpSpec {
    pub on: Vec<String>,
}
impl OpSpec for JoinOpSpec {
    fn kind(&self) -> &'static str {
        "join"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowOpSpec {
    pub every: Duration,
    pub period: Duration,
    pub start: Option<query_core::QueryTime>,
    pub round: Option<Duration>,
}
impl OpSpec for WindowOpSpec {
    fn kind(&self) -> &'static str {
        "window"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone)]
pub struct StateTrackingOpSpec {
    pub predicate: RowPredicateFn,
    pub count_label: String,
    pub duration_label: String,
    pub duration_unit: Duration,
}
impl OpSpec for StateTrackingOpSpec {
    fn kind(&self) -> &'static str {
        "stateTracking"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldOpSpec {
    pub name: String,
}
impl OpSpec for YieldOpSpec {
    fn kind(&self) -> &'static str {
        "yield"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}
