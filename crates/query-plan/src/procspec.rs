//! Concrete `ProcedureSpec` implementations and their push-down rules
//! (spec §4.1, §4.3). Each struct mirrors the `OpSpec` of the same
//! operation, but carries resolved (not `QueryTime`-relative) state and
//! owns the push-down behavior.

use std::any::Any;

use query_core::{Bounds, Duration, RowPredicateFn, MIN_TIME};

use crate::opspec::ProcedureSpec;
use crate::pushdown::PushDownRule;

macro_rules! copy_via_clone {
    ($ty:ty) => {
        fn copy_spec(&self) -> Box<dyn ProcedureSpec> {
            Box::new(self.clone())
        }
    };
}

/// The only push-down root in this system: a raw storage read. Every
/// field a consumer might fuse into `from` is pre-declared here with a
/// `*_set` flag, since trait objects can't grow fields dynamically.
#[derive(Debug, Clone)]
pub struct FromProcedureSpec {
    pub database: String,
    pub bounds_set: bool,
    pub bounds: Bounds,
    pub limit_set: bool,
    pub points_limit: i64,
    pub series_limit: i64,
    pub series_offset: i64,
    pub descending_set: bool,
    pub descending: bool,
    pub aggregate_set: bool,
    pub aggregate_method: String,
    pub grouping_set: bool,
    pub grouping: Vec<String>,
    pub filter: Option<RowPredicateFn>,
}

impl FromProcedureSpec {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            bounds_set: false,
            bounds: Bounds {
                start: MIN_TIME,
                stop: MIN_TIME,
            },
            limit_set: false,
            points_limit: 0,
            series_limit: 0,
            series_offset: 0,
            descending_set: false,
            descending: false,
            aggregate_set: false,
            aggregate_method: String::new(),
            grouping_set: false,
            grouping: Vec::new(),
            filter: None,
        }
    }
}

impl ProcedureSpec for FromProcedureSpec {
    fn kind(&self) -> &'static str {
        "from"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(FromProcedureSpec);
}

fn as_from(spec: &mut dyn ProcedureSpec) -> &mut FromProcedureSpec {
    spec.as_any_mut()
        .downcast_mut::<FromProcedureSpec>()
        .expect("push-down root must be a FromProcedureSpec")
}

fn from_ref(spec: &dyn ProcedureSpec) -> &FromProcedureSpec {
    spec.as_any()
        .downcast_ref::<FromProcedureSpec>()
        .expect("push-down root must be a FromProcedureSpec")
}

#[derive(Debug, Clone)]
pub struct RangeProcedureSpec {
    pub bounds: Bounds,
}
impl ProcedureSpec for RangeProcedureSpec {
    fn kind(&self) -> &'static str {
        "range"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(RangeProcedureSpec);
    fn push_down_rules(&self) -> Vec<PushDownRule> {
        vec![PushDownRule::new("from")]
    }
    fn conflicts(&self, root: &dyn ProcedureSpec) -> bool {
        from_ref(root).bounds_set
    }
    fn push_down(&self, root: &mut dyn ProcedureSpec) {
        let from = as_from(root);
        from.bounds_set = true;
        from.bounds = self.bounds;
    }
}

#[derive(Debug, Clone, Default)]
pub struct LimitProcedureSpec {
    pub n: i64,
    pub offset: i64,
}
impl ProcedureSpec for LimitProcedureSpec {
    fn kind(&self) -> &'static str {
        "limit"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(LimitProcedureSpec);
    fn push_down_rules(&self) -> Vec<PushDownRule> {
        vec![PushDownRule::new("from").through(&["range", "group"])]
    }
    fn conflicts(&self, root: &dyn ProcedureSpec) -> bool {
        from_ref(root).limit_set
    }
    fn push_down(&self, root: &mut dyn ProcedureSpec) {
        let from = as_from(root);
        from.limit_set = true;
        from.points_limit = self.n;
        from.series_offset = self.offset;
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupProcedureSpec {
    pub by: Vec<String>,
}
impl ProcedureSpec for GroupProcedureSpec {
    fn kind(&self) -> &'static str {
        "group"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(GroupProcedureSpec);
    fn push_down_rules(&self) -> Vec<PushDownRule> {
        vec![PushDownRule::new("from").through(&["range", "limit"])]
    }
    // group and aggregate can't both be pushed onto the same `from`: an
    // already-aggregated read has no per-row tags left to regroup, and
    // an already-grouped read would need the aggregate re-applied per
    // group rather than once. Either ordering forces the later one to
    // duplicate the ancestor chain instead.
    fn conflicts(&self, root: &dyn ProcedureSpec) -> bool {
        let from = from_ref(root);
        from.grouping_set || from.aggregate_set
    }
    fn push_down(&self, root: &mut dyn ProcedureSpec) {
        let from = as_from(root);
        from.grouping_set = true;
        from.grouping = self.by.clone();
    }
}

#[derive(Debug, Clone)]
pub struct FilterProcedureSpec {
    pub predicate: RowPredicateFn,
}
impl ProcedureSpec for FilterProcedureSpec {
    fn kind(&self) -> &'static str {
        "filter"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(FilterProcedureSpec);
    fn push_down_rules(&self) -> Vec<PushDownRule> {
        vec![PushDownRule::new("from").through(&["range", "group", "limit"])]
    }
    // Filters always compose (logical AND), so there's never a conflict
    // that forces duplicating the source read.
    fn push_down(&self, root: &mut dyn ProcedureSpec) {
        let predicate = self.predicate.clone();
        let from = as_from(root);
        from.filter = Some(match from.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }
}

/// Shared physical spec for the simple aggregate family (sum, count,
/// mean, min, max, stddev, spread, skew): each just names the aggregate
/// method `from` should apply at the storage layer.
#[derive(Debug, Clone)]
pub struct AggregateProcedureSpec {
    pub kind: &'static str,
    pub method: &'static str,
}
impl ProcedureSpec for AggregateProcedureSpec {
    fn kind(&self) -> &'static str {
        self.kind
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(AggregateProcedureSpec);
    fn push_down_rules(&self) -> Vec<PushDownRule> {
        vec![PushDownRule::new("from").through(&["range", "group", "limit", "filter"])]
    }
    fn conflicts(&self, root: &dyn ProcedureSpec) -> bool {
        let from = from_ref(root);
        from.grouping_set || (from.aggregate_set && from.aggregate_method != self.method)
    }
    fn push_down(&self, root: &mut dyn ProcedureSpec) {
        let from = as_from(root);
        from.aggregate_set = true;
        from.aggregate_method = self.method.to_string();
    }
}

/// `first`/`last` additionally claim the bounds+limit+descending cluster:
/// reading one row in the right direction from storage makes the
/// downstream selector trivial (spec §4.1, §9 Open Questions).
#[derive(Debug, Clone)]
pub struct FirstLastProcedureSpec {
    pub kind: &'static str,
    pub column: String,
    pub use_row_time: bool,
    pub descending: bool,
}
impl ProcedureSpec for FirstLastProcedureSpec {
    fn kind(&self) -> &'static str {
        self.kind
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(FirstLastProcedureSpec);
    fn push_down_rules(&self) -> Vec<PushDownRule> {
        vec![PushDownRule::new("from").through(&["range", "group"])]
    }
    fn conflicts(&self, root: &dyn ProcedureSpec) -> bool {
        let from = from_ref(root);
        from.limit_set || from.descending_set
    }
    fn push_down(&self, root: &mut dyn ProcedureSpec) {
        let from = as_from(root);
        from.limit_set = true;
        from.points_limit = 1;
        from.descending_set = true;
        from.descending = self.descending;
    }
}

#[derive(Debug, Clone, Default)]
pub struct SampleProcedureSpec {
    pub column: String,
    pub use_row_time: bool,
    pub n: i64,
    pub pos: i64,
}
impl ProcedureSpec for SampleProcedureSpec {
    fn kind(&self) -> &'static str {
        "sample"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(SampleProcedureSpec);
    // No push-down: sampling can't be expressed as a storage-level
    // reduction the way a single aggregate or a one-row limit can.
}

#[derive(Debug, Clone, Default)]
pub struct PercentileProcedureSpec {
    pub percentile: f64,
    pub compression: f64,
    pub exact: bool,
    pub column: String,
}
impl ProcedureSpec for PercentileProcedureSpec {
    fn kind(&self) -> &'static str {
        "percentile"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(PercentileProcedureSpec);
    // Not pushed down: `from`'s aggregate slot holds a single method
    // name and percentile needs extra parameters (percentile,
    // compression) it has no room for.
}

#[derive(Debug, Clone, Default)]
pub struct DerivativeProcedureSpec {
    pub unit: Duration,
    pub non_negative: bool,
    pub column: String,
}
impl ProcedureSpec for DerivativeProcedureSpec {
    fn kind(&self) -> &'static str {
        "derivative"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(DerivativeProcedureSpec);
}

#[derive(Debug, Clone, Default)]
pub struct DifferenceProcedureSpec {
    pub non_negative: bool,
    pub column: String,
}
impl ProcedureSpec for DifferenceProcedureSpec {
    fn kind(&self) -> &'static str {
        "difference"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(DifferenceProcedureSpec);
}

#[derive(Debug, Clone, Default)]
pub struct CovarianceProcedureSpec {
    pub pearsonr: bool,
    pub on: Vec<String>,
}
impl ProcedureSpec for CovarianceProcedureSpec {
    fn kind(&self) -> &'static str {
        "covariance"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(CovarianceProcedureSpec);
}

#[derive(Debug, Clone, Default)]
pub struct JoinProcedureSpec {
    pub on: Vec<String>,
}
impl ProcedureSpec for JoinProcedureSpec {
    fn kind(&self) -> &'static str {
        "join"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(JoinProcedureSpec);
}

#[derive(Debug, Clone)]
pub struct WindowProcedureSpec {
    pub every: Duration,
    pub period: Duration,
    pub start: Option<query_core::Time>,
    pub round: Option<Duration>,
}
impl ProcedureSpec for WindowProcedureSpec {
    fn kind(&self) -> &'static str {
        "window"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(WindowProcedureSpec);
}

#[derive(Debug, Clone)]
pub struct StateTrackingProcedureSpec {
    pub predicate: RowPredicateFn,
    pub count_label: String,
    pub duration_label: String,
    pub duration_unit: Duration,
}
impl ProcedureSpec for StateTrackingProcedureSpec {
    fn kind(&self) -> &'static str {
        "stateTracking"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(StateTrackingProcedureSpec);
}

#[derive(Debug, Clone)]
pub struct YieldProcedureSpec {
    pub name: String,
}
impl ProcedureSpec for YieldProcedureSpec {
    fn kind(&self) -> &'static str {
        "yield"
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    copy_via_clone!(YieldProcedureSpec);
}
