//! `stateCount`/`stateDuration` sugar (spec's supplemented features),
//! grounded on `original_source/functions/state_tracking.go`'s
//! `stateTrackingBuiltin` Flux source:
//!
//! ```flux
//! stateCount = (fn, label="stateCount", table=<-) =>
//!     stateTracking(table:table, countLabel:label, fn:fn)
//! stateDuration = (fn, label="stateDuration", unit=1s, table=<-) =>
//!     stateTracking(table:table, durationLabel:label, fn:fn, durationUnit:unit)
//! ```
//!
//! There's no Flux front end in this engine (out of scope), so these
//! aren't textual macros — they're the same desugaring expressed as
//! plain constructors a caller building a `LogicalPlan` programmatically
//! can use instead of spelling out a bare `StateTrackingOpSpec`. Neither
//! is a registered procedure kind of its own: both always lower to the
//! single `"stateTracking"` kind, exactly as the Flux source only ever
//! calls through to `stateTracking`.

use query_core::{Duration, RowPredicateFn};

use crate::opspec::StateTrackingOpSpec;

/// The number of consecutive rows for which `predicate` holds,
/// resetting to 0 (and tagging the row `-1`) whenever it doesn't.
pub fn state_count(predicate: RowPredicateFn, label: impl Into<String>) -> StateTrackingOpSpec {
    StateTrackingOpSpec {
        predicate,
        count_label: label.into(),
        duration_label: String::new(),
        duration_unit: Duration(1_000_000_000),
    }
}

/// The elapsed time since `predicate` started holding, in `unit`,
/// resetting (and tagging the row `-1`) whenever it stops holding.
pub fn state_duration(
    predicate: RowPredicateFn,
    label: impl Into<String>,
    unit: Duration,
) -> StateTrackingOpSpec {
    StateTrackingOpSpec {
        predicate,
        count_label: String::new(),
        duration_label: label.into(),
        duration_unit: unit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_true() -> RowPredicateFn {
        RowPredicateFn::new(|_row, _reader: &dyn query_core::RowReader| Ok(true))
    }

    #[test]
    fn state_count_sets_only_count_label() {
        let spec = state_count(always_true(), "stateCount");
        assert_eq!(spec.count_label, "stateCount");
        assert!(spec.duration_label.is_empty());
    }

    #[test]
    fn state_duration_sets_only_duration_label() {
        let spec = state_duration(always_true(), "stateDuration", Duration(1_000_000_000));
        assert!(spec.count_label.is_empty());
        assert_eq!(spec.duration_label, "stateDuration");
        assert_eq!(spec.duration_unit, Duration(1_000_000_000));
    }
}
