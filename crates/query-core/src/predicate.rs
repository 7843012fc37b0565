//! Compiled row predicates, generalizing `execute.RowPredicateFn` from
//! `state_tracking.go`. Used by `filter` push-down matching and by
//! `stateTracking`'s per-row state machine.
//!
//! The textual expression compiler is out of scope (spec §1): a
//! `RowPredicateFn` here wraps an already-compiled closure, as if handed
//! down from the (unmodeled) front end.

use std::sync::Arc;

use crate::block::RowReader;
use crate::error::Result;

#[derive(Clone)]
pub struct RowPredicateFn {
    f: Arc<dyn Fn(usize, &dyn RowReader) -> Result<bool> + Send + Sync>,
}

impl RowPredicateFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(usize, &dyn RowReader) -> Result<bool> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    pub fn eval(&self, row: usize, reader: &dyn RowReader) -> Result<bool> {
        (self.f)(row, reader)
    }

    /// Composes two predicates with logical AND, short-circuiting on the
    /// first `false` or error.
    pub fn and(self, other: RowPredicateFn) -> RowPredicateFn {
        RowPredicateFn::new(move |row, reader| Ok(self.eval(row, reader)? && other.eval(row, reader)?))
    }
}

impl std::fmt::Debug for RowPredicateFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RowPredicateFn(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeReader;
    impl RowReader for FakeReader {
        fn cols(&self) -> &[crate::ColMeta] {
            &[]
        }
        fn get_bool(&self, _col: usize, _row: usize) -> Option<bool> {
            None
        }
        fn get_int(&self, _col: usize, _row: usize) -> Option<i64> {
            None
        }
        fn get_uint(&self, _col: usize, _row: usize) -> Option<u64> {
            None
        }
        fn get_float(&self, _col: usize, row: usize) -> Option<f64> {
            Some(row as f64)
        }
        fn get_string(&self, _col: usize, _row: usize) -> Option<&str> {
            None
        }
        fn get_time(&self, _col: usize, _row: usize) -> Option<crate::Time> {
            None
        }
    }

    #[test]
    fn and_short_circuits_on_first_false() {
        let always_true = RowPredicateFn::new(|_row, _reader| Ok(true));
        let checks_row_value = RowPredicateFn::new(|row, reader: &dyn RowReader| {
            Ok(reader.get_float(0, row).unwrap_or(0.0) > 1.0)
        });
        let combined = always_true.and(checks_row_value);
        assert!(!combined.eval(0, &FakeReader).unwrap());
        assert!(combined.eval(2, &FakeReader).unwrap());
    }
}
