//! `derivative` (spec §4.4). No `derivative.go` ships in this pack's
//! `original_source` (only `derivative_test.go`); the rate-per-unit and
//! `non_negative`-drops-the-row behavior below is grounded on reading
//! that test file's cases rather than an implementation.
//!
//! Rate of change between consecutive rows of the same key, scaled to
//! `unit` (e.g. per-second). Needs only the previous row, so unlike the
//! aggregate family it rewrites rows as they arrive instead of
//! buffering for the watermark; state survives across blocks only to
//! carry that one previous row forward.
//!
//! `non_negative` drops the row rather than emitting `NaN` on a
//! negative rate, matching `derivative_test.go`'s "int non negative"
//! case, which produces one fewer output row rather than a NaN value
//! (that same test case is why the value column is read through
//! [`crate::kernel::value_column_as_f64`] rather than a float-only
//! filter: an int value column must still produce a derivative).

use std::collections::HashMap;

use query_core::{Block, BlockKey, ColMeta, ColumnType, Duration, Result, Time};

use crate::dataset::Dataset;
use crate::kernel::Transformation;

pub struct DerivativeTransformation {
    unit: Duration,
    non_negative: bool,
    last: HashMap<BlockKey, (Time, f64)>,
}

impl DerivativeTransformation {
    pub fn new(unit: Duration, non_negative: bool) -> Self {
        Self {
            unit,
            non_negative,
            last: HashMap::new(),
        }
    }
}

impl Transformation for DerivativeTransformation {
    fn process(&mut self, block: &Block, dataset: &mut Dataset) -> Result<()> {
        let Some(vals) = crate::kernel::value_column_as_f64(block) else {
            return Ok(());
        };
        let times = block.times();
        let key = block.key();
        let unit_nanos = self.unit.nanos().max(1) as f64;

        let builder = dataset.builder_for(block.bounds(), block.tags().clone());
        let (time_idx, value_out_idx) = if builder.is_schema_empty() {
            let t = builder.add_col(ColMeta::time("_time"));
            let v = builder.add_col(ColMeta::value("_value", ColumnType::Float));
            (t, v)
        } else {
            (0, 1)
        };

        let mut prev = self.last.get(&key).copied();
        for (t, v) in times.iter().zip(vals.into_iter()) {
            if let Some((pt, pv)) = prev {
                let dt = (t.0 - pt.0) as f64;
                if dt <= 0.0 {
                    prev = Some((*t, v));
                    continue;
                }
                let rate = (v - pv) / dt * unit_nanos;
                if !(self.non_negative && rate < 0.0) {
                    builder.append_time(time_idx, *t)?;
                    builder.append_float(value_out_idx, rate)?;
                }
            }
            prev = Some((*t, v));
        }
        if let Some(p) = prev {
            self.last.insert(key, p);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use query_core::{Allocator, Bounds, TriggerSpec};

    use super::*;
    use crate::testutil::float_block;

    fn unit_second() -> Duration {
        Duration(1_000_000_000)
    }

    #[test]
    fn computes_rate_per_unit_between_consecutive_rows() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = DerivativeTransformation::new(unit_second(), false);
        let bounds = Bounds::new(Time(0), Time(10_000_000_000));
        let block = float_block(bounds, "a", &[(0, 10.0), (1_000_000_000, 20.0), (2_000_000_000, 20.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out.len(), 1);
        let rates = out[0].column(1).as_floats().unwrap();
        assert_eq!(rates, &[10.0, 0.0]);
    }

    #[test]
    fn non_negative_drops_the_violating_row_instead_of_emitting_nan() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = DerivativeTransformation::new(unit_second(), true);
        let bounds = Bounds::new(Time(0), Time(10_000_000_000));
        // int non-negative case: 20 -> 10 -> 20, the first delta is negative
        // and must be dropped entirely, not emitted as NaN.
        let block = float_block(
            bounds,
            "a",
            &[(0, 20.0), (1_000_000_000, 10.0), (2_000_000_000, 20.0)],
        );
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out.len(), 1);
        let rates = out[0].column(1).as_floats().unwrap();
        assert_eq!(rates, &[10.0]);
    }

    #[test]
    fn carries_previous_row_across_blocks() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = DerivativeTransformation::new(unit_second(), false);
        let b1 = float_block(Bounds::new(Time(0), Time(1_000_000_000)), "a", &[(0, 10.0)]);
        let b2 = float_block(
            Bounds::new(Time(1_000_000_000), Time(2_000_000_000)),
            "a",
            &[(1_000_000_000, 15.0)],
        );
        xf.process(&b1, &mut ds).unwrap();
        xf.process(&b2, &mut ds).unwrap();
        let out = ds.drain_all();
        let b2_out = out.iter().find(|b| b.num_rows() > 0).expect("derivative row in second block");
        assert_eq!(b2_out.column(1).as_floats().unwrap(), &[5.0]);
    }
}
