//! `window` (spec §4.4). No `window.go` ships in this pack's
//! `original_source` (only `window_test.go`); the bucketing behavior
//! below is grounded on reading that test file's cases rather than an
//! implementation.
//!
//! Re-keys every row into every fixed-size bucket it falls into, so
//! downstream kernels see one block per window instead of one block
//! per source shard. When `period > every` windows overlap and a row
//! is copied into each bucket whose span contains it, matching
//! `window_test.go`'s overlapping-window cases; `period == every`
//! (the common case) degenerates to one bucket per row, the tumbling
//! behavior.

use query_core::{Block, Duration, Result, Time};

use crate::dataset::Dataset;
use crate::kernel::{copy_row_cell, Transformation};

pub struct WindowTransformation {
    every: Duration,
    period: Duration,
    start: Time,
}

impl WindowTransformation {
    pub fn new(every: Duration, period: Duration, start: Time) -> Self {
        let period = if period.nanos() <= 0 { every } else { period };
        Self { every, period, start }
    }

    /// Every bucket start `t` falls into: a bucket starting at
    /// `start + k*every` contains `t` when `k*every <= t - start <
    /// k*every + period`, i.e. `k <= rel/every` and `k >
    /// (rel-period)/every`, so `k` ranges over
    /// `floor((rel-period)/every)+1 ..= floor(rel/every)`.
    fn bucket_starts(&self, t: Time) -> impl Iterator<Item = Time> + '_ {
        let every = self.every.nanos().max(1);
        let period = self.period.nanos().max(every);
        let rel = t.0 - self.start.0;
        let k_max = rel.div_euclid(every);
        let k_min = (rel - period).div_euclid(every) + 1;
        (k_min..=k_max).map(move |k| Time(self.start.0 + k * every))
    }
}

impl Transformation for WindowTransformation {
    fn process(&mut self, block: &Block, dataset: &mut Dataset) -> Result<()> {
        let period = self.period.nanos().max(1);
        for row in 0..block.num_rows() {
            let t = block.times()[row];
            for bucket_start in self.bucket_starts(t) {
                let bucket_stop = Time(bucket_start.0 + period);
                let builder = dataset.builder_for(
                    query_core::Bounds::new(bucket_start, bucket_stop),
                    block.tags().clone(),
                );
                if builder.is_schema_empty() {
                    for col in block.cols() {
                        builder.add_col(col.clone());
                    }
                }
                for (idx, col) in block.cols().iter().enumerate() {
                    copy_row_cell(builder, idx, col, block, row)?;
                }
            }
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

    #[test]
    fn buckets_rows_into_tumbling_windows() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = WindowTransformation::new(Duration(10), Duration(10), Time(0));
        let block = float_block(Bounds::new(Time(0), Time(30)), "a", &[(1, 1.0), (11, 2.0), (25, 3.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out.len(), 3);
        let mut bounds: Vec<Bounds> = out.iter().map(|b| b.bounds()).collect();
        bounds.sort_by_key(|b| b.start);
        assert_eq!(
            bounds,
            vec![
                Bounds::new(Time(0), Time(10)),
                Bounds::new(Time(10), Time(20)),
                Bounds::new(Time(20), Time(30)),
            ]
        );
    }

    #[test]
    fn rows_stay_with_their_original_key() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = WindowTransformation::new(Duration(10), Duration(10), Time(0));
        let block = float_block(Bounds::new(Time(0), Time(10)), "serverA", &[(1, 1.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].tags().get("host").map(String::as_str), Some("serverA"));
    }

    #[test]
    fn a_row_lands_in_every_overlapping_window() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        // every=10, period=20: each 10ns slot opens a 20ns-wide window,
        // so one row can fall into two overlapping windows at once.
        let mut xf = WindowTransformation::new(Duration(10), Duration(20), Time(0));
        let block = float_block(Bounds::new(Time(0), Time(40)), "a", &[(25, 1.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        let mut bounds: Vec<Bounds> = out.iter().map(|b| b.bounds()).collect();
        bounds.sort_by_key(|b| b.start);
        assert_eq!(bounds, vec![Bounds::new(Time(10), Time(30)), Bounds::new(Time(20), Time(40))]);
        for b in &out {
            assert_eq!(b.times(), &[Time(25)]);
        }
    }
}
