//! `first`/`last` (row selectors) and `sample` (index selector), spec
//! §4.4, grounded on `original_source/functions/last.go` and
//! `sample.go`.
//!
//! `first`/`last` fold across every block belonging to a key, keeping
//! only the row with the earliest/latest time, and flush that single
//! winner once the watermark closes the key — the same deferred-flush
//! shape as the aggregate kernels, since the winner can't be known
//! until all of a key's input has arrived.

use std::collections::HashMap;

use query_core::{Block, BlockKey, ColKind, ColMeta, ColumnType, Result, Time};
use rand::Rng;

use crate::dataset::Dataset;
use crate::kernel::Transformation;

#[derive(Clone, Copy)]
struct Candidate {
    time: Time,
    value: f64,
}

pub struct FirstLastTransformation {
    /// `true` picks the maximum time (`last`); `false` the minimum (`first`).
    pick_latest: bool,
    state: HashMap<BlockKey, Candidate>,
}

impl FirstLastTransformation {
    pub fn first() -> Self {
        Self {
            pick_latest: false,
            state: HashMap::new(),
        }
    }

    pub fn last() -> Self {
        Self {
            pick_latest: true,
            state: HashMap::new(),
        }
    }

    fn better(&self, candidate: Time, current: Time) -> bool {
        if self.pick_latest {
            candidate >= current
        } else {
            candidate <= current
        }
    }

    fn flush_closed(&mut self, mark: Time, dataset: &mut Dataset) -> Result<()> {
        let closed: Vec<BlockKey> = self
            .state
            .keys()
            .filter(|k| k.bounds.stop <= mark)
            .cloned()
            .collect();
        for key in closed {
            let candidate = self.state.remove(&key).expect("key came from state.keys()");
            let builder = dataset.builder_for(key.bounds, key.tags);
            let (time_idx, value_idx) = if builder.is_schema_empty() {
                let t = builder.add_col(ColMeta::time("_time"));
                let v = builder.add_col(ColMeta::value("_value", ColumnType::Float));
                (t, v)
            } else {
                (0, 1)
            };
            builder.append_time(time_idx, candidate.time)?;
            builder.append_float(value_idx, candidate.value)?;
        }
        Ok(())
    }
}

impl Transformation for FirstLastTransformation {
    fn process(&mut self, block: &Block, _dataset: &mut Dataset) -> Result<()> {
        let value_idx = block
            .cols()
            .iter()
            .position(|c| c.kind == ColKind::Value && c.typ == ColumnType::Float);
        let Some(vi) = value_idx else { return Ok(()) };
        let Some(vals) = block.column(vi).as_floats() else {
            return Ok(());
        };
        let times = block.times();
        let key = block.key();
        for (t, v) in times.iter().zip(vals) {
            let entry = self.state.entry(key.clone());
            match entry {
                std::collections::hash_map::Entry::Occupied(mut e) => {
                    if self.better(*t, e.get().time) {
                        e.insert(Candidate { time: *t, value: *v });
                    }
                }
                std::collections::hash_map::Entry::Vacant(e) => {
                    e.insert(Candidate { time: *t, value: *v });
                }
            }
        }
        Ok(())
    }

    fn update_watermark(&mut self, mark: Time, dataset: &mut Dataset) -> Result<()> {
        self.flush_closed(mark, dataset)
    }

    fn finish(&mut self, dataset: &mut Dataset) -> Result<()> {
        self.flush_closed(Time(i64::MAX), dataset)
    }
}

/// Picks every `n`th row by position, carrying the stride offset
/// across blocks for the same key the way `sample.go`'s
/// `SampleSelector.selectSample` does (`for i := offset; i < l; i +=
/// N`, then `offset = i - l` so the next block picks up where this one
/// left off). `pos < 0` (the original's default) seeds the starting
/// offset with one random draw in `0..n` per key, matching
/// `SampleSelector.reset`'s `rand.Intn(s.N)`; a non-negative `pos` is
/// used directly, matching `Pos >= 0`.
pub struct SampleTransformation {
    n: i64,
    pos: i64,
    offsets: HashMap<BlockKey, i64>,
}

impl SampleTransformation {
    pub fn new(n: i64, pos: i64) -> Self {
        Self {
            n: n.max(1),
            pos,
            offsets: HashMap::new(),
        }
    }

    fn starting_offset(&self) -> i64 {
        if self.pos >= 0 {
            self.pos % self.n
        } else {
            rand::thread_rng().gen_range(0..self.n)
        }
    }
}

impl Transformation for SampleTransformation {
    fn process(&mut self, block: &Block, dataset: &mut Dataset) -> Result<()> {
        let rows = block.num_rows() as i64;
        if rows == 0 {
            return Ok(());
        }
        let key = block.key();
        let offset = match self.offsets.get(&key) {
            Some(o) => *o,
            None => self.starting_offset(),
        };

        let value_idx = block
            .cols()
            .iter()
            .position(|c| c.kind == ColKind::Value && c.typ == ColumnType::Float);
        let times = block.times();

        let builder = dataset.builder_for(block.bounds(), block.tags().clone());
        let (time_idx, val_idx) = if builder.is_schema_empty() {
            let t = builder.add_col(ColMeta::time("_time"));
            let v = builder.add_col(ColMeta::value("_value", ColumnType::Float));
            (t, v)
        } else {
            (0, 1)
        };

        let mut i = offset;
        while i < rows {
            let idx = i as usize;
            builder.append_time(time_idx, times[idx])?;
            if let Some(vi) = value_idx {
                if let Some(v) = block.column(vi).as_floats().and_then(|f| f.get(idx)) {
                    builder.append_float(val_idx, *v)?;
                }
            }
            i += self.n;
        }
        self.offsets.insert(key, i - rows);
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
    fn first_keeps_earliest_row_for_a_key() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = FirstLastTransformation::first();
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "a", &[(3, 30.0), (1, 10.0), (2, 20.0)]);
        xf.process(&block, &mut ds).unwrap();
        xf.finish(&mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].times(), &[Time(1)]);
        assert_eq!(out[0].column(1).as_floats().unwrap(), &[10.0]);
    }

    #[test]
    fn last_keeps_latest_row_across_blocks() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = FirstLastTransformation::last();
        let bounds = Bounds::new(Time(0), Time(10));
        let b1 = float_block(bounds, "a", &[(1, 10.0)]);
        let b2 = float_block(bounds, "a", &[(5, 50.0), (3, 30.0)]);
        xf.process(&b1, &mut ds).unwrap();
        xf.process(&b2, &mut ds).unwrap();
        xf.finish(&mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].times(), &[Time(5)]);
        assert_eq!(out[0].column(1).as_floats().unwrap(), &[50.0]);
    }

    #[test]
    fn sample_picks_every_nth_row_from_a_fixed_pos() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = SampleTransformation::new(2, 0);
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "a", &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].times(), &[Time(1), Time(3)]);
        assert_eq!(out[0].column(1).as_floats().unwrap(), &[1.0, 3.0]);
    }

    #[test]
    fn sample_carries_its_stride_offset_across_blocks() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = SampleTransformation::new(3, 2);
        let bounds = Bounds::new(Time(0), Time(10));
        // pos=2, n=3: block one has 4 rows (indices 0..3), picks index 2
        // (time 3) and leaves offset 5-4=1; block two picks up at local
        // index 1 (time 6) instead of restarting from pos.
        let b1 = float_block(bounds, "a", &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)]);
        let b2 = float_block(bounds, "a", &[(5, 5.0), (6, 6.0), (7, 7.0)]);
        xf.process(&b1, &mut ds).unwrap();
        xf.process(&b2, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].times(), &[Time(3), Time(6)]);
    }
}
