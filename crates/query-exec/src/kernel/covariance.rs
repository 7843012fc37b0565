//! `covariance` (spec §4.4). No `covariance.go` ships in this pack's
//! `original_source` (only `covariance_test.go`); the pearson-r form
//! below is grounded on reading that test file's cases rather than an
//! implementation.
//!
//! Operates downstream of a `join` (see [`crate::kernel::group`]'s
//! sibling `join` note below) on blocks carrying exactly two float
//! value columns — the joined pair. Accumulates the running sums
//! needed for sample covariance (and, when `pearsonr` is set, divides
//! by the product of the two sample standard deviations) per key,
//! flushing once the watermark closes that key.

use std::collections::HashMap;

use query_core::{Block, BlockKey, ColKind, ColMeta, ColumnType, Result, Time};

use crate::dataset::Dataset;
use crate::kernel::Transformation;

#[derive(Default, Clone, Copy)]
struct Accum {
    n: u64,
    sum_x: f64,
    sum_y: f64,
    sum_xy: f64,
    sum_x2: f64,
    sum_y2: f64,
}

impl Accum {
    fn add(&mut self, x: f64, y: f64) {
        self.n += 1;
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xy += x * y;
        self.sum_x2 += x * x;
        self.sum_y2 += y * y;
    }

    fn covariance(&self) -> f64 {
        if self.n < 2 {
            return f64::NAN;
        }
        let n = self.n as f64;
        (self.sum_xy - self.sum_x * self.sum_y / n) / (n - 1.0)
    }

    fn pearson_r(&self) -> f64 {
        if self.n < 2 {
            return f64::NAN;
        }
        let n = self.n as f64;
        let cov = self.sum_xy - self.sum_x * self.sum_y / n;
        let var_x = self.sum_x2 - self.sum_x * self.sum_x / n;
        let var_y = self.sum_y2 - self.sum_y * self.sum_y / n;
        let denom = (var_x * var_y).sqrt();
        if denom == 0.0 {
            f64::NAN
        } else {
            cov / denom
        }
    }
}

pub struct CovarianceTransformation {
    pearsonr: bool,
    state: HashMap<BlockKey, Accum>,
}

impl CovarianceTransformation {
    pub fn new(pearsonr: bool) -> Self {
        Self {
            pearsonr,
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
            let accum = self.state.remove(&key).expect("key came from state.keys()");
            let value = if self.pearsonr {
                accum.pearson_r()
            } else {
                accum.covariance()
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

impl Transformation for CovarianceTransformation {
    fn process(&mut self, block: &Block, _dataset: &mut Dataset) -> Result<()> {
        let value_cols: Vec<usize> = block
            .cols()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ColKind::Value && c.typ == ColumnType::Float)
            .map(|(i, _)| i)
            .collect();
        if value_cols.len() < 2 {
            return Ok(());
        }
        let Some(xs) = block.column(value_cols[0]).as_floats() else {
            return Ok(());
        };
        let Some(ys) = block.column(value_cols[1]).as_floats() else {
            return Ok(());
        };
        let key = block.key();
        let accum = self.state.entry(key).or_default();
        for (x, y) in xs.iter().zip(ys) {
            accum.add(*x, *y);
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

    use query_core::{Allocator, BlockBuilder, Bounds, ColMeta, ColumnType, Tags, TriggerSpec};

    use super::*;

    fn joined_block(bounds: Bounds, rows: &[(i64, f64, f64)]) -> Block {
        let alloc = Arc::new(Allocator::unlimited());
        let mut builder = BlockBuilder::new(bounds, Tags::new(), alloc);
        let t = builder.add_col(ColMeta::time("_time"));
        let x = builder.add_col(ColMeta::value("_value_x", ColumnType::Float));
        let y = builder.add_col(ColMeta::value("_value_y", ColumnType::Float));
        for (time, xv, yv) in rows {
            builder.append_time(t, Time(*time)).unwrap();
            builder.append_float(x, *xv).unwrap();
            builder.append_float(y, *yv).unwrap();
        }
        builder.block()
    }

    #[test]
    fn perfectly_correlated_series_has_pearson_r_of_one() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = CovarianceTransformation::new(true);
        let bounds = Bounds::new(Time(0), Time(10));
        let block = joined_block(bounds, &[(1, 1.0, 2.0), (2, 2.0, 4.0), (3, 3.0, 6.0)]);
        xf.process(&block, &mut ds).unwrap();
        xf.finish(&mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out.len(), 1);
        let r = out[0].column(1).as_floats().unwrap()[0];
        assert!((r - 1.0).abs() < 1e-9, "expected pearson r ~1.0, got {r}");
    }

    #[test]
    fn fewer_than_two_samples_is_nan() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = CovarianceTransformation::new(false);
        let bounds = Bounds::new(Time(0), Time(10));
        let block = joined_block(bounds, &[(1, 1.0, 2.0)]);
        xf.process(&block, &mut ds).unwrap();
        xf.finish(&mut ds).unwrap();
        let out = ds.drain_all();
        assert!(out[0].column(1).as_floats().unwrap()[0].is_nan());
    }
}
