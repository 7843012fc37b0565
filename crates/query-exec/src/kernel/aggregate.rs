//! Aggregate kernels: sum, count, mean, min, max, stddev, spread, skew
//! (spec §4.4, grounded on `original_source/functions/sum.go` and its
//! siblings).
//!
//! Every aggregate reduces a block's float value column to one row per
//! block, written at the block's stop time (matching the source
//! engine's convention of emitting aggregates at the window's end).
//! `count` is the one aggregate that's meaningful for any value column
//! type, so it counts rows directly rather than reading floats.

use std::collections::HashMap;

use query_core::{Block, BlockKey, ColMeta, ColumnType, Result, Time};

use crate::dataset::Dataset;
use crate::kernel::{Aggregator, Transformation};

#[derive(Default)]
pub struct SumAggregator(f64);
impl Aggregator for SumAggregator {
    fn reset(&mut self) {
        self.0 = 0.0;
    }
    fn add(&mut self, v: f64) {
        self.0 += v;
    }
    fn value(&self) -> f64 {
        self.0
    }
}

#[derive(Default)]
pub struct CountAggregator(i64);
impl Aggregator for CountAggregator {
    fn reset(&mut self) {
        self.0 = 0;
    }
    fn add(&mut self, _v: f64) {
        self.0 += 1;
    }
    fn add_row(&mut self) {
        self.0 += 1;
    }
    fn value(&self) -> f64 {
        self.0 as f64
    }
}

#[derive(Default)]
pub struct MeanAggregator {
    sum: f64,
    n: i64,
}
impl Aggregator for MeanAggregator {
    fn reset(&mut self) {
        self.sum = 0.0;
        self.n = 0;
    }
    fn add(&mut self, v: f64) {
        self.sum += v;
        self.n += 1;
    }
    fn value(&self) -> f64 {
        if self.n == 0 {
            f64::NAN
        } else {
            self.sum / self.n as f64
        }
    }
}

pub struct MinAggregator(f64);
impl Default for MinAggregator {
    fn default() -> Self {
        Self(f64::INFINITY)
    }
}
impl Aggregator for MinAggregator {
    fn reset(&mut self) {
        self.0 = f64::INFINITY;
    }
    fn add(&mut self, v: f64) {
        if v < self.0 {
            self.0 = v;
        }
    }
    fn value(&self) -> f64 {
        if self.0.is_infinite() {
            f64::NAN
        } else {
            self.0
        }
    }
}

pub struct MaxAggregator(f64);
impl Default for MaxAggregator {
    fn default() -> Self {
        Self(f64::NEG_INFINITY)
    }
}
impl Aggregator for MaxAggregator {
    fn reset(&mut self) {
        self.0 = f64::NEG_INFINITY;
    }
    fn add(&mut self, v: f64) {
        if v > self.0 {
            self.0 = v;
        }
    }
    fn value(&self) -> f64 {
        if self.0.is_infinite() {
            f64::NAN
        } else {
            self.0
        }
    }
}

/// Shared by stddev, spread, and skew: all three need the full sample,
/// not just a running sum, to compute their statistic.
#[derive(Default)]
pub struct SampleStatsAggregator {
    values: Vec<f64>,
    kind: StatKind,
}

#[derive(Clone, Copy, Default)]
pub enum StatKind {
    #[default]
    Stddev,
    Spread,
    Skew,
}

impl SampleStatsAggregator {
    pub fn new(kind: StatKind) -> Self {
        Self { values: Vec::new(), kind }
    }
}

impl Aggregator for SampleStatsAggregator {
    fn reset(&mut self) {
        self.values.clear();
    }
    fn add(&mut self, v: f64) {
        self.values.push(v);
    }
    fn value(&self) -> f64 {
        let n = self.values.len();
        match self.kind {
            StatKind::Spread => {
                if n == 0 {
                    f64::NAN
                } else {
                    let mut max = f64::NEG_INFINITY;
                    let mut min = f64::INFINITY;
                    for v in &self.values {
                        max = max.max(*v);
                        min = min.min(*v);
                    }
                    max - min
                }
            }
            StatKind::Stddev => sample_stddev(&self.values).unwrap_or(f64::NAN),
            StatKind::Skew => {
                let mean = self.values.iter().sum::<f64>() / n as f64;
                let sd = match sample_stddev(&self.values) {
                    Some(sd) if sd != 0.0 => sd,
                    _ => return f64::NAN,
                };
                if n < 3 {
                    return f64::NAN;
                }
                let m3 = self.values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n as f64;
                m3 / sd.powi(3)
            }
        }
    }
}

fn sample_stddev(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    Some(var.sqrt())
}

/// Generic aggregate transformation: folds every block into per-key
/// running state and, once the watermark closes a key, writes a single
/// `(_time=bounds.stop, _value=agg.value())` row for it.
pub struct AggregateTransformation<F, A> {
    new_agg: F,
    state: HashMap<BlockKey, A>,
}

impl<F, A> AggregateTransformation<F, A>
where
    F: Fn() -> A + Send,
    A: Aggregator,
{
    pub fn new(new_agg: F) -> Self {
        Self {
            new_agg,
            state: HashMap::new(),
        }
    }
}

impl<F, A> Transformation for AggregateTransformation<F, A>
where
    F: Fn() -> A + Send,
    A: Aggregator,
{
    fn process(&mut self, block: &Block, _dataset: &mut Dataset) -> Result<()> {
        let key = block.key();
        let agg = self.state.entry(key).or_insert_with(|| {
            let mut a = (self.new_agg)();
            a.reset();
            a
        });
        if let Some(vals) = crate::kernel::value_column_as_f64(block) {
            for v in vals {
                agg.add(v);
            }
        } else {
            for _ in 0..block.num_rows() {
                agg.add_row();
            }
        }
        Ok(())
    }

    fn update_watermark(&mut self, mark: Time, dataset: &mut Dataset) -> Result<()> {
        let closed: Vec<BlockKey> = self
            .state
            .keys()
            .filter(|k| k.bounds.stop <= mark)
            .cloned()
            .collect();
        for key in closed {
            let agg = self.state.remove(&key).expect("key came from state.keys()");
            let builder = dataset.builder_for(key.bounds, key.tags);
            let (time_idx, value_idx) = if builder.is_schema_empty() {
                let t = builder.add_col(ColMeta::time("_time"));
                let v = builder.add_col(ColMeta::value("_value", ColumnType::Float));
                (t, v)
            } else {
                (0, 1)
            };
            builder.append_time(time_idx, key.bounds.stop)?;
            builder.append_float(value_idx, agg.value())?;
        }
        Ok(())
    }

    fn finish(&mut self, dataset: &mut Dataset) -> Result<()> {
        self.update_watermark(Time(i64::MAX), dataset)
    }
}
