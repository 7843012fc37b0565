//! Transformation kernels (spec §4.4): the per-operation row/block logic
//! that runs once a procedure's push-down chances are exhausted.
//!
//! Every kernel implements [`Transformation`] directly: `aggregate`
//! reduces a block to one row per key, `selector` picks one
//! (first/last) or several (sample) rows, and the rest rewrite rows in
//! place (derivative, difference, covariance, stateTracking, filter,
//! limit, group, window, range, join).

pub mod aggregate;
pub mod covariance;
pub mod derivative;
pub mod difference;
pub mod filter;
pub mod group;
pub mod join;
pub mod limit;
pub mod percentile;
pub mod range;
pub mod selector;
pub mod state_tracking;
pub mod window;
pub mod yield_sink;

use query_core::{Block, ColKind, ColMeta, Column, ColumnType, Result, Time};

use crate::dataset::Dataset;

/// Finds `block`'s value column and reads it as `f64`, widening
/// `Int`/`UInt` columns rather than only accepting `Float` — so
/// aggregate/derivative/difference kernels act on integer and unsigned
/// time series the same as spec.md's "integer/uint/float variants as
/// appropriate" requires, instead of silently falling through to a
/// row-count default.
pub fn value_column_as_f64(block: &Block) -> Option<Vec<f64>> {
    let idx = block.cols().iter().position(|c| c.kind == ColKind::Value)?;
    let col = block.column(idx);
    if let Some(v) = col.as_floats() {
        return Some(v.to_vec());
    }
    if let Some(v) = col.as_ints() {
        return Some(v.iter().map(|x| *x as f64).collect());
    }
    if let Some(v) = col.as_uints() {
        return Some(v.iter().map(|x| *x as f64).collect());
    }
    None
}

/// Copies row `row` of `block`'s column `idx` into `builder`'s column of
/// the same index, dispatching on the column's declared type. Shared by
/// the kernels that rewrite blocks schema-preserving (`window`,
/// `stateTracking`, `group`).
pub fn copy_row_cell(
    builder: &mut query_core::BlockBuilder,
    idx: usize,
    meta: &ColMeta,
    block: &Block,
    row: usize,
) -> Result<()> {
    let col = block.column(idx);
    if meta.kind == ColKind::Time {
        return builder.append_time(idx, col.as_times().unwrap()[row]);
    }
    match meta.typ {
        ColumnType::Float => builder.append_float(idx, col.as_floats().unwrap()[row]),
        ColumnType::Int => builder.append_int(idx, col.as_ints().unwrap()[row]),
        ColumnType::UInt => builder.append_uint(idx, col.as_uints().unwrap()[row]),
        ColumnType::Bool => builder.append_bool(idx, col.as_bools().unwrap()[row]),
        ColumnType::Time => builder.append_time(idx, col.as_times().unwrap()[row]),
        ColumnType::String => {
            if let Some(strs) = col.as_strings() {
                builder.append_string(idx, &strs[row])
            } else if let Column::CommonString(s) = col {
                builder.set_common_string(idx, s);
                Ok(())
            } else {
                Ok(())
            }
        }
    }
}

/// One dataflow node's behavior: consume an upstream block, fold it into
/// per-key state, and write finished rows into `Dataset`'s builders.
///
/// Kernels that reduce many blocks to one row per key (aggregate,
/// first/last) can't write that row until they know no more input is
/// coming for the key — `update_watermark` is their chance to flush
/// state for keys the watermark has now closed, right before the
/// executor calls `Dataset::advance_watermark` to emit them downstream.
pub trait Transformation: Send {
    fn process(&mut self, block: &Block, dataset: &mut Dataset) -> Result<()>;

    fn update_watermark(&mut self, _mark: Time, _dataset: &mut Dataset) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _dataset: &mut Dataset) -> Result<()> {
        Ok(())
    }
}

/// Reduces a block's float value column to a single scalar per output
/// row (sum, count, mean, min, max, stddev, spread, skew).
pub trait Aggregator: Send {
    fn reset(&mut self);
    fn add(&mut self, v: f64);
    /// Called once per row regardless of column type, so `count` works
    /// over non-float value columns too.
    fn add_row(&mut self) {}
    fn value(&self) -> f64;
}

/// Lets the executor's factory pick an aggregate kind at runtime and
/// still hand `AggregateTransformation` a concrete, `Sized` `A`.
impl Aggregator for Box<dyn Aggregator> {
    fn reset(&mut self) {
        (**self).reset()
    }
    fn add(&mut self, v: f64) {
        (**self).add(v)
    }
    fn add_row(&mut self) {
        (**self).add_row()
    }
    fn value(&self) -> f64 {
        (**self).value()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use query_core::{Allocator, Bounds, Tags, Time};

    use super::*;

    #[test]
    fn copy_row_cell_preserves_float_and_time_values() {
        let alloc = Arc::new(Allocator::unlimited());
        let mut src = query_core::BlockBuilder::new(Bounds::new(Time(0), Time(10)), Tags::new(), alloc.clone());
        let t = src.add_col(ColMeta::time("_time"));
        let v = src.add_col(ColMeta::value("_value", ColumnType::Float));
        src.append_time(t, Time(5)).unwrap();
        src.append_float(v, 42.0).unwrap();
        let block = src.block();

        let mut dst = query_core::BlockBuilder::new(Bounds::new(Time(0), Time(10)), Tags::new(), alloc);
        dst.add_col(ColMeta::time("_time"));
        dst.add_col(ColMeta::value("_value", ColumnType::Float));
        for (idx, meta) in block.cols().iter().enumerate() {
            copy_row_cell(&mut dst, idx, meta, &block, 0).unwrap();
        }
        let out = dst.block();
        assert_eq!(out.times(), &[Time(5)]);
        assert_eq!(out.column(1).as_floats().unwrap(), &[42.0]);
    }
}
