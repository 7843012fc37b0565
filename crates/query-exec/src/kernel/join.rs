//! `join` (spec §4.4). No original reference: this pack's
//! `original_source` has no `join.go`/`join_test.go` at all, so the
//! exact-time inner-join semantics below are this crate's own default,
//! not derived from the original implementation.
//!
//! Unlike every other kernel, `join` has two upstream parents rather
//! than one, so it doesn't implement [`crate::kernel::Transformation`]
//! directly — [`crate::executor`] special-cases nodes of this kind and
//! calls `process_left`/`process_right` according to which parent edge
//! a block arrived on. Rows are matched by exact time equality within
//! a key (inner join); this is the shape `covariance`'s global form
//! consumes downstream, which expects exactly two float value columns
//! per output row.
//!
//! `on` names the tag keys the join groups by: a left and right block
//! match when they agree on every tag in `on` (other tags are dropped
//! from the joined key, the same way a `group by` projection discards
//! tags outside its own `by` list). An empty `on` falls back to
//! matching the full tag set, so two single-series inputs still join
//! without the caller having to name every tag.

use std::collections::HashMap;

use query_core::{Block, BlockKey, ColKind, ColMeta, ColumnType, Result, Tags, Time};

use crate::dataset::Dataset;

#[derive(Default)]
struct Side {
    rows: HashMap<Time, f64>,
}

pub struct JoinTransformation {
    on: Vec<String>,
    left: HashMap<BlockKey, Side>,
    right: HashMap<BlockKey, Side>,
}

impl JoinTransformation {
    pub fn new(on: Vec<String>) -> Self {
        Self { on, left: HashMap::new(), right: HashMap::new() }
    }

    /// Projects `block`'s key down to just the `on` tags (or the full
    /// tag set when `on` is empty), so rows from two blocks that agree
    /// on the join tags land in the same bucket even if they carry
    /// other, unrelated tags.
    fn join_key(&self, block: &Block) -> BlockKey {
        if self.on.is_empty() {
            return block.key();
        }
        let tags: Tags = self
            .on
            .iter()
            .filter_map(|k| block.tags().get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        BlockKey { bounds: block.bounds(), tags }
    }

    fn ingest(map: &mut HashMap<BlockKey, Side>, key: BlockKey, block: &Block) {
        let value_idx = block
            .cols()
            .iter()
            .position(|c| c.kind == ColKind::Value && c.typ == ColumnType::Float);
        let Some(vi) = value_idx else { return };
        let Some(vals) = block.column(vi).as_floats() else {
            return;
        };
        let side = map.entry(key).or_default();
        for (t, v) in block.times().iter().zip(vals) {
            side.rows.insert(*t, *v);
        }
    }

    pub fn process_left(&mut self, block: &Block, _dataset: &mut Dataset) -> Result<()> {
        let key = self.join_key(block);
        Self::ingest(&mut self.left, key, block);
        Ok(())
    }

    pub fn process_right(&mut self, block: &Block, _dataset: &mut Dataset) -> Result<()> {
        let key = self.join_key(block);
        Self::ingest(&mut self.right, key, block);
        Ok(())
    }

    fn flush_closed(&mut self, mark: Time, dataset: &mut Dataset) -> Result<()> {
        let closed: Vec<BlockKey> = self
            .left
            .keys()
            .filter(|k| k.bounds.stop <= mark && self.right.contains_key(*k))
            .cloned()
            .collect();
        for key in closed {
            let left = self.left.remove(&key).expect("key came from self.left.keys()");
            let Some(right) = self.right.remove(&key) else { continue };
            let builder = dataset.builder_for(key.bounds, key.tags);
            let (time_idx, x_idx, y_idx) = if builder.is_schema_empty() {
                let t = builder.add_col(ColMeta::time("_time"));
                let x = builder.add_col(ColMeta::value("_value_x", ColumnType::Float));
                let y = builder.add_col(ColMeta::value("_value_y", ColumnType::Float));
                (t, x, y)
            } else {
                (0, 1, 2)
            };
            let mut times: Vec<Time> = left.rows.keys().copied().collect();
            times.sort();
            for t in times {
                if let (Some(x), Some(y)) = (left.rows.get(&t), right.rows.get(&t)) {
                    builder.append_time(time_idx, t)?;
                    builder.append_float(x_idx, *x)?;
                    builder.append_float(y_idx, *y)?;
                }
            }
        }
        Ok(())
    }

    pub fn update_watermark(&mut self, mark: Time, dataset: &mut Dataset) -> Result<()> {
        self.flush_closed(mark, dataset)
    }

    pub fn finish(&mut self, dataset: &mut Dataset) -> Result<()> {
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
    fn matches_rows_by_exact_time_within_a_key() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = JoinTransformation::new(vec!["host".to_string()]);
        let bounds = Bounds::new(Time(0), Time(10));
        let left = float_block(bounds, "a", &[(1, 10.0), (2, 20.0)]);
        // right has no row at t=2, so only t=1 should join.
        let right = float_block(bounds, "a", &[(1, 100.0), (3, 300.0)]);
        xf.process_left(&left, &mut ds).unwrap();
        xf.process_right(&right, &mut ds).unwrap();
        xf.finish(&mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].num_rows(), 1);
        assert_eq!(out[0].times(), &[Time(1)]);
        assert_eq!(out[0].column(1).as_floats().unwrap(), &[10.0]);
        assert_eq!(out[0].column(2).as_floats().unwrap(), &[100.0]);
    }

    /// Like `float_block`, but with an extra tag beyond `host` so tests
    /// can check that `on` ignores tags it doesn't name.
    fn tagged_block(bounds: Bounds, host: &str, region: &str, rows: &[(i64, f64)]) -> Block {
        let alloc = Arc::new(Allocator::unlimited());
        let mut tags = Tags::new();
        tags.insert("host".to_string(), host.to_string());
        tags.insert("region".to_string(), region.to_string());
        let mut builder = query_core::BlockBuilder::new(bounds, tags, alloc);
        let t = builder.add_col(ColMeta::time("_time"));
        let v = builder.add_col(ColMeta::value("_value", ColumnType::Float));
        for (time, value) in rows {
            builder.append_time(t, Time(*time)).unwrap();
            builder.append_float(v, *value).unwrap();
        }
        builder.block()
    }

    #[test]
    fn on_ignores_tags_it_does_not_name() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = JoinTransformation::new(vec!["host".to_string()]);
        let bounds = Bounds::new(Time(0), Time(10));
        // same host, different region on each side: with on=["host"] they
        // still join, since region isn't part of the join key.
        let left = tagged_block(bounds, "a", "us", &[(1, 10.0)]);
        let right = tagged_block(bounds, "a", "eu", &[(1, 100.0)]);
        xf.process_left(&left, &mut ds).unwrap();
        xf.process_right(&right, &mut ds).unwrap();
        xf.finish(&mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].column(1).as_floats().unwrap(), &[10.0]);
        assert_eq!(out[0].column(2).as_floats().unwrap(), &[100.0]);
    }

    #[test]
    fn on_keeps_different_join_tag_values_separate() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = JoinTransformation::new(vec!["host".to_string()]);
        let bounds = Bounds::new(Time(0), Time(10));
        let left = float_block(bounds, "a", &[(1, 10.0)]);
        let right = float_block(bounds, "b", &[(1, 100.0)]);
        xf.process_left(&left, &mut ds).unwrap();
        xf.process_right(&right, &mut ds).unwrap();
        xf.finish(&mut ds).unwrap();
        assert!(ds.drain_all().is_empty());
    }

    #[test]
    fn unmatched_key_on_only_one_side_never_flushes() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = JoinTransformation::new(vec![]);
        let bounds = Bounds::new(Time(0), Time(10));
        let left = float_block(bounds, "a", &[(1, 10.0)]);
        xf.process_left(&left, &mut ds).unwrap();
        xf.finish(&mut ds).unwrap();
        let out = ds.drain_all();
        assert!(out.is_empty());
    }
}
