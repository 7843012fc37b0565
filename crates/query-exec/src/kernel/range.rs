//! Runtime fallback for `range` (spec §4.3) when push-down into `from`
//! didn't apply — e.g. a `range` reached downstream of a `window` or
//! `join` that blocks tunneling. Drops rows outside `bounds` rather
//! than relying on the storage layer to have already done it.

use query_core::{Block, Bounds, Result};

use crate::dataset::Dataset;
use crate::kernel::{copy_row_cell, Transformation};

pub struct RangeTransformation {
    bounds: Bounds,
}

impl RangeTransformation {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }
}

impl Transformation for RangeTransformation {
    fn process(&mut self, block: &Block, dataset: &mut Dataset) -> Result<()> {
        if !block.bounds().overlaps(&self.bounds) {
            return Ok(());
        }
        let out_bounds = Bounds::new(
            self.bounds.start.max(block.bounds().start),
            self.bounds.stop.min(block.bounds().stop),
        );
        let builder = dataset.builder_for(out_bounds, block.tags().clone());
        if builder.is_schema_empty() {
            for col in block.cols() {
                builder.add_col(col.clone());
            }
        }
        let times = block.times();
        for row in 0..block.num_rows() {
            if self.bounds.contains(times[row]) {
                for (idx, meta) in block.cols().iter().enumerate() {
                    copy_row_cell(builder, idx, meta, block, row)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use query_core::{Allocator, Time, TriggerSpec};

    use super::*;
    use crate::testutil::float_block;

    #[test]
    fn drops_rows_outside_bounds() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = RangeTransformation::new(Bounds::new(Time(2), Time(4)));
        let block = float_block(Bounds::new(Time(0), Time(10)), "a", &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].column(1).as_floats().unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn non_overlapping_block_produces_no_output() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = RangeTransformation::new(Bounds::new(Time(100), Time(200)));
        let block = float_block(Bounds::new(Time(0), Time(10)), "a", &[(1, 1.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert!(out.is_empty());
    }
}
