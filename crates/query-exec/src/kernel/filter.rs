//! `filter` (spec §4.4). No `filter.go`/`filter_test.go` ships in this
//! pack's `original_source`; the row-predicate shape below is grounded
//! on `query_core::RowPredicateFn` and this crate's own push-down
//! contract, not on the original implementation.
//!
//! Reached only when push-down couldn't fuse the predicate into `from`
//! (e.g. the filter sits past an aggregate); otherwise `from` already
//! applies it at the storage layer and this kernel never runs for
//! that procedure.

use query_core::{Block, Result, RowPredicateFn};

use crate::dataset::Dataset;
use crate::kernel::{copy_row_cell, Transformation};

pub struct FilterTransformation {
    predicate: RowPredicateFn,
}

impl FilterTransformation {
    pub fn new(predicate: RowPredicateFn) -> Self {
        Self { predicate }
    }
}

impl Transformation for FilterTransformation {
    fn process(&mut self, block: &Block, dataset: &mut Dataset) -> Result<()> {
        let builder = dataset.builder_for(block.bounds(), block.tags().clone());
        if builder.is_schema_empty() {
            for col in block.cols() {
                builder.add_col(col.clone());
            }
        }
        for row in 0..block.num_rows() {
            if self.predicate.eval(row, block)? {
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

    use query_core::{Allocator, Bounds, RowReader, Time, TriggerSpec};

    use super::*;
    use crate::testutil::float_block;

    #[test]
    fn keeps_only_rows_matching_the_predicate() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let value_col = 1;
        let predicate = RowPredicateFn::new(move |row, reader: &dyn RowReader| {
            Ok(reader.get_float(value_col, row).unwrap_or(0.0) > 5.0)
        });
        let mut xf = FilterTransformation::new(predicate);
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "a", &[(1, 3.0), (2, 7.0), (3, 9.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].column(1).as_floats().unwrap(), &[7.0, 9.0]);
    }
}
