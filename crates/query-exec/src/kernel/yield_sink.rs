//! `yield` (spec §4.4). No `yield.go`/`yield_test.go` ships in this
//! pack's `original_source`; this kernel's shape is grounded on this
//! crate's own `Transformation` contract rather than the original
//! implementation.
//!
//! `yield` itself does no row transformation — it names a dataflow
//! branch's output for the result sink. The kernel is a pure
//! pass-through; [`crate::executor`] is what recognizes a node's kind
//! as `"yield"` and, once its dataset finalizes a block, routes it to
//! the [`crate::result`] sink under `name` instead of forwarding it to
//! any further downstream node.

use query_core::{Block, Result};

use crate::dataset::Dataset;
use crate::kernel::{copy_row_cell, Transformation};

pub struct YieldTransformation {
    name: String,
}

impl YieldTransformation {
    pub fn new(name: String) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Transformation for YieldTransformation {
    fn process(&mut self, block: &Block, dataset: &mut Dataset) -> Result<()> {
        let builder = dataset.builder_for(block.bounds(), block.tags().clone());
        if builder.is_schema_empty() {
            for col in block.cols() {
                builder.add_col(col.clone());
            }
        }
        for row in 0..block.num_rows() {
            for (idx, meta) in block.cols().iter().enumerate() {
                copy_row_cell(builder, idx, meta, block, row)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use query_core::{Allocator, Bounds, Time, TriggerSpec};

    use super::*;
    use crate::testutil::{assert_float_blocks_eq, float_block};

    #[test]
    fn passes_rows_through_unchanged() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = YieldTransformation::new("result".into());
        assert_eq!(xf.name(), "result");
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "a", &[(1, 1.0), (2, 2.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_float_blocks_eq(&out[0], &block);
    }
}
