//! `limit` (spec §4.4). No `limit.go`/`limit_test.go` ships in this
//! pack's `original_source`; this kernel's shape is grounded on this
//! crate's own `Transformation` contract rather than the original
//! implementation. Only reached when push-down into `from` didn't
//! apply (e.g. `limit` sits downstream of an operation that blocks
//! tunneling) — counts rows per key and drops everything past
//! `offset + n`.

use std::collections::HashMap;

use query_core::{Block, BlockKey, Result};

use crate::dataset::Dataset;
use crate::kernel::{copy_row_cell, Transformation};

pub struct LimitTransformation {
    n: i64,
    offset: i64,
    seen: HashMap<BlockKey, i64>,
}

impl LimitTransformation {
    pub fn new(n: i64, offset: i64) -> Self {
        Self {
            n,
            offset,
            seen: HashMap::new(),
        }
    }
}

impl Transformation for LimitTransformation {
    fn process(&mut self, block: &Block, dataset: &mut Dataset) -> Result<()> {
        let key = block.key();
        let seen = self.seen.entry(key).or_insert(0);
        if *seen >= self.offset + self.n {
            return Ok(());
        }
        let builder = dataset.builder_for(block.bounds(), block.tags().clone());
        if builder.is_schema_empty() {
            for col in block.cols() {
                builder.add_col(col.clone());
            }
        }
        for row in 0..block.num_rows() {
            if *seen >= self.offset + self.n {
                break;
            }
            if *seen >= self.offset {
                for (idx, meta) in block.cols().iter().enumerate() {
                    copy_row_cell(builder, idx, meta, block, row)?;
                }
            }
            *seen += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use query_core::{Allocator, Bounds, Time, TriggerSpec};

    use super::*;
    use crate::testutil::float_block;

    #[test]
    fn keeps_only_n_rows_after_offset() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = LimitTransformation::new(2, 1);
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "a", &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].column(1).as_floats().unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn counts_rows_across_multiple_blocks_for_the_same_key() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = LimitTransformation::new(1, 0);
        let bounds = Bounds::new(Time(0), Time(10));
        let b1 = float_block(bounds, "a", &[(1, 1.0)]);
        let b2 = float_block(bounds, "a", &[(2, 2.0)]);
        xf.process(&b1, &mut ds).unwrap();
        xf.process(&b2, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].column(1).as_floats().unwrap(), &[1.0]);
    }
}
