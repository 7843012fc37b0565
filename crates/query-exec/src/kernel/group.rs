//! `group` (spec §4.4). No `group.go`/`group_test.go` ships in this
//! pack's `original_source`; this kernel's shape is grounded on this
//! crate's own `BlockKey` model rather than the original
//! implementation. Re-keys blocks by projecting
//! their tag set down to `by` — tags are block-level (not per-row) in
//! this model, so regrouping is just choosing a different `BlockKey`
//! to append the block's rows into, no row-by-row tag inspection
//! needed.

use query_core::{Block, Result, Tags};

use crate::dataset::Dataset;
use crate::kernel::{copy_row_cell, Transformation};

pub struct GroupTransformation {
    by: Vec<String>,
}

impl GroupTransformation {
    pub fn new(by: Vec<String>) -> Self {
        Self { by }
    }

    fn project(&self, tags: &Tags) -> Tags {
        tags.iter()
            .filter(|(k, _)| self.by.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Transformation for GroupTransformation {
    fn process(&mut self, block: &Block, dataset: &mut Dataset) -> Result<()> {
        let new_tags = self.project(block.tags());
        let builder = dataset.builder_for(block.bounds(), new_tags);
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
    use crate::testutil::float_block;

    #[test]
    fn projects_tags_down_to_the_by_set() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = GroupTransformation::new(vec!["host".to_string()]);
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "serverA", &[(1, 1.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tags().get("host").map(String::as_str), Some("serverA"));
    }

    #[test]
    fn drops_tags_not_named_in_by() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = GroupTransformation::new(vec!["region".to_string()]);
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "serverA", &[(1, 1.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert!(out[0].tags().get("host").is_none());
    }
}
