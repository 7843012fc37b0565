//! `difference` (spec §4.4). No `difference.go` ships in this pack's
//! `original_source` (only `difference_test.go`); grounded on reading
//! that test file's cases rather than an implementation. Same
//! previous-row-carry shape as [`crate::kernel::derivative`], but
//! emits the raw delta rather than a rate.
//!
//! `non_negative` drops the row rather than emitting `NaN`, matching
//! `difference_test.go`'s non-negative cases. The value column is read
//! through [`crate::kernel::value_column_as_f64`] so int/uint value
//! columns difference the same as float ones.

use std::collections::HashMap;

use query_core::{Block, BlockKey, ColMeta, ColumnType, Result};

use crate::dataset::Dataset;
use crate::kernel::Transformation;

pub struct DifferenceTransformation {
    non_negative: bool,
    last: HashMap<BlockKey, f64>,
}

impl DifferenceTransformation {
    pub fn new(non_negative: bool) -> Self {
        Self {
            non_negative,
            last: HashMap::new(),
        }
    }
}

impl Transformation for DifferenceTransformation {
    fn process(&mut self, block: &Block, dataset: &mut Dataset) -> Result<()> {
        let Some(vals) = crate::kernel::value_column_as_f64(block) else {
            return Ok(());
        };
        let times = block.times();
        let key = block.key();

        let builder = dataset.builder_for(block.bounds(), block.tags().clone());
        let (time_idx, value_out_idx) = if builder.is_schema_empty() {
            let t = builder.add_col(ColMeta::time("_time"));
            let v = builder.add_col(ColMeta::value("_value", ColumnType::Float));
            (t, v)
        } else {
            (0, 1)
        };

        let mut prev = self.last.get(&key).copied();
        for (t, v) in times.iter().zip(vals.into_iter()) {
            if let Some(pv) = prev {
                let delta = v - pv;
                if !(self.non_negative && delta < 0.0) {
                    builder.append_time(time_idx, *t)?;
                    builder.append_float(value_out_idx, delta)?;
                }
            }
            prev = Some(v);
        }
        if let Some(p) = prev {
            self.last.insert(key, p);
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
    fn emits_delta_between_consecutive_rows() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = DifferenceTransformation::new(false);
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "a", &[(1, 5.0), (2, 8.0), (3, 3.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].column(1).as_floats().unwrap(), &[3.0, -5.0]);
    }

    #[test]
    fn non_negative_drops_the_violating_row_instead_of_emitting_nan() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = DifferenceTransformation::new(true);
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "a", &[(1, 5.0), (2, 8.0), (3, 3.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert_eq!(out[0].column(1).as_floats().unwrap(), &[3.0]);
    }
}
