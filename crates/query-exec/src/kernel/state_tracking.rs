//! `stateTracking` (spec §4.4), grounded on
//! `original_source/functions/state_tracking.go`.
//!
//! Evaluates `predicate` against every row and appends up to two
//! derived columns: a run-length counter of consecutive matching rows
//! (`count_label`, reset to 1 whenever the predicate stops matching)
//! and the elapsed time since the current run started, in
//! `duration_unit` (`duration_label`). Either label may be empty, in
//! which case that column is omitted entirely — this is how the
//! `stateCount`/`stateDuration` sugar builtins each get only the
//! column they asked for, matching `state_tracking.go`'s
//! `countCol`/`durationCol` being left at `-1` when unset.

use std::collections::HashMap;

use query_core::{Block, BlockKey, ColMeta, ColumnType, Duration, Result, RowPredicateFn, Time};

use crate::dataset::Dataset;
use crate::kernel::{copy_row_cell, Transformation};

#[derive(Clone, Copy)]
struct RunState {
    count: i64,
    run_start: Time,
}

pub struct StateTrackingTransformation {
    predicate: RowPredicateFn,
    count_label: String,
    duration_label: String,
    duration_unit: Duration,
    state: HashMap<BlockKey, Option<RunState>>,
}

impl StateTrackingTransformation {
    pub fn new(
        predicate: RowPredicateFn,
        count_label: String,
        duration_label: String,
        duration_unit: Duration,
    ) -> Self {
        Self {
            predicate,
            count_label,
            duration_label,
            duration_unit,
            state: HashMap::new(),
        }
    }
}

impl Transformation for StateTrackingTransformation {
    fn process(&mut self, block: &Block, dataset: &mut Dataset) -> Result<()> {
        let key = block.key();
        let mut run = self.state.remove(&key).unwrap_or(None);

        let has_count = !self.count_label.is_empty();
        let has_duration = !self.duration_label.is_empty();

        let builder = dataset.builder_for(block.bounds(), block.tags().clone());
        if builder.is_schema_empty() {
            for col in block.cols() {
                builder.add_col(col.clone());
            }
            if has_count {
                builder.add_col(ColMeta::value(&self.count_label, ColumnType::Int));
            }
            if has_duration {
                builder.add_col(ColMeta::value(&self.duration_label, ColumnType::Int));
            }
        }
        let base_cols = block.cols().len();
        let count_idx = base_cols;
        let duration_idx = if has_count { base_cols + 1 } else { base_cols };

        for row in 0..block.num_rows() {
            for (idx, meta) in block.cols().iter().enumerate() {
                copy_row_cell(builder, idx, meta, block, row)?;
            }
            let matched = self.predicate.eval(row, block)?;
            let t = block.times()[row];
            if matched {
                run = Some(match run {
                    Some(r) => RunState {
                        count: r.count + 1,
                        run_start: r.run_start,
                    },
                    None => RunState { count: 1, run_start: t },
                });
                let r = run.unwrap();
                let elapsed = (t.0 - r.run_start.0).max(0) / self.duration_unit.nanos().max(1);
                if has_count {
                    builder.append_int(count_idx, r.count)?;
                }
                if has_duration {
                    builder.append_int(duration_idx, elapsed)?;
                }
            } else {
                run = None;
                if has_count {
                    builder.append_int(count_idx, -1)?;
                }
                if has_duration {
                    builder.append_int(duration_idx, -1)?;
                }
            }
        }
        self.state.insert(key, run);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use query_core::{Allocator, Bounds, RowReader, TriggerSpec};

    use super::*;
    use crate::testutil::float_block;

    fn above_five() -> RowPredicateFn {
        RowPredicateFn::new(|row, reader: &dyn RowReader| Ok(reader.get_float(1, row).unwrap_or(0.0) > 5.0))
    }

    #[test]
    fn count_runs_consecutive_matches_and_resets_on_a_miss() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf = StateTrackingTransformation::new(above_five(), "state_count".into(), String::new(), Duration(1));
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "a", &[(1, 6.0), (2, 7.0), (3, 1.0), (4, 8.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        let count_idx = out[0].cols().iter().position(|c| c.label == "state_count").unwrap();
        assert_eq!(out[0].column(count_idx).as_ints().unwrap(), &[1, 2, -1, 1]);
    }

    #[test]
    fn duration_label_only_adds_a_duration_column() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let mut xf =
            StateTrackingTransformation::new(above_five(), String::new(), "state_duration".into(), Duration(1));
        let bounds = Bounds::new(Time(0), Time(10));
        let block = float_block(bounds, "a", &[(10, 6.0), (20, 7.0)]);
        xf.process(&block, &mut ds).unwrap();
        let out = ds.drain_all();
        assert!(out[0].cols().iter().all(|c| c.label != "state_count"));
        let dur_idx = out[0].cols().iter().position(|c| c.label == "state_duration").unwrap();
        assert_eq!(out[0].column(dur_idx).as_ints().unwrap(), &[0, 10]);
    }
}
