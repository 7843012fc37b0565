//! Block-building helpers shared by this crate's `#[cfg(test)]` modules
//! and the CLI's demo dataset, grounded on the teacher's pattern of a
//! small `testutil` module rather than duplicating builder boilerplate
//! in every test.

use std::sync::Arc;

use query_core::{Allocator, Block, BlockBuilder, Bounds, ColMeta, ColumnType, Tags, Time};

/// Builds a single-tag-set float block: `_time`/`_value` pairs plus one
/// `"host"` tag, matching the shape most kernel tests exercise.
pub fn float_block(bounds: Bounds, host: &str, rows: &[(i64, f64)]) -> Block {
    let alloc = Arc::new(Allocator::unlimited());
    let mut tags = Tags::new();
    tags.insert("host".to_string(), host.to_string());
    let mut builder = BlockBuilder::new(bounds, tags, alloc);
    let t = builder.add_col(ColMeta::time("_time"));
    let v = builder.add_col(ColMeta::value("_value", ColumnType::Float));
    for (time, value) in rows {
        builder.append_time(t, Time(*time)).unwrap();
        builder.append_float(v, *value).unwrap();
    }
    builder.block()
}

/// Asserts two blocks carry the same bounds, tags, and `(_time,
/// _value)` rows (NaN-tolerant, since several kernels legitimately
/// emit `NaN`).
pub fn assert_float_blocks_eq(actual: &Block, expected: &Block) {
    assert_eq!(actual.bounds(), expected.bounds(), "bounds mismatch");
    assert_eq!(actual.tags(), expected.tags(), "tags mismatch");
    assert_eq!(actual.times(), expected.times(), "time column mismatch");

    let a_idx = actual.cols().iter().position(|c| c.label == "_value").expect("_value column");
    let e_idx = expected.cols().iter().position(|c| c.label == "_value").expect("_value column");
    let a_vals = actual.column(a_idx).as_floats().expect("_value is float");
    let e_vals = expected.column(e_idx).as_floats().expect("_value is float");
    assert_eq!(a_vals.len(), e_vals.len(), "row count mismatch");
    for (a, e) in a_vals.iter().zip(e_vals) {
        if a.is_nan() || e.is_nan() {
            assert!(a.is_nan() && e.is_nan(), "expected both NaN, got {a} vs {e}");
        } else {
            assert!((a - e).abs() < 1e-9, "value mismatch: {a} vs {e}");
        }
    }
}
