//! Storage read abstraction (spec §4.2), grounded on
//! `original_source/query/storage.go`'s `StorageReader` interface.
//!
//! The planner's `from` pushes bounds, limit, descending, grouping, an
//! aggregate method, and a filter predicate down into one
//! `FromProcedureSpec`; a `StorageReader` consumes that and produces the
//! blocks it already describes. This engine ships one in-memory
//! implementation, reused by tests and the CLI's demo dataset — a real
//! deployment would swap in a reader backed by whatever time-series
//! store holds the data.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};

use query_core::{Block, BlockBuilder, QueryError, Result};
use query_plan::procspec::FromProcedureSpec;

#[async_trait]
pub trait StorageReader: Send + Sync {
    async fn read(&self, spec: &FromProcedureSpec) -> Result<BoxStream<'static, Block>>;
}

/// Fixed set of pre-built blocks keyed by database name, filtered at
/// read time by `spec`'s bounds and (if set) limit/descending.
#[derive(Default)]
pub struct MemoryStorageReader {
    databases: HashMap<String, Vec<Block>>,
}

impl MemoryStorageReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, database: impl Into<String>, blocks: Vec<Block>) {
        self.databases.insert(database.into(), blocks);
    }
}

#[async_trait]
impl StorageReader for MemoryStorageReader {
    async fn read(&self, spec: &FromProcedureSpec) -> Result<BoxStream<'static, Block>> {
        let blocks = self
            .databases
            .get(&spec.database)
            .ok_or_else(|| QueryError::Schema(format!("unknown database {}", spec.database)))?;

        let mut matched: Vec<Block> = blocks
            .iter()
            .filter(|b| !spec.bounds_set || b.bounds().overlaps(&spec.bounds))
            .cloned()
            .collect();

        if spec.descending_set && spec.descending {
            matched.sort_by(|a, b| b.bounds().start.cmp(&a.bounds().start));
        } else {
            matched.sort_by(|a, b| a.bounds().start.cmp(&b.bounds().start));
        }

        if spec.limit_set && spec.points_limit > 0 {
            matched = truncate_to_points(matched, spec.points_limit as usize, spec.series_offset as usize);
        }

        Ok(Box::pin(stream::iter(matched)))
    }
}

fn truncate_to_points(blocks: Vec<Block>, limit: usize, offset: usize) -> Vec<Block> {
    let mut remaining_offset = offset;
    let mut remaining = limit;
    let mut out = Vec::new();
    for block in blocks {
        if remaining == 0 {
            break;
        }
        if remaining_offset >= block.num_rows() {
            remaining_offset -= block.num_rows();
            continue;
        }
        let take = (block.num_rows() - remaining_offset).min(remaining);
        out.push(slice_block(&block, remaining_offset, take));
        remaining -= take;
        remaining_offset = 0;
    }
    out
}

fn slice_block(block: &Block, start: usize, len: usize) -> Block {
    let alloc = std::sync::Arc::new(query_core::Allocator::unlimited());
    let mut builder = BlockBuilder::new(block.bounds(), block.tags().clone(), alloc);
    for col in block.cols() {
        builder.add_col(col.clone());
    }
    for row in start..start + len {
        for (idx, meta) in block.cols().iter().enumerate() {
            let _ = crate::kernel::copy_row_cell(&mut builder, idx, meta, block, row);
        }
    }
    builder.block()
}
