//! The columnar `Block` type and its mutable `BlockBuilder` counterpart
//! (spec §3, §4.5).
//!
//! A `Block` is the unit of data flowing between transformations:
//! immutable, bounded by a `Bounds` window, tagged with an immutable tag
//! set, and physically a set of typed per-column buffers sharing one row
//! count (the time column's length).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::alloc::Allocator;
use crate::error::{QueryError, Result};
use crate::time::{Bounds, Time};

/// Tag key -> tag value. `BTreeMap` keeps iteration order deterministic,
/// which matters for stable JSON round-trips and for using `Tags` as part
/// of a hashable block key.
pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Int,
    UInt,
    Float,
    String,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColKind {
    Time,
    Tag,
    Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColMeta {
    pub label: String,
    #[serde(rename = "type")]
    pub typ: ColumnType,
    pub kind: ColKind,
    #[serde(default)]
    pub common: bool,
}

impl ColMeta {
    pub fn time(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            typ: ColumnType::Time,
            kind: ColKind::Time,
            common: false,
        }
    }

    pub fn value(label: impl Into<String>, typ: ColumnType) -> Self {
        Self {
            label: label.into(),
            typ,
            kind: ColKind::Value,
            common: false,
        }
    }

    pub fn tag(label: impl Into<String>, common: bool) -> Self {
        Self {
            label: label.into(),
            typ: ColumnType::String,
            kind: ColKind::Tag,
            common,
        }
    }
}

/// Per-column typed storage. `CommonString` is the space optimization for
/// `Common=true` tag columns: one value shared by every row instead of a
/// repeated per-row buffer.
#[derive(Debug, Clone)]
pub enum Column {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    UInt(Vec<u64>),
    Float(Vec<f64>),
    String(Vec<String>),
    Time(Vec<Time>),
    CommonString(String),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Bool(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::UInt(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::String(v) => v.len(),
            Column::Time(v) => v.len(),
            Column::CommonString(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Column::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Column::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_uints(&self) -> Option<&[u64]> {
        match self {
            Column::UInt(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bools(&self) -> Option<&[bool]> {
        match self {
            Column::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Column::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_times(&self) -> Option<&[Time]> {
        match self {
            Column::Time(v) => Some(v),
            _ => None,
        }
    }
}

fn empty_column_for(typ: ColumnType) -> Column {
    match typ {
        ColumnType::Bool => Column::Bool(Vec::new()),
        ColumnType::Int => Column::Int(Vec::new()),
        ColumnType::UInt => Column::UInt(Vec::new()),
        ColumnType::Float => Column::Float(Vec::new()),
        ColumnType::String => Column::String(Vec::new()),
        ColumnType::Time => Column::Time(Vec::new()),
    }
}

/// Charges `bytes` against `alloc` for as long as any `Block` clone
/// sharing this guard is alive, and returns them on the final drop.
/// Wrapped in an `Arc` so cloning a `Block` (fan-out to several
/// downstream nodes) shares one charge instead of releasing it once
/// per clone.
#[derive(Debug)]
struct BlockBytes {
    alloc: Arc<Allocator>,
    bytes: i64,
}

impl Drop for BlockBytes {
    fn drop(&mut self) {
        self.alloc.free(self.bytes);
    }
}

/// An immutable columnar chunk of rows sharing `bounds` and `tags`.
#[derive(Debug, Clone)]
pub struct Block {
    bounds: Bounds,
    tags: Tags,
    cols: Vec<ColMeta>,
    columns: Vec<Column>,
    bytes: Arc<BlockBytes>,
}

impl Block {
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    pub fn column(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    pub fn time_col_index(&self) -> usize {
        self.cols
            .iter()
            .position(|c| c.kind == ColKind::Time)
            .expect("block invariant: exactly one time column")
    }

    pub fn times(&self) -> &[Time] {
        self.columns[self.time_col_index()]
            .as_times()
            .expect("time column must store Time values")
    }

    pub fn num_rows(&self) -> usize {
        self.times().len()
    }

    pub fn key(&self) -> BlockKey {
        BlockKey {
            bounds: self.bounds,
            tags: self.tags.clone(),
        }
    }

    /// Validates the invariants from spec §3: exactly one time column,
    /// common-tag values matching `Tags`, equal-length value columns, and
    /// in-bounds timestamps.
    pub fn validate(&self) -> Result<()> {
        let time_cols = self.cols.iter().filter(|c| c.kind == ColKind::Time).count();
        if time_cols != 1 {
            return Err(QueryError::schema(format!(
                "block must have exactly one time column, found {time_cols}"
            )));
        }
        let n = self.num_rows();
        for (meta, col) in self.cols.iter().zip(&self.columns) {
            match meta.kind {
                ColKind::Tag if meta.common => {
                    if !matches!(col, Column::CommonString(_)) {
                        return Err(QueryError::schema(format!(
                            "common tag column {} must store a single value",
                            meta.label
                        )));
                    }
                    if let Column::CommonString(v) = col {
                        if self.tags.get(&meta.label).map(String::as_str) != Some(v.as_str()) {
                            return Err(QueryError::schema(format!(
                                "common tag column {} value does not match block tags",
                                meta.label
                            )));
                        }
                    }
                }
                ColKind::Time | ColKind::Tag | ColKind::Value => {
                    if col.len() != n {
                        return Err(QueryError::schema(format!(
                            "column {} length {} does not match block row count {}",
                            meta.label,
                            col.len(),
                            n
                        )));
                    }
                }
            }
        }
        for t in self.times() {
            if !self.bounds.contains(*t) {
                return Err(QueryError::schema(format!(
                    "time value {t:?} outside block bounds {:?}",
                    self.bounds
                )));
            }
        }
        Ok(())
    }
}

/// Column-indexed row access used by row predicates and row selectors
/// (derivative gates, `stateTracking`, `filter`, `first`/`last`).
pub trait RowReader {
    fn cols(&self) -> &[ColMeta];
    fn get_bool(&self, col: usize, row: usize) -> Option<bool>;
    fn get_int(&self, col: usize, row: usize) -> Option<i64>;
    fn get_uint(&self, col: usize, row: usize) -> Option<u64>;
    fn get_float(&self, col: usize, row: usize) -> Option<f64>;
    fn get_string(&self, col: usize, row: usize) -> Option<&str>;
    fn get_time(&self, col: usize, row: usize) -> Option<Time>;
}

impl RowReader for Block {
    fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    fn get_bool(&self, col: usize, row: usize) -> Option<bool> {
        match &self.columns[col] {
            Column::Bool(v) => v.get(row).copied(),
            _ => None,
        }
    }

    fn get_int(&self, col: usize, row: usize) -> Option<i64> {
        match &self.columns[col] {
            Column::Int(v) => v.get(row).copied(),
            _ => None,
        }
    }

    fn get_uint(&self, col: usize, row: usize) -> Option<u64> {
        match &self.columns[col] {
            Column::UInt(v) => v.get(row).copied(),
            _ => None,
        }
    }

    fn get_float(&self, col: usize, row: usize) -> Option<f64> {
        match &self.columns[col] {
            Column::Float(v) => v.get(row).copied(),
            _ => None,
        }
    }

    fn get_string(&self, col: usize, row: usize) -> Option<&str> {
        match &self.columns[col] {
            Column::String(v) => v.get(row).map(String::as_str),
            Column::CommonString(v) => Some(v.as_str()),
            _ => None,
        }
    }

    fn get_time(&self, col: usize, row: usize) -> Option<Time> {
        match &self.columns[col] {
            Column::Time(v) => v.get(row).copied(),
            _ => None,
        }
    }
}

/// Identifies a distinct output stream inside a `Dataset` (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub bounds: Bounds,
    pub tags: Tags,
}

/// Mutable, append-only builder for one block key. Column growth debits
/// the shared `Allocator`; `block()` returns an immutable snapshot.
pub struct BlockBuilder {
    bounds: Bounds,
    tags: Tags,
    cols: Vec<ColMeta>,
    columns: Vec<Column>,
    alloc: Arc<Allocator>,
    bytes: i64,
}

fn type_size(typ: ColumnType) -> i64 {
    match typ {
        ColumnType::Bool => 1,
        ColumnType::Int | ColumnType::UInt | ColumnType::Float | ColumnType::Time => 8,
        ColumnType::String => 16, // amortized estimate; strings are heap-allocated besides
    }
}

impl BlockBuilder {
    pub fn new(bounds: Bounds, tags: Tags, alloc: Arc<Allocator>) -> Self {
        Self {
            bounds,
            tags,
            cols: Vec::new(),
            columns: Vec::new(),
            alloc,
            bytes: 0,
        }
    }

    /// Adds a column, returning its index. For a `Common=true` tag column
    /// the caller must immediately follow with `set_common_string`.
    pub fn add_col(&mut self, meta: ColMeta) -> usize {
        let idx = self.cols.len();
        let col = if meta.kind == ColKind::Tag && meta.common {
            Column::CommonString(String::new())
        } else {
            empty_column_for(meta.typ)
        };
        self.cols.push(meta);
        self.columns.push(col);
        idx
    }

    pub fn set_common_string(&mut self, idx: usize, value: &str) {
        self.columns[idx] = Column::CommonString(value.to_string());
    }

    /// Debits `n` bytes from the shared allocator and, once it succeeds,
    /// tallies them so `block()` can hand the same amount back on drop.
    fn charge(&mut self, n: i64) -> Result<()> {
        self.alloc.alloc(n)?;
        self.bytes += n;
        Ok(())
    }

    pub fn append_bool(&mut self, idx: usize, v: bool) -> Result<()> {
        self.charge(type_size(ColumnType::Bool))?;
        if let Column::Bool(buf) = &mut self.columns[idx] {
            buf.push(v);
        }
        Ok(())
    }

    pub fn append_int(&mut self, idx: usize, v: i64) -> Result<()> {
        self.charge(type_size(ColumnType::Int))?;
        if let Column::Int(buf) = &mut self.columns[idx] {
            buf.push(v);
        }
        Ok(())
    }

    pub fn append_uint(&mut self, idx: usize, v: u64) -> Result<()> {
        self.charge(type_size(ColumnType::UInt))?;
        if let Column::UInt(buf) = &mut self.columns[idx] {
            buf.push(v);
        }
        Ok(())
    }

    pub fn append_float(&mut self, idx: usize, v: f64) -> Result<()> {
        self.charge(type_size(ColumnType::Float))?;
        if let Column::Float(buf) = &mut self.columns[idx] {
            buf.push(v);
        }
        Ok(())
    }

    pub fn append_string(&mut self, idx: usize, v: &str) -> Result<()> {
        self.charge(type_size(ColumnType::String))?;
        if let Column::String(buf) = &mut self.columns[idx] {
            buf.push(v.to_string());
        }
        Ok(())
    }

    pub fn append_time(&mut self, idx: usize, v: Time) -> Result<()> {
        self.charge(type_size(ColumnType::Time))?;
        if let Column::Time(buf) = &mut self.columns[idx] {
            buf.push(v);
        }
        Ok(())
    }

    pub fn append_times(&mut self, idx: usize, vs: &[Time]) -> Result<()> {
        self.charge(type_size(ColumnType::Time) * vs.len() as i64)?;
        if let Column::Time(buf) = &mut self.columns[idx] {
            buf.extend_from_slice(vs);
        }
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.cols
            .iter()
            .position(|c| c.kind == ColKind::Time)
            .map(|i| self.columns[i].len())
            .unwrap_or(0)
    }

    pub fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    pub fn col_index(&self, label: &str) -> Option<usize> {
        self.cols.iter().position(|c| c.label == label)
    }

    pub fn is_schema_empty(&self) -> bool {
        self.cols.is_empty()
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Finalizes an immutable `Block` snapshot. The bytes charged while
    /// building it stay charged until every clone of the returned
    /// `Block` is dropped.
    pub fn block(self) -> Block {
        Block {
            bounds: self.bounds,
            tags: self.tags,
            cols: self.cols,
            columns: self.columns,
            bytes: Arc::new(BlockBytes {
                alloc: self.alloc,
                bytes: self.bytes,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> (BlockBuilder, usize) {
        let alloc = Arc::new(Allocator::unlimited());
        let mut b = BlockBuilder::new(Bounds::new(Time(0), Time(10)), Tags::new(), alloc);
        let t = b.add_col(ColMeta::time("_time"));
        (b, t)
    }

    #[test]
    fn builder_roundtrips_to_valid_block() {
        let (mut b, t) = builder();
        let v = b.add_col(ColMeta::value("_value", ColumnType::Float));
        b.append_time(t, Time(1)).unwrap();
        b.append_float(v, 1.5).unwrap();
        b.append_time(t, Time(2)).unwrap();
        b.append_float(v, 2.5).unwrap();
        let block = b.block();
        block.validate().unwrap();
        assert_eq!(block.num_rows(), 2);
    }

    #[test]
    fn validate_rejects_out_of_bounds_time() {
        let (mut b, t) = builder();
        b.append_time(t, Time(100)).unwrap();
        let block = b.block();
        assert!(block.validate().is_err());
    }

    #[test]
    fn common_tag_column_stores_single_value() {
        let alloc = Arc::new(Allocator::unlimited());
        let mut tags = Tags::new();
        tags.insert("host".to_string(), "a".to_string());
        let mut b = BlockBuilder::new(Bounds::new(Time(0), Time(10)), tags, alloc);
        let t = b.add_col(ColMeta::time("_time"));
        let tag = b.add_col(ColMeta::tag("host", true));
        b.set_common_string(tag, "a");
        b.append_time(t, Time(1)).unwrap();
        let block = b.block();
        block.validate().unwrap();
    }

    #[test]
    fn dropping_a_block_returns_its_bytes_to_the_allocator() {
        let alloc = Arc::new(Allocator::unlimited());
        let mut b = BlockBuilder::new(Bounds::new(Time(0), Time(10)), Tags::new(), alloc.clone());
        let t = b.add_col(ColMeta::time("_time"));
        b.append_time(t, Time(1)).unwrap();
        b.append_time(t, Time(2)).unwrap();
        let block = b.block();
        assert!(alloc.in_use() > 0);

        let clone = block.clone();
        drop(block);
        assert!(alloc.in_use() > 0, "a live clone must keep the charge");
        drop(clone);
        assert_eq!(alloc.in_use(), 0);
    }
}
