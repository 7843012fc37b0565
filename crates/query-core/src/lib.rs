//! # query-core
//!
//! Core types shared by the planner and the execution runtime: the
//! columnar `Block`/`BlockBuilder` model, the shared `Allocator`, time
//! primitives (`Time`, `Duration`, `Bounds`), the error taxonomy, operation
//! parameter signatures, and the compiled row-predicate abstraction.
//!
//! This crate deliberately has no notion of a logical or physical plan —
//! those live in `query-plan`, which depends on this crate — and no
//! notion of a running `Transformation` — that lives in `query-exec`.
//! Splitting the "function registry" described in the spec across crate
//! boundaries this way is necessary in Rust (no circular crate
//! dependencies); each half keeps the same write-once/freeze-then-read
//! discipline described there.

pub mod alloc;
pub mod block;
pub mod error;
pub mod param;
pub mod predicate;
pub mod time;
pub mod trigger;

pub use alloc::Allocator;
pub use block::{Block, BlockBuilder, BlockKey, ColKind, ColMeta, Column, ColumnType, RowReader, Tags};
pub use error::{QueryError, Result};
pub use param::{Arguments, ParamType, Signature};
pub use predicate::RowPredicateFn;
pub use time::{Bounds, Duration, QueryTime, Time, MIN_TIME};
pub use trigger::TriggerSpec;
