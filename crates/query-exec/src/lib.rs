//! # query-exec
//!
//! The running half of the engine (spec §4.5-§4.6): turns a
//! `query_plan::ProcedureGraph` into a live dataflow of tokio tasks,
//! one per node, each driving a [`kernel::Transformation`] over a
//! per-node [`dataset::Dataset`] and forwarding finished blocks
//! downstream until every `yield` has reached the [`result::ResultSink`].

pub mod dataset;
pub mod dispatch;
pub mod executor;
pub mod kernel;
pub mod result;
pub mod storage;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use dataset::Dataset;
pub use executor::execute;
pub use result::{ResultSink, ResultStream, YieldedBlock};
pub use storage::{MemoryStorageReader, StorageReader};
