//! Error taxonomy for the engine (spec §7).
//!
//! Library code returns `QueryError` so callers can match on the
//! taxonomy; the CLI binary wraps everything in `anyhow::Result` at the
//! edge, matching the split the teacher crate draws between
//! `rde_core::RdeError` (library) and `anyhow` (binary).

use thiserror::Error;

/// Errors the engine can report. Validation/Resource/Schema abort
/// synchronously or abort the query; Upstream/Cancelled/Panic propagate
/// through `Finish`. Per-row evaluation errors are logged and the row is
/// skipped — they never construct this type.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("resource quota exceeded: {0}")]
    Resource(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("unknown procedure kind: {0}")]
    UnknownProcedure(String),

    #[error("upstream failure: {0}")]
    Upstream(#[source] anyhow::Error),

    #[error("query cancelled")]
    Cancelled,

    #[error("panic during execution: {0}")]
    Panic(String),
}

impl QueryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        QueryError::Validation(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        QueryError::Schema(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
