//! Error types for pipestack.

use std::path::PathBuf;

use thiserror::Error;

/// Declaration-time failures. Any of these aborts synthesis before a
/// template is produced.
#[derive(Debug, Error)]
pub enum Error {
    #[error("duplicate construct id: {0}")]
    DuplicateId(String),

    #[error("unresolved reference: {from} refers to undeclared resource {to}")]
    UnresolvedReference { from: String, to: String },

    #[error("malformed policy statement: {0}")]
    MalformedPolicy(String),

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("cycle detected in resource graph: {0}")]
    CycleDetected(String),

    #[error("asset not found: {}", .0.display())]
    AssetNotFound(PathBuf),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
