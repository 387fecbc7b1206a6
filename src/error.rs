//! Unified error type for ctxgraph.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CtxGraphError {
    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tree-sitter error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CtxGraphError>;
