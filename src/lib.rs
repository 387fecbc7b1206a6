//! ctxgraph: a queryable dependency graph of a codebase.
//!
//! Source files are scanned into items (files, classes, functions), stored
//! with their raw dependency strings in SQLite, linked into a graph, and
//! queried by keyword or meaning with dependency expansion.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod observability;
pub mod resolution;
pub mod types;
