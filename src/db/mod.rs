//! Database layer for ctxgraph.
//!
//! - [`schema`]: DDL and initialization (`initialize_database`).
//! - [`converters`]: Row-to-struct conversions and the embedding blob codec.

pub mod converters;
pub mod schema;

pub use converters::{blob_to_vec, row_to_edge, row_to_item, vec_to_blob};
pub use schema::{has_keyword_index, initialize_database};
