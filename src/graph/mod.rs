//! Graph layer: the SQLite item/edge store, keyword and hybrid search,
//! centrality ranking and seed-and-expand routing.

pub mod ranking;
pub mod search;
pub mod store;
pub mod traversal;

pub use ranking::{GraphRanking, ImpactResult};
pub use search::{SearchOptions, SearchResult};
pub use store::{ContextStore, GraphStats};
pub use traversal::GraphRouter;
