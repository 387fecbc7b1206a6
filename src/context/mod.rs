//! Context delivery: turning routed items into something an agent reads.
//!
//! - [`assembler`]: budgeted `<context_aware_context>` bundles
//! - [`reader`]: fresh source for one item, with staleness reporting
//! - [`export`]: node/link JSON for graph viewers
//! - [`service`]: the facade tying store, config and embedder together

pub mod assembler;
pub mod budget;
pub mod export;
pub mod reader;
pub mod service;

pub use assembler::ContextBundle;
pub use budget::{estimate_tokens, truncate_to_fit, CharBudget};
pub use export::{GraphExport, GraphLink, GraphNode};
pub use reader::{read_fresh, ReadResult, StaleReason};
pub use service::{ContextService, SearchRequest};
