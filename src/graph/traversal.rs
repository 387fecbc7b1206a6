//! Seed-and-expand graph traversal.
//!
//! [`GraphRouter::route`] finds seed items by keyword (or hybrid) search,
//! then walks outbound edges breadth-first for a bounded number of hops.
//! Resolved edges are followed by id; edges the linker has not resolved
//! are followed by exact short-name lookup as a fallback. Ids already
//! visited never re-enter the frontier, which also terminates cycles.

use std::collections::HashSet;

use tracing::debug;

use crate::error::Result;
use crate::graph::search::SearchOptions;
use crate::graph::store::ContextStore;
use crate::indexer::embedder::{embed_query, EmbeddingProvider};
use crate::resolution::names::short_name;
use crate::types::Item;

/// Default number of seed items.
pub const DEFAULT_SEED_LIMIT: usize = 20;

pub struct GraphRouter<'a> {
    store: &'a ContextStore,
    embedder: Option<&'a dyn EmbeddingProvider>,
    alpha: f64,
    limit: usize,
}

impl<'a> GraphRouter<'a> {
    pub fn new(store: &'a ContextStore) -> Self {
        Self {
            store,
            embedder: None,
            alpha: 0.5,
            limit: DEFAULT_SEED_LIMIT,
        }
    }

    /// Seed through hybrid search with this embedder.
    pub fn with_embedder(mut self, embedder: Option<&'a dyn EmbeddingProvider>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Maximum number of seed items.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Seed items for `query`, respecting `type_filter`.
    pub fn seed(&self, query: &str, type_filter: Option<&str>) -> Result<Vec<Item>> {
        match self.embedder {
            Some(_) => {
                let embedding = embed_query(self.embedder, query);
                let opts = SearchOptions {
                    limit: self.limit,
                    type_filter: type_filter.map(str::to_string),
                    alpha: self.alpha,
                };
                Ok(self
                    .store
                    .hybrid_search(query, embedding.as_deref(), &opts)?
                    .into_iter()
                    .map(|r| r.item)
                    .collect())
            }
            None => {
                let mut items = self.store.query(query, type_filter)?;
                items.truncate(self.limit);
                Ok(items)
            }
        }
    }

    /// Seed items first, then each breadth-first layer in discovery order.
    /// Every item appears once.
    pub fn route(&self, query: &str, type_filter: Option<&str>, depth: usize) -> Result<Vec<Item>> {
        let seed = self.seed(query, type_filter)?;
        self.expand(seed, depth)
    }

    /// Expand `seed` across outbound edges for up to `depth` hops.
    pub fn expand(&self, seed: Vec<Item>, depth: usize) -> Result<Vec<Item>> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut result: Vec<Item> = Vec::new();
        for item in seed {
            if visited.insert(item.id.clone()) {
                result.push(item);
            }
        }
        if result.is_empty() {
            return Ok(result);
        }

        let mut frontier: Vec<String> = result.iter().map(|i| i.id.clone()).collect();

        for hop in 1..=depth {
            let resolved = self.store.get_outbound_edges(&frontier)?;
            let pending = self.store.get_pending_edges(&frontier)?;
            if resolved.is_empty() && pending.is_empty() {
                break;
            }

            let target_ids: Vec<String> = resolved
                .into_iter()
                .filter_map(|e| e.target_id)
                .filter(|id| !visited.contains(id))
                .collect();
            let names: Vec<String> = pending
                .iter()
                .map(|e| short_name(&e.target_key).to_string())
                .filter(|n| !n.is_empty())
                .collect();

            let mut discovered = self.store.get_items(&target_ids)?;
            discovered.extend(self.store.get_items_by_name(&names)?);

            let mut next: Vec<String> = Vec::new();
            for item in discovered {
                if visited.insert(item.id.clone()) {
                    next.push(item.id.clone());
                    result.push(item);
                }
            }

            debug!(hop, added = next.len(), "expanded frontier");
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
