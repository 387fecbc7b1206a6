//! Centrality ranking and impact analysis.
//!
//! An item's score is its log-scaled resolved in-degree, `ln(1 + n)` where
//! `n` is the number of distinct items holding a resolved edge to it. The
//! score is always recomputed over the whole store, never patched.

use std::fmt;

use tracing::debug;

use crate::error::Result;
use crate::graph::store::ContextStore;
use crate::types::Item;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Direct dependents of an item.
#[derive(Debug, Clone)]
pub struct ImpactResult {
    pub target_id: String,
    pub dependents: Vec<Item>,
}

impl fmt::Display for ImpactResult {
    /// One `- [type] id` line per dependent.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dependents.is_empty() {
            return writeln!(f, "No dependents found for {}", self.target_id);
        }
        writeln!(
            f,
            "Found {} items that depend on {}:",
            self.dependents.len(),
            self.target_id
        )?;
        for item in &self.dependents {
            writeln!(f, "- [{}] {}", item.item_type().unwrap_or("unknown"), item.id)?;
        }
        Ok(())
    }
}

/// `ln(1 + in_degree)`.
pub fn centrality(in_degree: usize) -> f64 {
    (1.0 + in_degree as f64).ln()
}

// ---------------------------------------------------------------------------
// GraphRanking
// ---------------------------------------------------------------------------

pub struct GraphRanking<'a> {
    store: &'a ContextStore,
}

impl<'a> GraphRanking<'a> {
    pub fn new(store: &'a ContextStore) -> Self {
        Self { store }
    }

    /// Reset every score to 0 and write `ln(1 + in_degree)` for items with
    /// at least one resolved inbound edge. Returns how many were scored.
    pub fn recompute_centrality(&self) -> Result<usize> {
        let scores: Vec<(String, f64)> = self
            .store
            .resolved_in_degrees()?
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, degree)| (id, centrality(degree)))
            .collect();
        self.store.replace_scores(&scores)?;
        debug!(scored = scores.len(), "centrality recomputed");
        Ok(scores.len())
    }

    /// Highest scored items first.
    pub fn top_ranked(&self, limit: usize) -> Result<Vec<Item>> {
        let mut items = self.store.all_items()?;
        items.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        items.truncate(limit);
        Ok(items)
    }

    /// Items that depend on `item_id` through a resolved edge.
    pub fn impacts(&self, item_id: &str) -> Result<ImpactResult> {
        Ok(ImpactResult {
            target_id: item_id.to_string(),
            dependents: self.store.get_dependents(item_id)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
