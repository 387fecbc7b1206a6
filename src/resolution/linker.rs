//! The linker: a full pass that turns string-keyed edges into
//! identity-keyed ones and refreshes centrality scores.
//!
//! It always runs over the entire store. A symbol indexed just now may
//! resolve a reference that was dangling anywhere else in the graph.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info};

use crate::error::Result;
use crate::graph::ranking::GraphRanking;
use crate::graph::store::ContextStore;
use crate::resolution::names::{
    classify_reference, resolve_candidates, short_name, NameIndex, ReferenceClass,
    ResolutionReason,
};
use crate::types::Edge;

/// Outcome of one link pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Edges newly given a `target_id`.
    pub resolved: usize,
    /// Unmatched references that look like stdlib or third-party imports.
    pub external: usize,
    /// Unmatched references that look internal.
    pub unresolved: usize,
    /// Items with a non-zero score after the pass.
    pub scored: usize,
    pub by_reason: HashMap<ResolutionReason, usize>,
}

impl fmt::Display for LinkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resolved {} edges ({} external, {} unresolved), scored {} items",
            self.resolved, self.external, self.unresolved, self.scored
        )
    }
}

pub struct Linker<'a> {
    store: &'a ContextStore,
}

impl<'a> Linker<'a> {
    pub fn new(store: &'a ContextStore) -> Self {
        Self { store }
    }

    /// Resolve every pending edge, persist the resolutions in one batch,
    /// then recompute all scores. Idempotent.
    pub fn link(&self) -> Result<LinkReport> {
        let cleared = self.store.clear_dangling_targets()?;
        if cleared > 0 {
            debug!(cleared, "reset edges pointing at removed items");
        }

        let items = self.store.all_items()?;
        let index = NameIndex::build(&items);
        let pending = self.store.get_unresolved_edges()?;

        let mut report = LinkReport::default();
        let mut resolved: Vec<Edge> = Vec::new();

        for mut edge in pending {
            let candidates = index.candidates(short_name(&edge.target_key));
            match resolve_candidates(candidates, &edge.target_key, &edge.source_id) {
                Some(resolution) => {
                    *report.by_reason.entry(resolution.reason).or_default() += 1;
                    edge.target_id = Some(resolution.item_id);
                    resolved.push(edge);
                }
                None => match classify_reference(&edge.target_key) {
                    ReferenceClass::External => report.external += 1,
                    ReferenceClass::Unresolved => {
                        debug!(source = %edge.source_id, key = %edge.target_key, "unresolved reference");
                        report.unresolved += 1;
                    }
                },
            }
        }

        report.resolved = self.store.set_edge_targets(&resolved)?;
        report.scored = GraphRanking::new(self.store).recompute_centrality()?;

        info!(
            resolved = report.resolved,
            external = report.external,
            unresolved = report.unresolved,
            scored = report.scored,
            "link pass complete"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
