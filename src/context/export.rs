//! Graph export for external viewers.
//!
//! Nodes are every stored item; edges are resolved edges only, since an
//! unresolved edge has no node to point at.

use serde::Serialize;

use crate::error::Result;
use crate::graph::store::ContextStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    /// Item kind (`file`, `class`, `function`).
    pub group: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphLink {
    pub source: String,
    pub target: String,
    pub relation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphExport {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphLink>,
}

impl GraphExport {
    pub fn from_store(store: &ContextStore) -> Result<Self> {
        let nodes = store
            .all_items()?
            .into_iter()
            .map(|item| GraphNode {
                label: item
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| item.id.rsplit(':').next().unwrap_or(&item.id).to_string()),
                group: item.item_type().unwrap_or("unknown").to_string(),
                score: item.score,
                id: item.id,
            })
            .collect();

        let edges = store
            .all_edges()?
            .into_iter()
            .filter_map(|edge| {
                Some(GraphLink {
                    target: edge.target_id?,
                    source: edge.source_id,
                    relation: edge.relation_type,
                })
            })
            .collect();

        Ok(Self { nodes, edges })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
