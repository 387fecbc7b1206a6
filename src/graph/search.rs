//! Keyword and hybrid (keyword + vector) search over stored items.
//!
//! Keyword search uses the FTS5 index and ranks matches by the linker's
//! centrality score. Hybrid search blends a binary keyword-membership signal
//! with cosine similarity:
//!
//! ```text
//! score = (1 - alpha) * keyword_presence + alpha * cosine
//! ```
//!
//! Without a query embedding `alpha` is forced to 0 and the result is the
//! keyword ranking truncated to `limit`.

use std::collections::HashMap;

use rusqlite::params;
use tracing::{debug, warn};

use crate::db::converters::row_to_item;
use crate::error::Result;
use crate::graph::store::ContextStore;
use crate::types::Item;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Options that control hybrid search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum results to return.
    pub limit: usize,
    /// Keep only items whose `metadata.type` equals this.
    pub type_filter: Option<String>,
    /// Weight of the vector half, clamped to `[0, 1]`.
    pub alpha: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            type_filter: None,
            alpha: 0.5,
        }
    }
}

/// A hybrid search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub item: Item,
    pub score: f64,
    pub keyword_hit: bool,
    pub similarity: f64,
}

// ---------------------------------------------------------------------------
// SQL
// ---------------------------------------------------------------------------

const KEYWORD_SQL: &str = "\
SELECT i.id, i.layer, i.content, i.metadata, i.source_file, i.line_number, i.score, i.embedding
FROM items_fts f
JOIN items i ON i.rowid = f.rowid
WHERE items_fts MATCH ?1 AND (?2 IS NULL OR i.item_type = ?2)
ORDER BY i.score DESC, bm25(items_fts), i.id";

const SUBSTRING_SQL: &str = "\
SELECT id, layer, content, metadata, source_file, line_number, score, embedding
FROM items
WHERE (content LIKE ?1 ESCAPE '\\' OR metadata LIKE ?1 ESCAPE '\\')
  AND (?2 IS NULL OR item_type = ?2)
ORDER BY rowid";

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

impl ContextStore {
    /// Keyword search ranked by stored score, optionally filtered by
    /// `metadata.type`.
    ///
    /// Falls back to an unranked substring scan over content and metadata
    /// when the keyword index is unavailable or rejects the query.
    pub fn query(&self, text: &str, type_filter: Option<&str>) -> Result<Vec<Item>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        if self.has_keyword_index() {
            let fts_query = sanitize_fts_query(text);
            if fts_query.is_empty() {
                return Ok(Vec::new());
            }
            match self.keyword_query(&fts_query, type_filter) {
                Ok(items) => return Ok(items),
                Err(e) => warn!(error = %e, query = %text, "keyword query failed, using substring scan"),
            }
        }
        self.substring_query(text, type_filter)
    }

    fn keyword_query(&self, fts_query: &str, type_filter: Option<&str>) -> Result<Vec<Item>> {
        let mut stmt = self.conn.prepare_cached(KEYWORD_SQL)?;
        let rows = stmt.query_and_then(params![fts_query, type_filter], row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn substring_query(&self, text: &str, type_filter: Option<&str>) -> Result<Vec<Item>> {
        let pattern = format!("%{}%", escape_like(text.trim()));
        let mut stmt = self.conn.prepare_cached(SUBSTRING_SQL)?;
        let rows = stmt.query_and_then(params![pattern, type_filter], row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Blend keyword membership with cosine similarity.
    ///
    /// Candidates are the top `limit` keyword matches plus, when
    /// `embedding` is given, every item that carries an embedding.
    pub fn hybrid_search(
        &self,
        text: &str,
        embedding: Option<&[f32]>,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let type_filter = opts.type_filter.as_deref();
        let embedding = embedding.filter(|e| !e.is_empty());
        let alpha = if embedding.is_some() {
            opts.alpha.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut candidates: Vec<SearchResult> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for item in self.query(text, type_filter)?.into_iter().take(opts.limit) {
            index.insert(item.id.clone(), candidates.len());
            candidates.push(SearchResult {
                item,
                score: 0.0,
                keyword_hit: true,
                similarity: 0.0,
            });
        }

        if let Some(query_vec) = embedding {
            for item in self.items_with_embedding()? {
                if type_filter.is_some_and(|t| item.item_type() != Some(t)) {
                    continue;
                }
                if !index.contains_key(&item.id) {
                    index.insert(item.id.clone(), candidates.len());
                    candidates.push(SearchResult {
                        item,
                        score: 0.0,
                        keyword_hit: false,
                        similarity: 0.0,
                    });
                }
            }
            for candidate in &mut candidates {
                if let Some(vec) = &candidate.item.embedding {
                    candidate.similarity = cosine_similarity(query_vec, vec);
                }
            }
        }

        for candidate in &mut candidates {
            candidate.score = blend_score(candidate.keyword_hit, candidate.similarity, alpha);
        }
        // Stable: ties keep keyword order.
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(opts.limit);

        debug!(query = %text, alpha, hits = candidates.len(), "hybrid search");
        Ok(candidates)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Quote every whitespace token so user input cannot inject FTS5 syntax.
/// Tokens are implicitly AND-ed.
pub fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .filter_map(|token| {
            let clean: String = token
                .chars()
                .filter(|c| !matches!(c, '*' | '"' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '~' | ':'))
                .collect();
            (!clean.is_empty()).then(|| format!("\"{clean}\""))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `(1 - alpha) * presence + alpha * similarity`.
pub fn blend_score(keyword_hit: bool, similarity: f64, alpha: f64) -> f64 {
    let presence = if keyword_hit { 1.0 } else { 0.0 };
    (1.0 - alpha) * presence + alpha * similarity
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::store::tests::{make_item, setup};
    use crate::types::ItemKind;

    fn seeded() -> ContextStore {
        let store = setup();
        store
            .save(&[
                make_item(ItemKind::Class, "/p/orders.py", "OrderProcessor", &[])
                    .with_content("class OrderProcessor\nProcesses customer orders"),
                make_item(ItemKind::Function, "/p/orders.py", "cancel_order", &[])
                    .with_content("def cancel_order(order_id)"),
                make_item(ItemKind::Class, "/p/stock.py", "InventoryService", &[])
                    .with_content("class InventoryService\nTracks stock levels"),
            ])
            .unwrap();
        store
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn sanitize_quotes_tokens() {
        assert_eq!(sanitize_fts_query("stock check"), r#""stock" "check""#);
        assert_eq!(sanitize_fts_query("foo* (bar)"), r#""foo" "bar""#);
        assert_eq!(sanitize_fts_query("  ** "), "");
    }

    #[test]
    fn query_ranks_by_score() {
        let store = seeded();
        store
            .replace_scores(&[("function:orders.py:cancel_order".into(), 2.0)])
            .unwrap();
        let hits = store.query("orders", None).unwrap();
        assert_eq!(
            ids(&hits)[0],
            "function:orders.py:cancel_order",
            "highest score first"
        );
        assert!(ids(&hits).contains(&"class:orders.py:OrderProcessor"));
        assert!(!ids(&hits).contains(&"class:stock.py:InventoryService"));
    }

    #[test]
    fn query_applies_type_filter() {
        let store = seeded();
        let hits = store.query("orders", Some("class")).unwrap();
        assert_eq!(ids(&hits), vec!["class:orders.py:OrderProcessor"]);
    }

    #[test]
    fn query_falls_back_to_substring_scan() {
        let mut store = seeded();
        store.disable_keyword_index();
        let hits = store.query("stock levels", None).unwrap();
        assert_eq!(ids(&hits), vec!["class:stock.py:InventoryService"]);
        assert!(store.query("100%", None).unwrap().is_empty());
    }

    #[test]
    fn empty_query_returns_nothing() {
        let store = seeded();
        assert!(store.query("   ", None).unwrap().is_empty());
    }

    #[test]
    fn hybrid_without_embedding_matches_keyword_ranking() {
        let store = seeded();
        let opts = SearchOptions { limit: 1, ..Default::default() };
        let keyword = store.query("orders", None).unwrap();
        let hybrid = store.hybrid_search("orders", None, &opts).unwrap();
        assert_eq!(hybrid.len(), 1);
        assert_eq!(hybrid[0].item.id, keyword[0].id);
        assert_eq!(hybrid[0].score, 1.0);
    }

    #[test]
    fn hybrid_pulls_in_vector_only_candidates() {
        let store = seeded();
        store.set_embedding("class:stock.py:InventoryService", &[1.0, 0.0]).unwrap();
        store.set_embedding("class:orders.py:OrderProcessor", &[0.0, 1.0]).unwrap();

        let opts = SearchOptions { limit: 10, alpha: 1.0, ..Default::default() };
        let hits = store.hybrid_search("order", Some(&[1.0, 0.0]), &opts).unwrap();
        assert_eq!(hits[0].item.id, "class:stock.py:InventoryService");
        assert!(!hits[0].keyword_hit);
        assert!((hits[0].similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn blend_weights_presence_and_similarity() {
        assert_eq!(blend_score(true, 0.0, 0.0), 1.0);
        assert_eq!(blend_score(false, 0.8, 0.5), 0.4);
        assert_eq!(blend_score(true, 1.0, 0.5), 1.0);
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-9);
    }
}
