//! SQLite persistence for items, edges and tracked files.
//!
//! Every fixed query goes through [`Connection::prepare_cached`]. Batched
//! lookups build an `IN (...)` list sized to their input. Writes are
//! committed per call, which is per processed file during indexing, so an
//! interrupted run can resume but is never atomic as a whole.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::debug;

use crate::db::converters::{row_to_edge, row_to_item, vec_to_blob, ITEM_COLUMNS};
use crate::db::schema::{has_keyword_index, initialize_database};
use crate::error::Result;
use crate::types::{Edge, Item, TrackedFile, RELATION_IMPORT};

/// Timestamps closer than this (seconds) count as unchanged.
pub const MTIME_EPSILON: f64 = 0.001;

// ---------------------------------------------------------------------------
// GraphStats
// ---------------------------------------------------------------------------

/// Aggregate statistics about the stored graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct GraphStats {
    pub items: usize,
    pub edges: usize,
    pub resolved_edges: usize,
    pub files: usize,
}

// ---------------------------------------------------------------------------
// ContextStore
// ---------------------------------------------------------------------------

/// Typed wrapper around the ctxgraph SQLite database.
pub struct ContextStore {
    pub conn: Connection,
    keyword_index: bool,
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("keyword_index", &self.keyword_index)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// SQL constants
// ---------------------------------------------------------------------------

const UPSERT_ITEM_SQL: &str = "\
INSERT INTO items (id, layer, item_type, name, content, metadata, source_file, line_number, score, embedding)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(id) DO UPDATE SET
  layer = excluded.layer,
  item_type = excluded.item_type,
  name = excluded.name,
  content = excluded.content,
  metadata = excluded.metadata,
  source_file = excluded.source_file,
  line_number = excluded.line_number,
  score = excluded.score,
  embedding = excluded.embedding";

const DELETE_EDGES_FROM_SQL: &str = "DELETE FROM edges WHERE source_id = ?1";

const INSERT_EDGE_SQL: &str = "\
INSERT OR IGNORE INTO edges (source_id, target_key, target_id, relation_type)
VALUES (?1, ?2, NULL, ?3)";

const SET_EDGE_TARGET_SQL: &str = "\
UPDATE edges SET target_id = ?4
WHERE source_id = ?1 AND target_key = ?2 AND relation_type = ?3";

const EDGE_COLUMNS: &str = "source_id, target_key, target_id, relation_type";

const UPSERT_TRACKED_SQL: &str = "\
INSERT INTO tracked_files (path, last_modified) VALUES (?1, ?2)
ON CONFLICT(path) DO UPDATE SET last_modified = excluded.last_modified";

const DELETE_ORPHAN_EDGES_SQL: &str = "\
DELETE FROM edges WHERE source_id NOT IN (SELECT id FROM items)";

const CLEAR_DANGLING_TARGETS_SQL: &str = "\
UPDATE edges SET target_id = NULL
WHERE target_id IS NOT NULL AND target_id NOT IN (SELECT id FROM items)";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `?1, ?2, ... ?n` for dynamically sized `IN` lists.
fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

/// Order `items` to follow `ids`, dropping ids that had no row.
fn order_by_ids(ids: &[String], items: Vec<Item>) -> Vec<Item> {
    let mut by_id: HashMap<String, Item> =
        items.into_iter().map(|item| (item.id.clone(), item)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

fn dedup_preserving_order(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|v| seen.insert(v.as_str()))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Implementation
// ---------------------------------------------------------------------------

impl ContextStore {
    /// Open (or create) the database at `db_path` and apply the schema.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = initialize_database(db_path)?;
        Ok(Self::from_connection(conn))
    }

    /// Open the store for a project root, creating `{root}/{storage_dir}`.
    pub fn open(root: &Path, storage_dir: &str, db_file: &str) -> Result<Self> {
        let dir = root.join(storage_dir);
        std::fs::create_dir_all(&dir)?;
        let db_path = dir.join(db_file);
        debug!(path = %db_path.display(), "opening store");
        Self::new(&db_path.to_string_lossy())
    }

    /// Wrap an already-initialized connection.
    pub fn from_connection(conn: Connection) -> Self {
        let keyword_index = has_keyword_index(&conn);
        Self { conn, keyword_index }
    }

    /// Whether ranked keyword search is available.
    pub fn has_keyword_index(&self) -> bool {
        self.keyword_index
    }

    /// Test hook for the substring-scan fallback.
    #[doc(hidden)]
    pub fn disable_keyword_index(&mut self) {
        self.keyword_index = false;
    }

    // -------------------------------------------------------------------
    // Save
    // -------------------------------------------------------------------

    /// Full-replace upsert of each item, then regenerate its outbound
    /// edges from its current `dependencies`. Other items' edges are
    /// untouched. One transaction per call.
    pub fn save(&self, items: &[Item]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut upsert = tx.prepare_cached(UPSERT_ITEM_SQL)?;
            let mut delete_edges = tx.prepare_cached(DELETE_EDGES_FROM_SQL)?;
            let mut insert_edge = tx.prepare_cached(INSERT_EDGE_SQL)?;

            for item in items {
                let metadata = serde_json::Value::Object(item.metadata.clone()).to_string();
                upsert.execute(params![
                    item.id,
                    item.layer.as_str(),
                    item.item_type().unwrap_or("unknown"),
                    item.name().unwrap_or(""),
                    item.content,
                    metadata,
                    item.source_file,
                    item.line_number,
                    item.score,
                    item.embedding.as_deref().map(vec_to_blob),
                ])?;

                delete_edges.execute(params![item.id])?;
                for dep in item.dependencies() {
                    insert_edge.execute(params![item.id, dep, RELATION_IMPORT])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Items
    // -------------------------------------------------------------------

    pub fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.query_row(params![id], row_to_item)
            .optional()
            .map_err(Into::into)
    }

    /// Batch fetch by id. Output follows the order of `ids`; unknown ids
    /// are skipped.
    pub fn get_items(&self, ids: &[String]) -> Result<Vec<Item>> {
        let ids = dedup_preserving_order(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_and_then(params_from_iter(ids.iter()), row_to_item)?;
        let items = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(order_by_ids(&ids, items))
    }

    /// Exact-name lookup, used when an edge could not be resolved to an id.
    pub fn get_items_by_name(&self, names: &[String]) -> Result<Vec<Item>> {
        let names = dedup_preserving_order(names);
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE name IN ({}) ORDER BY id",
            placeholders(names.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_and_then(params_from_iter(names.iter()), row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn get_items_by_file(&self, source_file: &str) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE source_file = ?1 ORDER BY line_number, id"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_and_then(params![source_file], row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Every item ordered by id.
    pub fn all_items(&self) -> Result<Vec<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY id");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_and_then([], row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn set_embedding(&self, id: &str, embedding: &[f32]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached("UPDATE items SET embedding = ?2 WHERE id = ?1")?;
        stmt.execute(params![id, vec_to_blob(embedding)])?;
        Ok(())
    }

    pub fn items_without_embedding(&self) -> Result<Vec<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE embedding IS NULL ORDER BY id");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_and_then([], row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn items_with_embedding(&self) -> Result<Vec<Item>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE embedding IS NOT NULL ORDER BY id");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_and_then([], row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // -------------------------------------------------------------------
    // Edges
    // -------------------------------------------------------------------

    /// Resolved outbound edges of `source_ids`.
    pub fn get_outbound_edges(&self, source_ids: &[String]) -> Result<Vec<Edge>> {
        self.edges_from(source_ids, "target_id IS NOT NULL")
    }

    /// Outbound edges of `source_ids` the linker has not resolved.
    pub fn get_pending_edges(&self, source_ids: &[String]) -> Result<Vec<Edge>> {
        self.edges_from(source_ids, "target_id IS NULL")
    }

    fn edges_from(&self, source_ids: &[String], filter: &str) -> Result<Vec<Edge>> {
        let ids = dedup_preserving_order(source_ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE source_id IN ({}) AND {filter} \
             ORDER BY source_id, target_key",
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_and_then(params_from_iter(ids.iter()), row_to_edge)?;
        let mut edges = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        // Keep the caller's frontier order.
        let rank: HashMap<&str, usize> =
            ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        edges.sort_by_key(|e| rank.get(e.source_id.as_str()).copied().unwrap_or(usize::MAX));
        Ok(edges)
    }

    /// Resolved edges pointing at `target_id`.
    pub fn get_inbound_edges(&self, target_id: &str) -> Result<Vec<Edge>> {
        let sql = format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE target_id = ?1 ORDER BY source_id, target_key"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_and_then(params![target_id], row_to_edge)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Items that own a resolved edge to `target_id`.
    pub fn get_dependents(&self, target_id: &str) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT DISTINCT {} FROM items i JOIN edges e ON e.source_id = i.id \
             WHERE e.target_id = ?1 ORDER BY i.id",
            ITEM_COLUMNS
                .split(", ")
                .map(|c| format!("i.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_and_then(params![target_id], row_to_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn all_edges(&self) -> Result<Vec<Edge>> {
        let sql = format!("SELECT {EDGE_COLUMNS} FROM edges ORDER BY source_id, target_key");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_and_then([], row_to_edge)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Every edge whose `target_id` is still NULL.
    pub fn get_unresolved_edges(&self) -> Result<Vec<Edge>> {
        let sql = format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE target_id IS NULL ORDER BY source_id, target_key"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_and_then([], row_to_edge)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Persist linker resolutions in one transaction. Edges without a
    /// `target_id` are ignored.
    pub fn set_edge_targets(&self, edges: &[Edge]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare_cached(SET_EDGE_TARGET_SQL)?;
            for edge in edges {
                if let Some(target) = &edge.target_id {
                    updated += stmt.execute(params![
                        edge.source_id,
                        edge.target_key,
                        edge.relation_type,
                        target
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    /// Reset edges whose target item no longer exists so they can be
    /// resolved again.
    pub fn clear_dangling_targets(&self) -> Result<usize> {
        Ok(self.conn.execute(CLEAR_DANGLING_TARGETS_SQL, [])?)
    }

    // -------------------------------------------------------------------
    // Scores
    // -------------------------------------------------------------------

    /// Distinct resolved in-degree for every item that has one.
    pub fn resolved_in_degrees(&self) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT e.target_id, COUNT(DISTINCT e.source_id) FROM edges e \
             JOIN items i ON i.id = e.target_id \
             GROUP BY e.target_id ORDER BY e.target_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let degree: i64 = row.get(1)?;
            Ok((id, usize::try_from(degree).unwrap_or(0)))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Zero every score, then write `scores`. One transaction.
    pub fn replace_scores(&self, scores: &[(String, f64)]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("UPDATE items SET score = 0", [])?;
        {
            let mut stmt = tx.prepare_cached("UPDATE items SET score = ?2 WHERE id = ?1")?;
            for (id, score) in scores {
                stmt.execute(params![id, score])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // -------------------------------------------------------------------
    // Tracked files
    // -------------------------------------------------------------------

    /// True if `path` was never indexed or its stored mtime differs from
    /// `mtime` by more than [`MTIME_EPSILON`].
    pub fn should_reindex(&self, path: &str, mtime: f64) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT last_modified FROM tracked_files WHERE path = ?1")?;
        let stored: Option<f64> = stmt.query_row(params![path], |row| row.get(0)).optional()?;
        Ok(match stored {
            Some(stored) => (stored - mtime).abs() > MTIME_EPSILON,
            None => true,
        })
    }

    pub fn update_file_status(&self, path: &str, mtime: f64) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(UPSERT_TRACKED_SQL)?;
        stmt.execute(params![path, mtime])?;
        Ok(())
    }

    pub fn tracked_files(&self) -> Result<Vec<TrackedFile>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT path, last_modified FROM tracked_files ORDER BY path")?;
        let rows = stmt.query_map([], |row| {
            Ok(TrackedFile {
                path: row.get(0)?,
                last_modified: row.get(1)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Remove every tracked file absent from `current_files`, with its
    /// items and the edges those items owned. Returns the removed paths.
    ///
    /// Only directory-scope indexing may call this.
    pub fn cleanup_deleted_files(&self, current_files: &HashSet<String>) -> Result<Vec<String>> {
        let stale: Vec<String> = self
            .tracked_files()?
            .into_iter()
            .map(|f| f.path)
            .filter(|p| !current_files.contains(p))
            .collect();
        if stale.is_empty() {
            return Ok(stale);
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut del_tracked = tx.prepare_cached("DELETE FROM tracked_files WHERE path = ?1")?;
            let mut del_items = tx.prepare_cached("DELETE FROM items WHERE source_file = ?1")?;
            for path in &stale {
                del_tracked.execute(params![path])?;
                let removed = del_items.execute(params![path])?;
                debug!(path = %path, items = removed, "removed deleted file");
            }
            tx.execute(DELETE_ORPHAN_EDGES_SQL, [])?;
            tx.execute(CLEAR_DANGLING_TARGETS_SQL, [])?;
        }
        tx.commit()?;
        Ok(stale)
    }

    // -------------------------------------------------------------------
    // Statistics
    // -------------------------------------------------------------------

    pub fn get_stats(&self) -> Result<GraphStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or(0))
        };
        Ok(GraphStats {
            items: count("SELECT COUNT(*) FROM items")?,
            edges: count("SELECT COUNT(*) FROM edges")?,
            resolved_edges: count("SELECT COUNT(*) FROM edges WHERE target_id IS NOT NULL")?,
            files: count("SELECT COUNT(*) FROM tracked_files")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
