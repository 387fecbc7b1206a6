//! Row-to-struct converters for ctxgraph database queries.
//!
//! Converts raw `rusqlite::Row` values into the domain types defined in
//! `crate::types`, plus the little-endian `f32` blob codec used for the
//! `items.embedding` column.

use rusqlite::Row;
use serde_json::{Map, Value};

use crate::types::{Edge, Item, Layer};

/// Columns selected by every item query, in the order `row_to_item` reads.
pub const ITEM_COLUMNS: &str =
    "id, layer, content, metadata, source_file, line_number, score, embedding";

// ---------------------------------------------------------------------------
// Item conversion
// ---------------------------------------------------------------------------

/// Convert a row selected with [`ITEM_COLUMNS`] into an [`Item`].
///
/// Unparseable metadata becomes an empty map instead of failing the row,
/// so one corrupt entry never hides the rest of a result set.
pub fn row_to_item(row: &Row<'_>) -> rusqlite::Result<Item> {
    let layer_str: String = row.get("layer")?;
    let metadata_json: String = row.get("metadata")?;
    let metadata: Map<String, Value> = serde_json::from_str(&metadata_json).unwrap_or_default();
    let embedding: Option<Vec<u8>> = row.get("embedding")?;

    Ok(Item {
        id: row.get("id")?,
        layer: Layer::from_str_loose(&layer_str).unwrap_or(Layer::Semantic),
        content: row.get("content")?,
        metadata,
        source_file: row.get("source_file")?,
        line_number: row.get("line_number")?,
        score: row.get("score")?,
        embedding: embedding.as_deref().map(blob_to_vec),
    })
}

// ---------------------------------------------------------------------------
// Edge conversion
// ---------------------------------------------------------------------------

/// Convert a `SELECT source_id, target_key, target_id, relation_type` row
/// into an [`Edge`].
pub fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<Edge> {
    Ok(Edge {
        source_id: row.get("source_id")?,
        target_key: row.get("target_key")?,
        target_id: row.get("target_id")?,
        relation_type: row.get("relation_type")?,
    })
}

// ---------------------------------------------------------------------------
// Embedding blobs
// ---------------------------------------------------------------------------

pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Trailing bytes that do not form a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::initialize_database;

    fn setup() -> rusqlite::Connection {
        initialize_database(":memory:").expect("schema init")
    }

    #[test]
    fn reads_item_row() {
        let conn = setup();
        conn.execute(
            "INSERT INTO items (id, layer, item_type, name, content, metadata, source_file, line_number, score, embedding)
             VALUES ('class:a.py:A', 'SEMANTIC', 'class', 'A', 'class A', '{\"type\":\"class\",\"name\":\"A\"}', '/p/a.py', 4, 1.5, ?1)",
            [vec_to_blob(&[0.5, -1.0])],
        )
        .unwrap();

        let sql = format!("SELECT {ITEM_COLUMNS} FROM items");
        let item = conn.query_row(&sql, [], row_to_item).unwrap();
        assert_eq!(item.id, "class:a.py:A");
        assert_eq!(item.layer, Layer::Semantic);
        assert_eq!(item.name(), Some("A"));
        assert_eq!(item.line_number, 4);
        assert!((item.score - 1.5).abs() < f64::EPSILON);
        assert_eq!(item.embedding, Some(vec![0.5, -1.0]));
    }

    #[test]
    fn corrupt_metadata_becomes_empty_map() {
        let conn = setup();
        conn.execute(
            "INSERT INTO items (id, layer, item_type, name, content, metadata, source_file)
             VALUES ('x', 'PROJECT', 'file', 'x', '', 'not json', '/x')",
            [],
        )
        .unwrap();
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items");
        let item = conn.query_row(&sql, [], row_to_item).unwrap();
        assert!(item.metadata.is_empty());
        assert_eq!(item.embedding, None);
    }

    #[test]
    fn reads_unresolved_edge_row() {
        let conn = setup();
        conn.execute(
            "INSERT INTO edges (source_id, target_key, relation_type) VALUES ('a', 'pkg.B', 'import')",
            [],
        )
        .unwrap();
        let edge = conn
            .query_row(
                "SELECT source_id, target_key, target_id, relation_type FROM edges",
                [],
                row_to_edge,
            )
            .unwrap();
        assert_eq!(edge.target_key, "pkg.B");
        assert!(!edge.is_resolved());
    }

    #[test]
    fn blob_ignores_partial_trailing_bytes() {
        let mut blob = vec_to_blob(&[1.0, 2.0]);
        blob.push(7);
        assert_eq!(blob_to_vec(&blob), vec![1.0, 2.0]);
    }
}
