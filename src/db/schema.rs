//! SQLite schema initialization for ctxgraph.
//!
//! One database per project root holds the items table, the edges table,
//! the tracked-files table and an FTS5 keyword index over items. The
//! keyword index is optional: when FTS5 cannot be created the store keeps
//! working with an unranked substring scan.

use rusqlite::Connection;
use tracing::warn;

// ---------------------------------------------------------------------------
// DDL constants
// ---------------------------------------------------------------------------

const CREATE_ITEMS: &str = "\
CREATE TABLE IF NOT EXISTS items (
  id TEXT PRIMARY KEY,
  layer TEXT NOT NULL,
  item_type TEXT NOT NULL,
  name TEXT NOT NULL,
  content TEXT NOT NULL,
  metadata TEXT NOT NULL,
  source_file TEXT NOT NULL,
  line_number INTEGER NOT NULL DEFAULT 0,
  score REAL NOT NULL DEFAULT 0,
  embedding BLOB
)";

// target_id stays NULL until the linker resolves target_key.
const CREATE_EDGES: &str = "\
CREATE TABLE IF NOT EXISTS edges (
  source_id TEXT NOT NULL,
  target_key TEXT NOT NULL,
  target_id TEXT,
  relation_type TEXT NOT NULL,
  PRIMARY KEY (source_id, target_key, relation_type)
)";

const CREATE_TRACKED_FILES: &str = "\
CREATE TABLE IF NOT EXISTS tracked_files (
  path TEXT PRIMARY KEY,
  last_modified REAL NOT NULL
)";

// Indexes ----------------------------------------------------------------

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_items_source ON items(source_file)",
    "CREATE INDEX IF NOT EXISTS idx_items_name ON items(name)",
    "CREATE INDEX IF NOT EXISTS idx_items_type ON items(item_type)",
    "CREATE INDEX IF NOT EXISTS idx_edges_target_key ON edges(target_key)",
    "CREATE INDEX IF NOT EXISTS idx_edges_target_id ON edges(target_id)",
];

// FTS5 -------------------------------------------------------------------

pub(crate) const FTS_TABLE: &str = "items_fts";

const CREATE_FTS: &str = "\
CREATE VIRTUAL TABLE IF NOT EXISTS items_fts USING fts5(
  name, content, metadata,
  content='items', content_rowid='rowid'
)";

const CREATE_FTS_TRIGGERS: &[&str] = &[
    "\
CREATE TRIGGER IF NOT EXISTS items_ai AFTER INSERT ON items BEGIN
  INSERT INTO items_fts(rowid, name, content, metadata)
  VALUES (new.rowid, new.name, new.content, new.metadata);
END",
    "\
CREATE TRIGGER IF NOT EXISTS items_ad AFTER DELETE ON items BEGIN
  INSERT INTO items_fts(items_fts, rowid, name, content, metadata)
  VALUES ('delete', old.rowid, old.name, old.content, old.metadata);
END",
    "\
CREATE TRIGGER IF NOT EXISTS items_au AFTER UPDATE OF name, content, metadata ON items BEGIN
  INSERT INTO items_fts(items_fts, rowid, name, content, metadata)
  VALUES ('delete', old.rowid, old.name, old.content, old.metadata);
  INSERT INTO items_fts(rowid, name, content, metadata)
  VALUES (new.rowid, new.name, new.content, new.metadata);
END",
];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Open (or create) the SQLite database at `db_path` and apply the full
/// schema. Pass `":memory:"` for an ephemeral database.
///
/// # Errors
///
/// Returns a `rusqlite::Error` if the database cannot be opened or any core
/// DDL statement fails. A missing FTS5 module is not an error.
pub fn initialize_database(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Edges may point at keys that never become rows.
    conn.pragma_update(None, "foreign_keys", "OFF")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    conn.execute_batch(CREATE_ITEMS)?;
    conn.execute_batch(CREATE_EDGES)?;
    conn.execute_batch(CREATE_TRACKED_FILES)?;
    for ddl in CREATE_INDEXES {
        conn.execute_batch(ddl)?;
    }

    create_keyword_index(&conn);

    Ok(conn)
}

/// Create the FTS5 table and its sync triggers. Returns `false` (and logs)
/// when the SQLite build has no FTS5.
pub fn create_keyword_index(conn: &Connection) -> bool {
    if let Err(e) = conn.execute_batch(CREATE_FTS) {
        warn!(error = %e, "keyword index unavailable, falling back to substring search");
        return false;
    }
    for trigger in CREATE_FTS_TRIGGERS {
        if let Err(e) = conn.execute_batch(trigger) {
            warn!(error = %e, "could not install keyword index trigger");
            return false;
        }
    }
    true
}

/// Whether the keyword index table exists on this connection.
pub fn has_keyword_index(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [FTS_TABLE],
        |_| Ok(()),
    )
    .is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn object_exists(conn: &Connection, obj_type: &str, name: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
                rusqlite::params![obj_type, name],
                |row| row.get(0),
            )
            .unwrap();
        count > 0
    }

    #[test]
    fn creates_core_tables() {
        let conn = initialize_database(":memory:").unwrap();
        for table in ["items", "edges", "tracked_files"] {
            assert!(object_exists(&conn, "table", table), "missing table {table}");
        }
    }

    #[test]
    fn creates_indexes() {
        let conn = initialize_database(":memory:").unwrap();
        for idx in [
            "idx_items_source",
            "idx_items_name",
            "idx_items_type",
            "idx_edges_target_key",
            "idx_edges_target_id",
        ] {
            assert!(object_exists(&conn, "index", idx), "missing index {idx}");
        }
    }

    #[test]
    fn creates_keyword_index_with_triggers() {
        let conn = initialize_database(":memory:").unwrap();
        assert!(has_keyword_index(&conn));
        for trigger in ["items_ai", "items_ad", "items_au"] {
            assert!(object_exists(&conn, "trigger", trigger), "missing trigger {trigger}");
        }
    }

    #[test]
    fn initialization_is_idempotent() {
        let conn = initialize_database(":memory:").unwrap();
        conn.execute_batch(CREATE_ITEMS).unwrap();
        assert!(create_keyword_index(&conn));
    }

    #[test]
    fn edge_primary_key_rejects_duplicates() {
        let conn = initialize_database(":memory:").unwrap();
        conn.execute(
            "INSERT INTO edges (source_id, target_key, relation_type) VALUES ('a', 'b', 'import')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO edges (source_id, target_key, relation_type) VALUES ('a', 'b', 'import')",
            [],
        );
        assert!(dup.is_err());
    }
}
