//! SQLite schema for the import ledger
//!
//! `imported_notes` is the ledger proper: one row per note that reached the
//! wiki. Sessions and per-note attempt records are history kept alongside.

use rusqlite::{Connection, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Notes confirmed as imported
        CREATE TABLE IF NOT EXISTS imported_notes (
            source_id TEXT PRIMARY KEY,
            imported_at INTEGER NOT NULL
        );

        -- One row per `import` run
        CREATE TABLE IF NOT EXISTS import_sessions (
            id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            wiki_url TEXT NOT NULL,
            target_space TEXT NOT NULL,
            total_notes INTEGER NOT NULL DEFAULT 0,
            completed_notes INTEGER NOT NULL DEFAULT 0,
            failed_notes INTEGER NOT NULL DEFAULT 0,
            skipped_notes INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'in_progress',
            started_at INTEGER NOT NULL,
            finished_at INTEGER
        );

        -- One row per note processed in a session
        CREATE TABLE IF NOT EXISTS import_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            source_file TEXT NOT NULL,
            note_title TEXT NOT NULL,
            source_id TEXT NOT NULL,
            status TEXT NOT NULL,
            page_url TEXT,
            error_message TEXT,
            attachments_count INTEGER NOT NULL DEFAULT 0,
            attachments_uploaded INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (session_id) REFERENCES import_sessions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_records_source_id ON import_records(source_id);
        CREATE INDEX IF NOT EXISTS idx_records_session ON import_records(session_id);
        CREATE INDEX IF NOT EXISTS idx_records_status ON import_records(status);
        CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON import_sessions(started_at);
        "#,
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"imported_notes".to_string()));
        assert!(tables.contains(&"import_sessions".to_string()));
        assert!(tables.contains(&"import_records".to_string()));
    }

    #[test]
    fn test_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO imported_notes (source_id, imported_at) VALUES ('a', 1)",
            [],
        )
        .unwrap();
        init_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM imported_notes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
