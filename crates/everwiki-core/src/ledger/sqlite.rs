//! SQLite-backed ledger with import history
//!
//! ## Tables
//!
//! - `imported_notes` - the ledger: source id → import time
//! - `import_sessions` - one row per import run with running counts
//! - `import_records` - one row per note attempt within a session

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::debug;

use super::error::{LedgerError, LedgerResult};
use super::schema::{get_schema_version, init_schema, needs_init, SCHEMA_VERSION};
use super::Ledger;

/// Status of a session or a note attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::InProgress => "in_progress",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
            ImportStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(ImportStatus::InProgress),
            "completed" => Ok(ImportStatus::Completed),
            "failed" => Ok(ImportStatus::Failed),
            "skipped" => Ok(ImportStatus::Skipped),
            other => Err(LedgerError::InvalidValue {
                column: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// An import run
#[derive(Debug, Clone, Serialize)]
pub struct ImportSession {
    pub id: String,
    pub source_path: String,
    pub wiki_url: String,
    pub target_space: String,
    pub total_notes: i64,
    pub completed_notes: i64,
    pub failed_notes: i64,
    pub skipped_notes: i64,
    pub status: ImportStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A note attempt to be recorded
#[derive(Debug, Clone)]
pub struct NewAttempt<'a> {
    pub session_id: &'a str,
    pub source_file: &'a str,
    pub note_title: &'a str,
    pub source_id: &'a str,
    pub status: ImportStatus,
    pub page_url: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub attachments_count: usize,
    pub attachments_uploaded: usize,
}

/// A recorded note attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub id: i64,
    pub session_id: String,
    pub source_file: String,
    pub note_title: String,
    pub source_id: String,
    pub status: ImportStatus,
    pub page_url: Option<String>,
    pub error_message: Option<String>,
    pub attachments_count: i64,
    pub attachments_uploaded: i64,
    pub created_at: DateTime<Utc>,
}

/// Per-file outcome counts of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub source_file: String,
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub skipped: i64,
}

/// Overall ledger statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub imported_notes: i64,
    pub attempts: i64,
    pub completed: i64,
    pub failed: i64,
    pub skipped: i64,
    pub sessions: i64,
}

/// Raw session row before decoding status and timestamps
struct SessionRow {
    id: String,
    source_path: String,
    wiki_url: String,
    target_space: String,
    total_notes: i64,
    completed_notes: i64,
    failed_notes: i64,
    skipped_notes: i64,
    status: String,
    started_at: i64,
    finished_at: Option<i64>,
}

/// Raw attempt row before decoding status and timestamps
struct RecordRow {
    id: i64,
    session_id: String,
    source_file: String,
    note_title: String,
    source_id: String,
    status: String,
    page_url: Option<String>,
    error_message: Option<String>,
    attachments_count: i64,
    attachments_uploaded: i64,
    created_at: i64,
}

const SESSION_COLUMNS: &str = "id, source_path, wiki_url, target_space, total_notes, \
     completed_notes, failed_notes, skipped_notes, status, started_at, finished_at";

const RECORD_COLUMNS: &str = "id, session_id, source_file, note_title, source_id, status, \
     page_url, error_message, attachments_count, attachments_uploaded, created_at";

/// Ledger and import history in a SQLite database
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| LedgerError::from_io(e, parent.to_path_buf()))?;
            }
        }

        let conn = Connection::open(path).map_err(|source| LedgerError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Opened ledger at {:?}", path);

        Self::init(conn)
    }

    /// Open an in-memory database (for testing and dry runs)
    pub fn open_in_memory() -> LedgerResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> LedgerResult<Self> {
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        if needs_init(&conn) {
            init_schema(&conn)?;
        } else if let Some(found) = get_schema_version(&conn)? {
            if found > SCHEMA_VERSION {
                return Err(LedgerError::UnsupportedSchema {
                    found,
                    supported: SCHEMA_VERSION,
                });
            }
        }

        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ==================== Ledger ====================

    /// When a note was recorded as imported
    pub fn imported_at(&self, source_id: &str) -> LedgerResult<Option<DateTime<Utc>>> {
        let millis: Option<i64> = self
            .conn
            .query_row(
                "SELECT imported_at FROM imported_notes WHERE source_id = ?",
                params![source_id],
                |row| row.get(0),
            )
            .optional()?;
        millis.map(|m| from_millis("imported_at", m)).transpose()
    }

    /// Number of notes in the ledger
    pub fn imported_count(&self) -> LedgerResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM imported_notes", [], |row| row.get(0))?)
    }

    /// Remove one note from the ledger so the next run imports it again
    pub fn forget(&mut self, source_id: &str) -> LedgerResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM imported_notes WHERE source_id = ?",
            params![source_id],
        )?;
        Ok(removed > 0)
    }

    /// Empty the ledger; history is kept. Returns the number of entries removed.
    pub fn clear_imported(&mut self) -> LedgerResult<usize> {
        Ok(self.conn.execute("DELETE FROM imported_notes", [])?)
    }

    // ==================== Sessions ====================

    /// Start a session and return its id
    pub fn start_session(
        &mut self,
        source_path: &str,
        wiki_url: &str,
        target_space: &str,
        total_notes: usize,
    ) -> LedgerResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO import_sessions (id, source_path, wiki_url, target_space, total_notes, status, started_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                source_path,
                wiki_url,
                target_space,
                total_notes as i64,
                ImportStatus::InProgress.as_str(),
                Utc::now().timestamp_millis(),
            ],
        )?;
        debug!("Started import session {}", id);
        Ok(id)
    }

    /// Store a session's running counts
    pub fn update_session_counts(
        &mut self,
        session_id: &str,
        completed: usize,
        failed: usize,
        skipped: usize,
    ) -> LedgerResult<()> {
        let updated = self.conn.execute(
            "UPDATE import_sessions SET completed_notes = ?, failed_notes = ?, skipped_notes = ? WHERE id = ?",
            params![completed as i64, failed as i64, skipped as i64, session_id],
        )?;
        if updated == 0 {
            return Err(LedgerError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// Close a session with its final status
    pub fn finish_session(&mut self, session_id: &str, status: ImportStatus) -> LedgerResult<()> {
        let updated = self.conn.execute(
            "UPDATE import_sessions SET status = ?, finished_at = ? WHERE id = ?",
            params![status.as_str(), Utc::now().timestamp_millis(), session_id],
        )?;
        if updated == 0 {
            return Err(LedgerError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> LedgerResult<Option<ImportSession>> {
        let sql = format!("SELECT {} FROM import_sessions WHERE id = ?", SESSION_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![session_id], read_session_row)
            .optional()?;
        row.map(hydrate_session).transpose()
    }

    /// Most recent sessions first
    pub fn recent_sessions(&self, limit: usize) -> LedgerResult<Vec<ImportSession>> {
        let sql = format!(
            "SELECT {} FROM import_sessions ORDER BY started_at DESC, rowid DESC LIMIT ?",
            SESSION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], read_session_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(hydrate_session(row?)?);
        }
        Ok(sessions)
    }

    /// Delete a session and its attempt records
    pub fn delete_session(&mut self, session_id: &str) -> LedgerResult<bool> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM import_records WHERE session_id = ?",
            params![session_id],
        )?;
        let removed = tx.execute(
            "DELETE FROM import_sessions WHERE id = ?",
            params![session_id],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    // ==================== Attempts ====================

    /// Record one note attempt
    pub fn record_attempt(&mut self, attempt: &NewAttempt<'_>) -> LedgerResult<i64> {
        self.conn.execute(
            "INSERT INTO import_records
                (session_id, source_file, note_title, source_id, status, page_url,
                 error_message, attachments_count, attachments_uploaded, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                attempt.session_id,
                attempt.source_file,
                attempt.note_title,
                attempt.source_id,
                attempt.status.as_str(),
                attempt.page_url,
                attempt.error_message,
                attempt.attachments_count as i64,
                attempt.attachments_uploaded as i64,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Attempt records of a session, optionally filtered by status
    pub fn session_records(
        &self,
        session_id: &str,
        status: Option<ImportStatus>,
    ) -> LedgerResult<Vec<AttemptRecord>> {
        let mut sql = format!(
            "SELECT {} FROM import_records WHERE session_id = ?1",
            RECORD_COLUMNS
        );
        if status.is_some() {
            sql.push_str(" AND status = ?2");
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match status {
            Some(status) => stmt
                .query_map(params![session_id, status.as_str()], read_record_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(params![session_id], read_record_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };

        rows.into_iter().map(hydrate_record).collect()
    }

    /// Outcome counts per source file for a session
    pub fn session_file_summary(&self, session_id: &str) -> LedgerResult<Vec<FileSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT source_file,
                   COUNT(*),
                   SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END),
                   SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                   SUM(CASE WHEN status = 'skipped' THEN 1 ELSE 0 END)
            FROM import_records
            WHERE session_id = ?
            GROUP BY source_file
            ORDER BY source_file
            "#,
        )?;

        let summaries = stmt
            .query_map(params![session_id], |row| {
                Ok(FileSummary {
                    source_file: row.get(0)?,
                    total: row.get(1)?,
                    completed: row.get(2)?,
                    failed: row.get(3)?,
                    skipped: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    /// Overall counts across the ledger and all sessions
    pub fn stats(&self) -> LedgerResult<LedgerStats> {
        let count = |sql: &str| -> LedgerResult<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };

        Ok(LedgerStats {
            imported_notes: count("SELECT COUNT(*) FROM imported_notes")?,
            attempts: count("SELECT COUNT(*) FROM import_records")?,
            completed: count("SELECT COUNT(*) FROM import_records WHERE status = 'completed'")?,
            failed: count("SELECT COUNT(*) FROM import_records WHERE status = 'failed'")?,
            skipped: count("SELECT COUNT(*) FROM import_records WHERE status = 'skipped'")?,
            sessions: count("SELECT COUNT(*) FROM import_sessions")?,
        })
    }
}

impl Ledger for SqliteLedger {
    fn has_imported(&self, source_id: &str) -> LedgerResult<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM imported_notes WHERE source_id = ?")?;
        Ok(stmt.exists(params![source_id])?)
    }

    fn record_imported(&mut self, source_id: &str, imported_at: DateTime<Utc>) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO imported_notes (source_id, imported_at) VALUES (?, ?)",
            params![source_id, imported_at.timestamp_millis()],
        )?;
        Ok(())
    }
}

fn from_millis(column: &'static str, millis: i64) -> LedgerResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or(LedgerError::InvalidValue {
        column,
        value: millis.to_string(),
    })
}

fn read_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        source_path: row.get(1)?,
        wiki_url: row.get(2)?,
        target_space: row.get(3)?,
        total_notes: row.get(4)?,
        completed_notes: row.get(5)?,
        failed_notes: row.get(6)?,
        skipped_notes: row.get(7)?,
        status: row.get(8)?,
        started_at: row.get(9)?,
        finished_at: row.get(10)?,
    })
}

fn hydrate_session(row: SessionRow) -> LedgerResult<ImportSession> {
    Ok(ImportSession {
        id: row.id,
        source_path: row.source_path,
        wiki_url: row.wiki_url,
        target_space: row.target_space,
        total_notes: row.total_notes,
        completed_notes: row.completed_notes,
        failed_notes: row.failed_notes,
        skipped_notes: row.skipped_notes,
        status: row.status.parse()?,
        started_at: from_millis("started_at", row.started_at)?,
        finished_at: row
            .finished_at
            .map(|m| from_millis("finished_at", m))
            .transpose()?,
    })
}

fn read_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        source_file: row.get(2)?,
        note_title: row.get(3)?,
        source_id: row.get(4)?,
        status: row.get(5)?,
        page_url: row.get(6)?,
        error_message: row.get(7)?,
        attachments_count: row.get(8)?,
        attachments_uploaded: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn hydrate_record(row: RecordRow) -> LedgerResult<AttemptRecord> {
    Ok(AttemptRecord {
        id: row.id,
        session_id: row.session_id,
        source_file: row.source_file,
        note_title: row.note_title,
        source_id: row.source_id,
        status: row.status.parse()?,
        page_url: row.page_url,
        error_message: row.error_message,
        attachments_count: row.attachments_count,
        attachments_uploaded: row.attachments_uploaded,
        created_at: from_millis("created_at", row.created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt<'a>(session_id: &'a str, file: &'a str, id: &'a str, status: ImportStatus) -> NewAttempt<'a> {
        NewAttempt {
            session_id,
            source_file: file,
            note_title: "Title",
            source_id: id,
            status,
            page_url: None,
            error_message: None,
            attachments_count: 0,
            attachments_uploaded: 0,
        }
    }

    #[test]
    fn test_record_imported_is_idempotent() {
        let mut ledger = SqliteLedger::open_in_memory().unwrap();
        let first = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let later = DateTime::from_timestamp_millis(1_800_000_000_000).unwrap();

        assert!(!ledger.has_imported("n1").unwrap());
        ledger.record_imported("n1", first).unwrap();
        ledger.record_imported("n1", later).unwrap();

        assert!(ledger.has_imported("n1").unwrap());
        assert_eq!(ledger.imported_count().unwrap(), 1);
        assert_eq!(ledger.imported_at("n1").unwrap(), Some(first));
    }

    #[test]
    fn test_forget_and_clear() {
        let mut ledger = SqliteLedger::open_in_memory().unwrap();
        ledger.record_imported("a", Utc::now()).unwrap();
        ledger.record_imported("b", Utc::now()).unwrap();

        assert!(ledger.forget("a").unwrap());
        assert!(!ledger.forget("a").unwrap());
        assert_eq!(ledger.clear_imported().unwrap(), 1);
        assert_eq!(ledger.imported_count().unwrap(), 0);
    }

    #[test]
    fn test_session_lifecycle() {
        let mut ledger = SqliteLedger::open_in_memory().unwrap();
        let id = ledger
            .start_session("/exports", "https://wiki.example", "ImportedNotes", 3)
            .unwrap();

        let session = ledger.get_session(&id).unwrap().unwrap();
        assert_eq!(session.status, ImportStatus::InProgress);
        assert_eq!(session.total_notes, 3);
        assert!(session.finished_at.is_none());

        ledger.update_session_counts(&id, 2, 1, 0).unwrap();
        ledger.finish_session(&id, ImportStatus::Completed).unwrap();

        let session = ledger.get_session(&id).unwrap().unwrap();
        assert_eq!(session.completed_notes, 2);
        assert_eq!(session.failed_notes, 1);
        assert_eq!(session.status, ImportStatus::Completed);
        assert!(session.finished_at.is_some());

        assert!(matches!(
            ledger.finish_session("missing", ImportStatus::Failed),
            Err(LedgerError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_attempt_records_and_summary() {
        let mut ledger = SqliteLedger::open_in_memory().unwrap();
        let id = ledger.start_session("/exports", "w", "S", 3).unwrap();

        ledger
            .record_attempt(&attempt(&id, "a.enex", "1", ImportStatus::Completed))
            .unwrap();
        ledger
            .record_attempt(&attempt(&id, "a.enex", "2", ImportStatus::Failed))
            .unwrap();
        ledger
            .record_attempt(&attempt(&id, "b.enex", "3", ImportStatus::Skipped))
            .unwrap();

        assert_eq!(ledger.session_records(&id, None).unwrap().len(), 3);
        let failed = ledger
            .session_records(&id, Some(ImportStatus::Failed))
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].source_id, "2");

        let summary = ledger.session_file_summary(&id).unwrap();
        assert_eq!(
            summary,
            vec![
                FileSummary {
                    source_file: "a.enex".into(),
                    total: 2,
                    completed: 1,
                    failed: 1,
                    skipped: 0,
                },
                FileSummary {
                    source_file: "b.enex".into(),
                    total: 1,
                    completed: 0,
                    failed: 0,
                    skipped: 1,
                },
            ]
        );

        let stats = ledger.stats().unwrap();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.sessions, 1);
    }

    #[test]
    fn test_recent_and_delete_sessions() {
        let mut ledger = SqliteLedger::open_in_memory().unwrap();
        let first = ledger.start_session("one", "w", "S", 0).unwrap();
        let second = ledger.start_session("two", "w", "S", 0).unwrap();
        ledger
            .record_attempt(&attempt(&first, "a.enex", "1", ImportStatus::Completed))
            .unwrap();

        let recent = ledger.recent_sessions(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, second);

        assert!(ledger.delete_session(&first).unwrap());
        assert!(!ledger.delete_session(&first).unwrap());
        assert!(ledger.get_session(&first).unwrap().is_none());
        assert!(ledger.session_records(&first, None).unwrap().is_empty());
        assert_eq!(ledger.recent_sessions(1).unwrap().len(), 1);
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("imports.db");

        {
            let mut ledger = SqliteLedger::open(&path).unwrap();
            ledger.record_imported("persisted", Utc::now()).unwrap();
        }

        let ledger = SqliteLedger::open(&path).unwrap();
        assert!(ledger.has_imported("persisted").unwrap());
    }

    #[test]
    fn test_status_round_trip_names() {
        assert_eq!("skipped".parse::<ImportStatus>().unwrap(), ImportStatus::Skipped);
        assert!("bogus".parse::<ImportStatus>().is_err());
        assert_eq!(ImportStatus::InProgress.to_string(), "in_progress");
    }
}
