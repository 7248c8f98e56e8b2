//! Import ledger
//!
//! Remembers which source notes already reached the wiki so that a second
//! run skips them.
//!
//! ## Implementations
//!
//! - `MemoryLedger`: process-lifetime map, for dry runs and tests
//! - `SqliteLedger`: `{data_dir}/imports.db`, which also keeps session and
//!   per-note attempt history

pub mod error;
pub mod schema;
pub mod sqlite;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

pub use error::{LedgerError, LedgerResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::{
    AttemptRecord, FileSummary, ImportSession, ImportStatus, LedgerStats, NewAttempt, SqliteLedger,
};

/// Key-value record of imported notes.
///
/// A source id is recorded at most once; recording it again keeps the
/// first timestamp.
pub trait Ledger {
    fn has_imported(&self, source_id: &str) -> LedgerResult<bool>;

    fn record_imported(&mut self, source_id: &str, imported_at: DateTime<Utc>) -> LedgerResult<()>;
}

/// In-memory ledger
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    entries: HashMap<String, DateTime<Utc>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// When a note was recorded, if it was
    pub fn imported_at(&self, source_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(source_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Ledger for MemoryLedger {
    fn has_imported(&self, source_id: &str) -> LedgerResult<bool> {
        Ok(self.entries.contains_key(source_id))
    }

    fn record_imported(&mut self, source_id: &str, imported_at: DateTime<Utc>) -> LedgerResult<()> {
        self.entries
            .entry(source_id.to_string())
            .or_insert(imported_at);
        Ok(())
    }
}
