//! Ledger error handling

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing the import ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Failed to create the directory holding the database
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Database file could not be opened
    #[error("Failed to open ledger database '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Database was written by a newer version
    #[error("Ledger schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// No session with this id
    #[error("Import session '{0}' not found")]
    SessionNotFound(String),

    /// Stored value can't be decoded
    #[error("Invalid value in ledger column '{column}': {value}")]
    InvalidValue { column: &'static str, value: String },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl LedgerError {
    /// Create an error from an I/O error with path context
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => LedgerError::PermissionDenied {
                path,
                source: error,
            },
            _ => LedgerError::CreateDirectory {
                path,
                source: error,
            },
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            LedgerError::PermissionDenied { .. } => {
                Some("Check file and directory permissions, or point data_dir somewhere writable.")
            }
            LedgerError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            LedgerError::UnsupportedSchema { .. } => {
                Some("Upgrade everwiki, or move the ledger aside to start a fresh one.")
            }
            LedgerError::SessionNotFound(_) => {
                Some("Run `everwiki history` to list known sessions.")
            }
            _ => None,
        }
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
