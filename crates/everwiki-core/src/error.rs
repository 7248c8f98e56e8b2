//! Pipeline error types
//!
//! One error type per pipeline stage, so a caller can tell a bad export
//! from a bad note body from a destination that refused the upload.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading notes from an ENEX bundle or API response
#[derive(Error, Debug)]
pub enum ParseError {
    /// Source file could not be opened or read
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The export is not well-formed XML
    #[error("Malformed XML at byte {position}: {details}")]
    Xml { position: u64, details: String },

    /// A note lacks a field every note must carry
    #[error("Note #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    /// API payload is not valid JSON for a note object
    #[error("Invalid API note JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Path is neither an `.enex` file nor a directory
    #[error("Source is not an ENEX file or directory: '{path}'")]
    UnsupportedSource { path: PathBuf },
}

impl ParseError {
    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ParseError::Xml { .. } => {
                Some("Re-export the notebook from Evernote; the file appears truncated or corrupted.")
            }
            ParseError::UnsupportedSource { .. } => {
                Some("Pass a .enex file, a .json API dump, or a directory containing .enex files.")
            }
            _ => None,
        }
    }
}

/// Errors raised while converting a note body to XWiki markup
#[derive(Error, Debug)]
pub enum ConversionError {
    /// The ENML body is not valid markup
    #[error("Invalid ENML at byte {position}: {details}")]
    InvalidMarkup { position: u64, details: String },

    /// An element was opened but never closed
    #[error("Unclosed element <{element}> in ENML")]
    UnclosedElement { element: String },
}

/// Errors raised when the destination wiki rejects a page
#[derive(Error, Debug)]
pub enum UploadError {
    /// Transport-level failure (DNS, TLS, connection reset, timeout)
    #[error("Request to '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// XWiki answered the page write with a non-success status
    #[error("XWiki rejected page '{page}' with HTTP {status}: {body}")]
    PageRejected {
        page: String,
        status: u16,
        body: String,
    },

    /// The write was accepted but the page cannot be read back
    #[error("Page '{page}' reported as saved but could not be found afterwards")]
    VerificationFailed { page: String },

    /// The REST root did not answer with 200
    #[error("Cannot reach XWiki REST API at '{url}' (HTTP {status})")]
    ConnectionFailed { url: String, status: u16 },

    /// Wiki base URL cannot be turned into REST URLs
    #[error("Invalid wiki URL '{url}': {details}")]
    InvalidUrl { url: String, details: String },
}

impl UploadError {
    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            UploadError::PageRejected { status: 401, .. }
            | UploadError::PageRejected { status: 403, .. }
            | UploadError::ConnectionFailed { status: 401, .. }
            | UploadError::ConnectionFailed { status: 403, .. } => {
                Some("Check XWIKI_USERNAME / XWIKI_PASSWORD and the user's edit rights on the target space.")
            }
            UploadError::Http { .. } => Some("Check the wiki URL and your network connection."),
            UploadError::InvalidUrl { .. } => {
                Some("Set wiki_url to the wiki root, e.g. https://yourwiki.xwiki.cloud")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let err = ParseError::MissingField {
            index: 3,
            field: "title",
        };
        let msg = err.to_string();
        assert!(msg.contains("#3"));
        assert!(msg.contains("title"));
    }

    #[test]
    fn test_upload_error_suggestions() {
        let err = UploadError::PageRejected {
            page: "Notes.Page".to_string(),
            status: 401,
            body: String::new(),
        };
        assert!(err.recovery_suggestion().is_some());
        assert!(err.to_string().contains("401"));

        let err = UploadError::PageRejected {
            page: "Notes.Page".to_string(),
            status: 500,
            body: "boom".to_string(),
        };
        assert!(err.recovery_suggestion().is_none());
    }

    #[test]
    fn test_unclosed_element_display() {
        let err = ConversionError::UnclosedElement {
            element: "div".to_string(),
        };
        assert!(err.to_string().contains("<div>"));
    }
}
