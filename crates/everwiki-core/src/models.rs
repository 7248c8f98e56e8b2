//! Data models for everwiki
//!
//! Defines the records handed between pipeline stages: `Note` and
//! `Attachment` (parser output) and `ConvertedPage` (converter output).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Page name used when a title sanitises to nothing
pub const UNTITLED_PAGE: &str = "UntitledNote";

/// Longest page name XWiki gets from us
const MAX_PAGE_NAME_LEN: usize = 100;

/// A binary resource attached to a note
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    /// File name used for the upload and for references in the page body
    pub filename: String,
    /// MIME type reported by Evernote
    pub mime_type: String,
    /// Raw payload
    #[serde(skip)]
    pub data: Vec<u8>,
    /// Lowercase hex MD5 of `data`; ENML `<en-media hash>` points at this
    pub hash: String,
}

impl Attachment {
    /// Build an attachment from its payload, computing the MD5 hash.
    ///
    /// Without a usable filename one is derived from the hash and MIME type.
    pub fn from_data(data: Vec<u8>, mime_type: impl Into<String>, filename: Option<String>) -> Self {
        let mime_type = mime_type.into();
        let hash = format!("{:x}", md5::compute(&data));
        let filename = filename
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| format!("{}{}", hash, extension_for_mime(&mime_type)));

        Self {
            filename,
            mime_type,
            data,
            hash,
        }
    }

    /// Whether the attachment should be embedded as an image
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// File extension (with leading dot) for the MIME type, empty if unknown
    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Map a MIME type to a file extension (with leading dot)
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => ".png",
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "image/bmp" => ".bmp",
        "application/pdf" => ".pdf",
        "audio/mpeg" => ".mp3",
        "audio/wav" => ".wav",
        "video/mp4" => ".mp4",
        "text/plain" => ".txt",
        "application/msword" => ".doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => ".docx",
        "application/vnd.ms-excel" => ".xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => ".xlsx",
        _ => "",
    }
}

/// Normalise a resource hash for lookups (lowercase, no dashes)
pub fn normalize_hash(hash: &str) -> String {
    hash.trim().to_ascii_lowercase().replace('-', "")
}

/// An Evernote note as read from an ENEX bundle or the API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    /// Stable identifier, used as the ledger key
    pub source_id: String,
    /// Note title
    pub title: String,
    /// ENML body
    pub content: String,
    /// When the note was created in Evernote
    pub created: Option<DateTime<Utc>>,
    /// When the note was last updated in Evernote
    pub updated: Option<DateTime<Utc>>,
    /// Tag names
    pub tags: Vec<String>,
    /// Resources referenced from the body
    pub attachments: Vec<Attachment>,
    /// Web clip origin, if any
    pub source_url: Option<String>,
    /// Dot-separated notebook path (e.g. `Projects.Archive`)
    pub notebook: Option<String>,
}

impl Note {
    /// Create a note; the source id is derived from title and creation date
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        created: Option<DateTime<Utc>>,
    ) -> Self {
        let title = title.into();
        Self {
            source_id: generate_note_identifier(&title, created),
            title,
            content: content.into(),
            created,
            updated: None,
            tags: Vec::new(),
            attachments: Vec::new(),
            source_url: None,
            notebook: None,
        }
    }

    /// Find an attachment by its MD5 hash (case and dash insensitive)
    pub fn get_attachment_by_hash(&self, hash: &str) -> Option<&Attachment> {
        let wanted = normalize_hash(hash);
        if wanted.is_empty() {
            return None;
        }
        self.attachments
            .iter()
            .find(|a| normalize_hash(&a.hash) == wanted)
    }
}

/// Derive the ledger key for a note.
///
/// First 16 hex characters of SHA-256 over `"{title}_{created}"`, or over the
/// bare title when the creation date is unknown.
pub fn generate_note_identifier(title: &str, created: Option<DateTime<Utc>>) -> String {
    let key = match created {
        Some(created) => format!("{}_{}", title, created.format("%Y-%m-%dT%H:%M:%S")),
        None => title.to_string(),
    };
    let digest = Sha256::digest(key.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

/// A note rendered to XWiki markup, ready for upload
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConvertedPage {
    /// Ledger key of the note this page came from
    pub source_id: String,
    /// Page title (the original note title)
    pub title: String,
    /// Dot-separated XWiki space path
    pub space: String,
    /// Sanitised page name inside `space`
    pub page_name: String,
    /// XWiki 2.1 markup
    pub content: String,
    /// Tag names
    pub tags: Vec<String>,
    /// Attachments to upload next to the page
    pub attachments: Vec<Attachment>,
    /// Original creation date
    pub created: Option<DateTime<Utc>>,
    /// Original update date
    pub updated: Option<DateTime<Utc>>,
    /// Non-fatal conversion notices
    pub warnings: Vec<String>,
}

impl ConvertedPage {
    /// Full dot-separated reference (`Space.Sub.PageName`)
    pub fn reference(&self) -> String {
        format!("{}.{}", self.space, self.page_name)
    }

    /// Find an attachment by filename
    pub fn attachment(&self, filename: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.filename == filename)
    }
}

/// Turn a note title into a valid XWiki page name
pub fn sanitize_page_name(title: &str) -> String {
    let mut name = String::with_capacity(title.len());
    for c in title.chars() {
        match c {
            '/' | '\\' | ':' | '|' => name.push('-'),
            '?' | '*' | '"' | '<' | '>' => {}
            c if c.is_whitespace() => {}
            c => name.push(c),
        }
    }

    let name: String = name.chars().take(MAX_PAGE_NAME_LEN).collect();
    if name.is_empty() {
        UNTITLED_PAGE.to_string()
    } else {
        name
    }
}

/// Turn a notebook path into a space path fragment.
///
/// Spaces are dropped; path separators become dots.
pub fn sanitize_space(notebook: &str) -> String {
    notebook
        .chars()
        .filter(|c| *c != ' ')
        .map(|c| if c == '/' || c == '\\' { '.' } else { c })
        .collect::<String>()
        .split('.')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}
