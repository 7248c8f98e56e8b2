//! Evernote API note objects
//!
//! Reads note objects as the Evernote API returns them, serialised to JSON,
//! and turns them into [`Note`]s. Tag GUIDs are resolved through a
//! [`TagDirectory`]; names given inline in `tagNames` are used as they are.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::error::ParseError;
use crate::models::{Attachment, Note};

const DEFAULT_MIME: &str = "application/octet-stream";

/// One note object
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiNote {
    pub guid: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    /// Epoch milliseconds
    pub created: Option<i64>,
    /// Epoch milliseconds
    pub updated: Option<i64>,
    pub tag_guids: Vec<String>,
    pub tag_names: Vec<String>,
    pub resources: Vec<ApiResource>,
    pub attributes: Option<ApiNoteAttributes>,
    /// Notebook name, when the export carries it
    pub notebook: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiNoteAttributes {
    #[serde(rename = "sourceURL")]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiResource {
    pub guid: Option<String>,
    pub mime: Option<String>,
    pub data: Option<ApiData>,
    pub attributes: Option<ApiResourceAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiData {
    /// Base64 payload
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiResourceAttributes {
    pub file_name: Option<String>,
}

/// GUID → tag name lookup
#[derive(Debug, Clone, Default)]
pub struct TagDirectory {
    names: HashMap<String, String>,
}

impl TagDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, guid: impl Into<String>, name: impl Into<String>) {
        self.names.insert(guid.into(), name.into());
    }

    pub fn resolve(&self, guid: &str) -> Option<&str> {
        self.names.get(guid).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagDirectory {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut directory = TagDirectory::new();
        for (guid, name) in iter {
            directory.insert(guid, name);
        }
        directory
    }
}

impl ApiResource {
    fn into_attachment(self) -> Option<Attachment> {
        let body = self.data.and_then(|d| d.body)?;
        let cleaned: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        let data = match BASE64.decode(cleaned) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    "Skipping resource {} with undecodable body: {}",
                    self.guid.as_deref().unwrap_or("?"),
                    e
                );
                return None;
            }
        };

        let mime = self
            .mime
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        let filename = self.attributes.and_then(|a| a.file_name);
        Some(Attachment::from_data(data, mime, filename))
    }
}

impl ApiNote {
    /// Convert into a [`Note`], resolving tag GUIDs through `tags`
    pub fn into_note(self, tags: &TagDirectory) -> Result<Note, ParseError> {
        self.into_note_at(tags, 1)
    }

    fn into_note_at(self, tags: &TagDirectory, index: usize) -> Result<Note, ParseError> {
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ParseError::MissingField {
                index,
                field: "title",
            })?;
        let content = self.content.ok_or(ParseError::MissingField {
            index,
            field: "content",
        })?;

        let created = self.created.and_then(DateTime::<Utc>::from_timestamp_millis);
        let mut note = Note::new(title, content, created);
        note.updated = self.updated.and_then(DateTime::<Utc>::from_timestamp_millis);
        note.source_url = self
            .attributes
            .and_then(|a| a.source_url)
            .filter(|u| !u.is_empty());
        note.notebook = self.notebook.filter(|n| !n.trim().is_empty());

        let mut names = self.tag_names;
        for guid in &self.tag_guids {
            match tags.resolve(guid) {
                Some(name) => names.push(name.to_string()),
                None => warn!("Unknown tag GUID {} on note '{}'", guid, note.title),
            }
        }
        for name in names {
            if !name.is_empty() && !note.tags.contains(&name) {
                note.tags.push(name);
            }
        }

        note.attachments = self
            .resources
            .into_iter()
            .filter_map(ApiResource::into_attachment)
            .collect();

        Ok(note)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Many(Vec<ApiNote>),
    One(Box<ApiNote>),
}

/// Parse a JSON document holding one note object or an array of them
pub fn parse_api_notes(json: &str) -> Result<Vec<Result<Note, ParseError>>, ParseError> {
    parse_api_notes_with_tags(json, &TagDirectory::new())
}

/// Like [`parse_api_notes`], resolving tag GUIDs through `tags`
pub fn parse_api_notes_with_tags(
    json: &str,
    tags: &TagDirectory,
) -> Result<Vec<Result<Note, ParseError>>, ParseError> {
    let notes = match serde_json::from_str::<Payload>(json) {
        Ok(Payload::Many(notes)) => notes,
        Ok(Payload::One(note)) => vec![*note],
        // Re-parse as a single object to surface serde's own message
        Err(_) => vec![serde_json::from_str::<ApiNote>(json)?],
    };

    Ok(notes
        .into_iter()
        .enumerate()
        .map(|(i, note)| note.into_note_at(tags, i + 1))
        .collect())
}
