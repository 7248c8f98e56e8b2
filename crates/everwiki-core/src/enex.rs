//! ENEX bundle parsing
//!
//! Streams `<note>` elements out of an Evernote export with `quick-xml`,
//! yielding one `Note` at a time so large exports never sit in memory whole.
//!
//! A note missing its title or content yields a `ParseError` for that note
//! only; malformed XML ends the stream with a `ParseError`.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use tracing::{debug, warn};

use crate::enml::resolve_entity;
use crate::error::ParseError;
use crate::models::{Attachment, Note};

/// Default MIME type for resources that don't declare one
const DEFAULT_MIME: &str = "application/octet-stream";

/// Parse Evernote date format (YYYYMMDDTHHMMSSZ)
pub fn parse_enex_datetime(value: &str) -> Option<DateTime<Utc>> {
    let clean = value.trim();
    if clean.len() < 15 {
        return None;
    }

    NaiveDateTime::parse_from_str(clean.trim_end_matches('Z'), "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Lazy reader over the notes of one ENEX bundle
pub struct EnexReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    notebook: Option<String>,
    skip_resources: bool,
    /// Number of `<note>` elements seen so far
    index: usize,
    /// Open elements outside the current note
    depth: usize,
    done: bool,
}

impl<R: BufRead> EnexReader<R> {
    /// Wrap a buffered reader positioned at the start of an ENEX document
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(false);

        Self {
            reader,
            buf: Vec::new(),
            notebook: None,
            skip_resources: false,
            index: 0,
            depth: 0,
            done: false,
        }
    }

    /// Tag every note from this bundle with a notebook path
    pub fn with_notebook(mut self, notebook: Option<String>) -> Self {
        self.notebook = notebook;
        self
    }

    /// Don't decode resource payloads (for quick scans)
    pub fn skip_resources(mut self) -> Self {
        self.skip_resources = true;
        self
    }

    fn xml_error(&self, details: impl ToString) -> ParseError {
        ParseError::Xml {
            position: self.reader.buffer_position() as u64,
            details: details.to_string(),
        }
    }

    /// Advance to the next `<note>` and read it.
    ///
    /// Outer `Err` is fatal for the stream; the inner result belongs to one note.
    fn next_note(&mut self) -> Result<Option<Result<Note, ParseError>>, ParseError> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => return Err(self.xml_error(e)),
            };

            match event {
                Event::Start(e) => {
                    if e.local_name().as_ref() == b"note" {
                        self.index += 1;
                        return self.read_note().map(Some);
                    }
                    self.depth += 1;
                }
                Event::End(_) => {
                    self.depth = self.depth.saturating_sub(1);
                }
                Event::Empty(e) if e.local_name().as_ref() == b"note" => {
                    self.index += 1;
                    return Ok(Some(Err(ParseError::MissingField {
                        index: self.index,
                        field: "title",
                    })));
                }
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(self.xml_error("unexpected end of file"));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }

    /// Read the body of a `<note>` element up to its closing tag
    fn read_note(&mut self) -> Result<Result<Note, ParseError>, ParseError> {
        let mut builder = NoteBuilder::default();
        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();

        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => return Err(self.xml_error(e)),
            };

            match event {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if path.is_empty() && name == "resource" {
                        builder.resource = Some(ResourceBuilder::default());
                    }
                    path.push(name);
                    text.clear();
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    path.push(name);
                    builder.element_closed(&path, "", self.skip_resources);
                    path.pop();
                }
                Event::Text(e) => {
                    if !path.is_empty() {
                        // `e` still borrows the buffer, so no `&self` here
                        let position = self.reader.buffer_position() as u64;
                        let value =
                            e.unescape_with(resolve_entity)
                                .map_err(|err| ParseError::Xml {
                                    position,
                                    details: err.to_string(),
                                })?;
                        text.push_str(&value);
                    }
                }
                Event::CData(e) => {
                    if !path.is_empty() {
                        text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Event::End(_) => {
                    if path.is_empty() {
                        // </note>
                        return Ok(builder.build(self.index, self.notebook.clone()));
                    }
                    builder.element_closed(&path, &text, self.skip_resources);
                    path.pop();
                    text.clear();
                }
                Event::Eof => {
                    return Err(self.xml_error("unexpected end of file inside <note>"));
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for EnexReader<R> {
    type Item = Result<Note, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.next_note() {
            Ok(Some(note)) => Some(note),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[derive(Default)]
struct NoteBuilder {
    title: Option<String>,
    content: Option<String>,
    created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    tags: Vec<String>,
    source_url: Option<String>,
    attachments: Vec<Attachment>,
    resource: Option<ResourceBuilder>,
}

#[derive(Default)]
struct ResourceBuilder {
    data: Option<String>,
    mime: Option<String>,
    filename: Option<String>,
}

impl NoteBuilder {
    /// Record the text of an element that just closed, keyed by its path
    /// relative to `<note>`
    fn element_closed(&mut self, path: &[String], text: &str, skip_resources: bool) {
        let path: Vec<&str> = path.iter().map(String::as_str).collect();

        match path.as_slice() {
            ["title"] => self.title = Some(text.trim().to_string()),
            ["content"] => self.content = Some(text.to_string()),
            ["created"] => self.created = parse_enex_datetime(text),
            ["updated"] => self.updated = parse_enex_datetime(text),
            ["tag"] => {
                let tag = text.trim();
                if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
                    self.tags.push(tag.to_string());
                }
            }
            ["note-attributes", "source-url"] => {
                let url = text.trim();
                if !url.is_empty() {
                    self.source_url = Some(url.to_string());
                }
            }
            ["resource", "data"] if !skip_resources => {
                if let Some(resource) = self.resource.as_mut() {
                    resource.data = Some(text.to_string());
                }
            }
            ["resource", "mime"] => {
                if let Some(resource) = self.resource.as_mut() {
                    resource.mime = Some(text.trim().to_string());
                }
            }
            ["resource", "resource-attributes", "file-name"] => {
                if let Some(resource) = self.resource.as_mut() {
                    resource.filename = Some(text.trim().to_string());
                }
            }
            ["resource"] => {
                if let Some(resource) = self.resource.take() {
                    if let Some(attachment) = resource.finish(skip_resources) {
                        self.attachments.push(attachment);
                    }
                }
            }
            _ => {}
        }
    }

    fn build(self, index: usize, notebook: Option<String>) -> Result<Note, ParseError> {
        let title = self
            .title
            .filter(|t| !t.is_empty())
            .ok_or(ParseError::MissingField {
                index,
                field: "title",
            })?;
        let content = self.content.ok_or(ParseError::MissingField {
            index,
            field: "content",
        })?;

        let mut note = Note::new(title, content, self.created);
        note.updated = self.updated;
        note.tags = self.tags;
        note.attachments = self.attachments;
        note.source_url = self.source_url;
        note.notebook = notebook;
        Ok(note)
    }
}

impl ResourceBuilder {
    fn finish(self, skip_resources: bool) -> Option<Attachment> {
        let mime = self
            .mime
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MIME.to_string());

        if skip_resources {
            return Some(Attachment::from_data(Vec::new(), mime, self.filename));
        }

        let Some(encoded) = self.data else {
            warn!("Skipping resource without data ({})", mime);
            return None;
        };

        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            warn!("Skipping resource with empty data ({})", mime);
            return None;
        }

        match BASE64.decode(compact.as_bytes()) {
            Ok(data) => Some(Attachment::from_data(data, mime, self.filename)),
            Err(e) => {
                warn!("Skipping resource with undecodable data ({}): {}", mime, e);
                None
            }
        }
    }
}

/// Open an ENEX file for lazy parsing
pub fn parse_enex_file(path: &Path) -> Result<EnexReader<BufReader<File>>, ParseError> {
    debug!("Opening ENEX file {:?}", path);
    let file = File::open(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(EnexReader::new(BufReader::new(file)))
}

/// Parse ENEX content held in memory
pub fn parse_enex_str(xml: &str) -> EnexReader<&[u8]> {
    EnexReader::new(xml.as_bytes())
}

/// Parse every `.enex` file below `dir`.
///
/// Yields `(file, note)` pairs. Each note's notebook is the file's path
/// relative to `dir`, without extension, joined with dots
/// (`Projects/Archive/old.enex` → `Projects.Archive.old`).
pub fn parse_enex_directory(
    dir: &Path,
    recursive: bool,
) -> Result<impl Iterator<Item = (PathBuf, Result<Note, ParseError>)>, ParseError> {
    if !dir.is_dir() {
        return Err(ParseError::UnsupportedSource {
            path: dir.to_path_buf(),
        });
    }

    let files = find_enex_files(dir, recursive)?;
    let base = dir.to_path_buf();

    Ok(files.into_iter().flat_map(move |file| {
        let notebook = notebook_path(&base, &file);
        let notes: Box<dyn Iterator<Item = Result<Note, ParseError>>> =
            match parse_enex_file(&file) {
                Ok(reader) => Box::new(reader.with_notebook(notebook)),
                Err(e) => Box::new(std::iter::once(Err(e))),
            };
        notes.map(move |note| (file.clone(), note))
    }))
}

/// Find `.enex` files in a directory, sorted by path
pub fn find_enex_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, ParseError> {
    let mut files = Vec::new();
    collect_enex_files(dir, recursive, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_enex_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<(), ParseError> {
    let entries = fs::read_dir(dir).map_err(|source| ParseError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let path = entry
            .map_err(|source| ParseError::Read {
                path: dir.to_path_buf(),
                source,
            })?
            .path();

        if path.is_dir() {
            if recursive {
                collect_enex_files(&path, recursive, out)?;
            }
        } else if is_enex_file(&path) {
            out.push(path);
        }
    }

    Ok(())
}

fn is_enex_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("enex"))
        .unwrap_or(false)
}

/// Notebook path for a file relative to the import root
fn notebook_path(base: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(base).unwrap_or(file);
    let mut parts: Vec<String> = relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    parts.push(relative.file_stem()?.to_string_lossy().into_owned());
    Some(parts.join("."))
}

/// Lightweight per-note summary used for inventories
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NoteSummary {
    pub title: String,
    pub created: Option<DateTime<Utc>>,
    /// False when the note is missing a required field
    pub valid: bool,
}

/// Note summaries for each ENEX file of an import source
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inventory {
    pub files: Vec<(PathBuf, Vec<NoteSummary>)>,
    /// Files that could not be read to the end, with the error
    pub unreadable: Vec<(PathBuf, String)>,
    pub total: usize,
}

/// Summarise the notes of one ENEX file without decoding resources
pub fn summarize_enex_file(path: &Path) -> Result<Vec<NoteSummary>, ParseError> {
    match summarize_readable(path) {
        (summaries, None) => Ok(summaries),
        (_, Some(e)) => Err(e),
    }
}

/// Summaries of the notes read before any fatal error, plus that error
fn summarize_readable(path: &Path) -> (Vec<NoteSummary>, Option<ParseError>) {
    let mut summaries = Vec::new();
    let reader = match parse_enex_file(path) {
        Ok(reader) => reader,
        Err(e) => return (summaries, Some(e)),
    };

    for note in reader.skip_resources() {
        match note {
            Ok(note) => summaries.push(NoteSummary {
                title: note.title,
                created: note.created,
                valid: true,
            }),
            Err(ParseError::MissingField { .. }) => summaries.push(NoteSummary {
                title: "Untitled".to_string(),
                created: None,
                valid: false,
            }),
            Err(e) => return (summaries, Some(e)),
        }
    }
    (summaries, None)
}

/// Count the notes in an ENEX file or directory tree
pub fn count_notes(path: &Path) -> Result<usize, ParseError> {
    Ok(build_inventory(path)?.total)
}

/// Build an inventory over a single `.enex` file or a directory tree
///
/// A malformed file does not stop the scan: the notes read before the error
/// are counted and the file is listed in [`Inventory::unreadable`].
pub fn build_inventory(source: &Path) -> Result<Inventory, ParseError> {
    let files = if source.is_file() && is_enex_file(source) {
        vec![source.to_path_buf()]
    } else if source.is_dir() {
        find_enex_files(source, true)?
    } else {
        return Err(ParseError::UnsupportedSource {
            path: source.to_path_buf(),
        });
    };

    let mut inventory = Inventory::default();
    for file in files {
        let (summaries, error) = summarize_readable(&file);
        if let Some(e) = error {
            warn!("Could not read all of {:?}: {}", file, e);
            inventory.unreadable.push((file.clone(), e.to_string()));
        }
        inventory.total += summaries.len();
        inventory.files.push((file, summaries));
    }
    Ok(inventory)
}
