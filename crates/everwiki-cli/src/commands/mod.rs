//! Command handlers

pub mod check;
pub mod config;
pub mod convert;
pub mod history;
pub mod import;
pub mod reset;
pub mod scan;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use everwiki_core::{build_inventory, parse_api_notes, parse_enex_directory, parse_enex_file};
use everwiki_core::{Note, ParseError};

/// Notes paired with the file they came from
pub type SourceNotes = Box<dyn Iterator<Item = (PathBuf, Result<Note, ParseError>)>>;

/// Where notes are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    EnexFile,
    EnexDirectory,
    ApiJson,
}

impl SourceKind {
    pub fn detect(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Ok(SourceKind::EnexDirectory);
        }
        if !path.exists() {
            bail!("Source not found: {}", path.display());
        }
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("enex") => Ok(SourceKind::EnexFile),
            Some("json") => Ok(SourceKind::ApiJson),
            _ => Err(ParseError::UnsupportedSource {
                path: path.to_path_buf(),
            }
            .into()),
        }
    }
}

/// Open a source for lazy iteration
pub fn open_notes(path: &Path) -> Result<SourceNotes> {
    match SourceKind::detect(path)? {
        SourceKind::EnexFile => {
            let file = path.to_path_buf();
            let reader = parse_enex_file(path)?;
            Ok(Box::new(reader.map(move |note| (file.clone(), note))))
        }
        SourceKind::EnexDirectory => Ok(Box::new(parse_enex_directory(path, true)?)),
        SourceKind::ApiJson => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file = path.to_path_buf();
            let notes = parse_api_notes(&json)?;
            Ok(Box::new(notes.into_iter().map(move |note| (file.clone(), note))))
        }
    }
}

/// Number of notes a source holds
pub fn count_notes(path: &Path) -> Result<usize> {
    match SourceKind::detect(path)? {
        SourceKind::ApiJson => Ok(open_notes(path)?.count()),
        _ => Ok(build_inventory(path)?.total),
    }
}

/// Ask for confirmation on an interactive terminal
///
/// Returns false when stdin is not a terminal.
pub fn confirm(prompt: &str) -> Result<bool> {
    use std::io::{self, IsTerminal, Write};

    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<en-export>
  <note><title>One</title><content><![CDATA[<en-note>1</en-note>]]></content></note>
  <note><title>Two</title><content><![CDATA[<en-note>2</en-note>]]></content></note>
</en-export>"#;

    #[test]
    fn test_detect_source_kind() {
        let dir = tempfile::tempdir().unwrap();
        let enex = dir.path().join("a.ENEX");
        let json = dir.path().join("notes.json");
        let other = dir.path().join("notes.txt");
        std::fs::write(&enex, EXPORT).unwrap();
        std::fs::write(&json, "[]").unwrap();
        std::fs::write(&other, "").unwrap();

        assert_eq!(SourceKind::detect(dir.path()).unwrap(), SourceKind::EnexDirectory);
        assert_eq!(SourceKind::detect(&enex).unwrap(), SourceKind::EnexFile);
        assert_eq!(SourceKind::detect(&json).unwrap(), SourceKind::ApiJson);
        assert!(SourceKind::detect(&other).is_err());
        assert!(SourceKind::detect(&dir.path().join("missing.enex")).is_err());
    }

    #[test]
    fn test_open_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let enex = dir.path().join("export.enex");
        let json = dir.path().join("api.json");
        std::fs::write(&enex, EXPORT).unwrap();
        std::fs::write(&json, r#"{"title": "Api", "content": "<en-note/>"}"#).unwrap();

        assert_eq!(count_notes(&enex).unwrap(), 2);
        assert_eq!(count_notes(&json).unwrap(), 1);

        let titles: Vec<String> = open_notes(&enex)
            .unwrap()
            .map(|(file, note)| {
                assert_eq!(file, enex);
                note.unwrap().title
            })
            .collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }
}
