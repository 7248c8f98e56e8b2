//! Import pipeline
//!
//! Drives notes through conversion, the ledger check and the upload, one
//! note at a time. A note's failure is reported in its outcome and never
//! stops the run; the ledger only changes after a complete upload.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::convert::{convert_note, ConvertOptions};
use crate::error::{ConversionError, ParseError, UploadError};
use crate::ledger::{Ledger, LedgerError};
use crate::models::{ConvertedPage, Note};
use crate::xwiki::{UploadReport, Uploader};

/// Why a note did not make it to the wiki
#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Options for an import run
#[derive(Clone, Copy)]
pub struct ImportOptions<'a> {
    /// Convert only; never upload or record
    pub dry_run: bool,
    /// Skip notes the ledger already lists
    pub skip_imported: bool,
    /// Skip notes whose page already exists in the wiki
    pub skip_existing_pages: bool,
    pub convert: ConvertOptions<'a>,
}

impl Default for ImportOptions<'_> {
    fn default() -> Self {
        Self {
            dry_run: false,
            skip_imported: true,
            skip_existing_pages: false,
            convert: ConvertOptions::default(),
        }
    }
}

/// Identity of a processed note
#[derive(Debug, Clone, Serialize)]
pub struct NoteRef {
    pub source_id: String,
    pub title: String,
}

impl NoteRef {
    fn of(note: &Note) -> Self {
        Self {
            source_id: note.source_id.clone(),
            title: note.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Listed in the ledger
    AlreadyImported,
    /// A page with the same reference exists in the wiki
    PageExists,
}

/// What happened to one note
#[derive(Debug)]
pub enum NoteOutcome {
    /// Uploaded completely and recorded in the ledger
    Imported {
        note: NoteRef,
        report: UploadReport,
        warnings: Vec<String>,
    },
    /// Page stored but some attachments or tags failed; not recorded
    Partial {
        note: NoteRef,
        report: UploadReport,
        warnings: Vec<String>,
    },
    Skipped {
        note: NoteRef,
        reason: SkipReason,
    },
    /// Converted in a dry run
    Converted {
        note: NoteRef,
        reference: String,
        attachments: usize,
        warnings: Vec<String>,
    },
    /// `note` is `None` when the note could not be parsed
    Failed {
        note: Option<NoteRef>,
        error: ImportError,
    },
}

impl NoteOutcome {
    pub fn note(&self) -> Option<&NoteRef> {
        match self {
            NoteOutcome::Imported { note, .. }
            | NoteOutcome::Partial { note, .. }
            | NoteOutcome::Skipped { note, .. }
            | NoteOutcome::Converted { note, .. } => Some(note),
            NoteOutcome::Failed { note, .. } => note.as_ref(),
        }
    }

    /// Short label for logs and history records
    pub fn label(&self) -> &'static str {
        match self {
            NoteOutcome::Imported { .. } => "imported",
            NoteOutcome::Partial { .. } => "partial",
            NoteOutcome::Skipped { .. } => "skipped",
            NoteOutcome::Converted { .. } => "converted",
            NoteOutcome::Failed { .. } => "failed",
        }
    }
}

/// Counts over a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub partial: usize,
    pub skipped: usize,
    pub converted: usize,
    pub failed: usize,
}

impl ImportSummary {
    pub fn record(&mut self, outcome: &NoteOutcome) {
        match outcome {
            NoteOutcome::Imported { .. } => self.imported += 1,
            NoteOutcome::Partial { .. } => self.partial += 1,
            NoteOutcome::Skipped { .. } => self.skipped += 1,
            NoteOutcome::Converted { .. } => self.converted += 1,
            NoteOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.imported + self.partial + self.skipped + self.converted + self.failed
    }
}

/// Moves notes from a parser into the wiki
pub struct Importer<'a, L: Ledger, U: Uploader> {
    ledger: &'a mut L,
    uploader: Option<&'a U>,
    options: ImportOptions<'a>,
    /// Page reference → title of the first note written there this run
    pages: HashMap<String, String>,
}

impl<'a, L: Ledger, U: Uploader> Importer<'a, L, U> {
    pub fn new(ledger: &'a mut L, uploader: &'a U, options: ImportOptions<'a>) -> Self {
        Self {
            ledger,
            uploader: Some(uploader),
            options,
            pages: HashMap::new(),
        }
    }

    /// Importer that can only convert; forces a dry run
    pub fn without_uploader(ledger: &'a mut L, mut options: ImportOptions<'a>) -> Self {
        options.dry_run = true;
        Self {
            ledger,
            uploader: None,
            options,
            pages: HashMap::new(),
        }
    }

    pub fn options(&self) -> &ImportOptions<'a> {
        &self.options
    }

    /// Access the ledger between notes (e.g. to write history)
    pub fn ledger_mut(&mut self) -> &mut L {
        self.ledger
    }

    /// Process one parser item
    pub fn import_note(&mut self, item: Result<Note, ParseError>) -> NoteOutcome {
        let note = match item {
            Ok(note) => note,
            Err(e) => {
                warn!("Skipping unreadable note: {}", e);
                return NoteOutcome::Failed {
                    note: None,
                    error: e.into(),
                };
            }
        };
        let note_ref = NoteRef::of(&note);

        let outcome = self.process(note, note_ref);
        match &outcome {
            NoteOutcome::Failed { note, error } => {
                let title = note.as_ref().map(|n| n.title.as_str()).unwrap_or("?");
                warn!("Failed '{}': {}", title, error);
            }
            other => {
                if let Some(note) = other.note() {
                    info!("{} '{}'", other.label(), note.title);
                }
            }
        }
        outcome
    }

    fn process(&mut self, note: Note, note_ref: NoteRef) -> NoteOutcome {
        if self.options.skip_imported {
            match self.ledger.has_imported(&note.source_id) {
                Ok(true) => {
                    return NoteOutcome::Skipped {
                        note: note_ref,
                        reason: SkipReason::AlreadyImported,
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    return NoteOutcome::Failed {
                        note: Some(note_ref),
                        error: e.into(),
                    }
                }
            }
        }

        let mut page = match convert_note(note, &self.options.convert) {
            Ok(page) => page,
            Err(e) => {
                return NoteOutcome::Failed {
                    note: Some(note_ref),
                    error: e.into(),
                }
            }
        };

        self.claim_page(&mut page);

        let uploader = match self.uploader {
            Some(uploader) if !self.options.dry_run => uploader,
            _ => {
                return NoteOutcome::Converted {
                    note: note_ref,
                    reference: page.reference(),
                    attachments: page.attachments.len(),
                    warnings: page.warnings,
                }
            }
        };

        if self.options.skip_existing_pages {
            match uploader.page_exists(&page.space, &page.page_name) {
                Ok(true) => {
                    return NoteOutcome::Skipped {
                        note: note_ref,
                        reason: SkipReason::PageExists,
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    return NoteOutcome::Failed {
                        note: Some(note_ref),
                        error: e.into(),
                    }
                }
            }
        }

        let warnings = page.warnings.clone();
        let report = match uploader.upload(page) {
            Ok(report) => report,
            Err(e) => {
                return NoteOutcome::Failed {
                    note: Some(note_ref),
                    error: e.into(),
                }
            }
        };

        if !report.is_complete() {
            return NoteOutcome::Partial {
                note: note_ref,
                report,
                warnings,
            };
        }

        if let Err(e) = self.ledger.record_imported(&note_ref.source_id, Utc::now()) {
            return NoteOutcome::Failed {
                note: Some(note_ref),
                error: e.into(),
            };
        }

        NoteOutcome::Imported {
            note: note_ref,
            report,
            warnings,
        }
    }

    /// Note the page reference; a repeat within the run overwrites the earlier page
    fn claim_page(&mut self, page: &mut ConvertedPage) {
        let reference = page.reference();
        match self.pages.get(&reference) {
            Some(first) => {
                warn!(
                    "Page {} already written by '{}' in this run; '{}' replaces it",
                    reference, first, page.title
                );
                page.warnings.push(format!(
                    "Page {} was already written by note '{}' in this run and is overwritten",
                    reference, first
                ));
            }
            None => {
                self.pages.insert(reference, page.title.clone());
            }
        }
    }

    /// Process every item, calling `on_outcome` after each note
    pub fn run<I, F>(&mut self, notes: I, mut on_outcome: F) -> ImportSummary
    where
        I: IntoIterator<Item = Result<Note, ParseError>>,
        F: FnMut(&NoteOutcome),
    {
        let mut summary = ImportSummary::default();
        for item in notes {
            let outcome = self.import_note(item);
            summary.record(&outcome);
            on_outcome(&outcome);
        }
        summary
    }
}
