//! everwiki Core Library
//!
//! This crate provides the core functionality for everwiki, which moves
//! Evernote notes into an XWiki instance.
//!
//! # Architecture
//!
//! Notes flow through four stages:
//!
//! - **Parse**: ENEX bundles (`enex`) or API note objects (`api`) become `Note`s
//! - **Convert**: ENML bodies become a `Document`, rendered as XWiki 2.1 markup
//! - **Check**: the import ledger skips notes that already reached the wiki
//! - **Upload**: pages, attachments and tags go through the XWiki REST API
//!
//! `pipeline::Importer` ties the stages together and reports one outcome per
//! note; a failing note never stops the others.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let mut ledger = SqliteLedger::open(&config.ledger_path())?;
//! let client = XWikiClient::new(&config.xwiki_settings()?)?;
//!
//! let mut importer = Importer::new(&mut ledger, &client, ImportOptions::default());
//! let summary = importer.run(parse_enex_file(path)?, |_| {});
//! ```
//!
//! # Modules
//!
//! - `enex`, `api`: note sources
//! - `enml`, `convert`, `document`, `render`: ENML to XWiki conversion
//! - `fetch`: downloads images referenced by URL
//! - `ledger`: import ledger and history (SQLite)
//! - `xwiki`: XWiki REST client
//! - `pipeline`: per-note import flow
//! - `config`: Application configuration

pub mod api;
pub mod config;
pub mod convert;
pub mod document;
pub mod enex;
pub mod enml;
pub mod error;
pub mod fetch;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod xwiki;

pub use api::{parse_api_notes, ApiNote, TagDirectory};
pub use config::Config;
pub use convert::{convert_enml, convert_note, ConvertOptions, Converter};
pub use document::{Block, Document, Inline};
pub use enex::{
    build_inventory, count_notes, parse_enex_directory, parse_enex_file, parse_enex_str,
    EnexReader, Inventory,
};
pub use error::{ConversionError, ParseError, UploadError};
pub use fetch::{HttpImageFetcher, ImageFetcher};
pub use ledger::{Ledger, LedgerError, MemoryLedger, SqliteLedger};
pub use models::{Attachment, ConvertedPage, Note};
pub use pipeline::{ImportError, ImportOptions, ImportSummary, Importer, NoteOutcome};
pub use render::to_xwiki;
pub use xwiki::{UploadReport, Uploader, XWikiClient, XWikiSettings};
