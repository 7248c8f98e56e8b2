//! Import command handler

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use everwiki_core::ledger::{ImportStatus, NewAttempt};
use everwiki_core::{
    Config, ConvertOptions, HttpImageFetcher, ImageFetcher, ImportOptions, ImportSummary, Importer,
    NoteOutcome, SqliteLedger, Uploader, XWikiClient,
};

use super::{count_notes, open_notes};
use crate::output::Output;

/// Flags of `everwiki import`
#[derive(Debug, Clone, Default)]
pub struct ImportArgs {
    pub source: PathBuf,
    pub dry_run: bool,
    pub skip_existing: bool,
    pub force: bool,
    pub space: Option<String>,
    pub wiki_url: Option<String>,
    pub rate_limit_ms: Option<u64>,
    pub no_images: bool,
    pub no_metadata: bool,
}

/// Import notes from an ENEX file, a directory of them, or an API JSON dump
pub fn run(args: ImportArgs, mut config: Config, output: &Output) -> Result<()> {
    if let Some(url) = args.wiki_url {
        config.wiki_url = Some(url);
    }
    if let Some(space) = args.space {
        config.target_space = space;
    }
    if let Some(ms) = args.rate_limit_ms {
        config.rate_limit_ms = ms;
    }

    let total = count_notes(&args.source)
        .with_context(|| format!("Failed to scan {}", args.source.display()))?;
    if total == 0 {
        output.message("No notes found to import.");
        return Ok(());
    }
    output.message(&format!("Found {} note(s) in {}", total, args.source.display()));

    let client = if args.dry_run {
        None
    } else {
        let settings = config.xwiki_settings()?;
        let client = XWikiClient::new(&settings)?;
        output.message(&format!("Connecting to {}...", settings.base_url));
        client
            .test_connection()
            .context("Could not connect to XWiki. Check your URL and credentials.")?;
        Some(client)
    };

    let fetcher = if config.download_external_images && !args.no_images && !args.dry_run {
        Some(HttpImageFetcher::new()?)
    } else {
        None
    };

    let options = ImportOptions {
        dry_run: args.dry_run,
        skip_imported: !args.force,
        skip_existing_pages: args.skip_existing,
        convert: ConvertOptions {
            target_space: &config.target_space,
            include_metadata: !args.no_metadata,
            fetcher: fetcher.as_ref().map(|f| f as &dyn ImageFetcher),
        },
    };

    let mut ledger = SqliteLedger::open(&config.ledger_path())?;
    let source_path = args.source.display().to_string();
    let wiki_url = config.wiki_url.clone().unwrap_or_default();

    // Dry runs leave no trace in the ledger database
    let session_id = if args.dry_run {
        None
    } else {
        Some(ledger.start_session(&source_path, &wiki_url, &config.target_space, total)?)
    };

    let mut importer = match &client {
        Some(client) => Importer::new(&mut ledger, client, options),
        None => Importer::without_uploader(&mut ledger, options),
    };

    let mut summary = ImportSummary::default();
    let mut results = Vec::new();
    let imported = import_all(
        &mut importer,
        &args.source,
        session_id.as_deref(),
        output,
        &mut summary,
        &mut results,
    );
    if let Err(e) = imported {
        if let Some(session_id) = &session_id {
            abandon_session(importer.ledger_mut(), session_id);
        }
        return Err(e);
    }

    if let Some(session_id) = &session_id {
        let status = if summary.failed + summary.partial > 0 {
            ImportStatus::Failed
        } else {
            ImportStatus::Completed
        };
        ledger.finish_session(session_id, status)?;
        info!("Session {} finished: {:?}", session_id, summary);
    }

    if output.is_json() {
        output.print_json(&serde_json::json!({
            "session_id": session_id,
            "dry_run": args.dry_run,
            "summary": summary,
            "notes": results,
        }))?;
    } else {
        output.print_import_summary(&summary, session_id.as_deref())?;
    }
    Ok(())
}

/// Stream every note of `source` through the importer
fn import_all<U: Uploader>(
    importer: &mut Importer<'_, SqliteLedger, U>,
    source: &Path,
    session_id: Option<&str>,
    output: &Output,
    summary: &mut ImportSummary,
    results: &mut Vec<serde_json::Value>,
) -> Result<()> {
    for (file, item) in open_notes(source)? {
        let outcome = importer.import_note(item);
        summary.record(&outcome);
        output.print_outcome(&outcome);

        if let Some(session_id) = session_id {
            let source_file = file.display().to_string();
            record_outcome(importer.ledger_mut(), session_id, &source_file, &outcome)?;
            importer.ledger_mut().update_session_counts(
                session_id,
                summary.imported,
                summary.failed + summary.partial,
                summary.skipped,
            )?;
        }

        if output.is_json() {
            results.push(outcome_json(&file, &outcome));
        }
    }
    Ok(())
}

/// Mark a session failed after the run stopped early
fn abandon_session(ledger: &mut SqliteLedger, session_id: &str) {
    if let Err(e) = ledger.finish_session(session_id, ImportStatus::Failed) {
        warn!("Could not close session {}: {}", session_id, e);
    }
}

/// Write one attempt record for an outcome
fn record_outcome(
    ledger: &mut SqliteLedger,
    session_id: &str,
    source_file: &str,
    outcome: &NoteOutcome,
) -> Result<()> {
    let (title, source_id) = outcome
        .note()
        .map(|n| (n.title.as_str(), n.source_id.as_str()))
        .unwrap_or(("", ""));

    let error;
    let mut attempt = NewAttempt {
        session_id,
        source_file,
        note_title: title,
        source_id,
        status: ImportStatus::Failed,
        page_url: None,
        error_message: None,
        attachments_count: 0,
        attachments_uploaded: 0,
    };

    match outcome {
        NoteOutcome::Imported { report, .. } => {
            attempt.status = ImportStatus::Completed;
            attempt.page_url = Some(report.page_url.as_str());
            attempt.attachments_count = report.attachments_uploaded;
            attempt.attachments_uploaded = report.attachments_uploaded;
        }
        NoteOutcome::Partial { report, .. } => {
            let failed: Vec<String> = report
                .attachments_failed
                .iter()
                .map(|f| format!("{} ({})", f.filename, f.reason))
                .chain(report.tags_error.iter().map(|e| format!("tags ({})", e)))
                .collect();
            error = format!("Incomplete upload: {}", failed.join(", "));
            attempt.page_url = Some(report.page_url.as_str());
            attempt.error_message = Some(error.as_str());
            attempt.attachments_count =
                report.attachments_uploaded + report.attachments_failed.len();
            attempt.attachments_uploaded = report.attachments_uploaded;
        }
        NoteOutcome::Skipped { .. } => attempt.status = ImportStatus::Skipped,
        NoteOutcome::Converted { .. } => return Ok(()),
        NoteOutcome::Failed { error: e, .. } => {
            error = e.to_string();
            attempt.error_message = Some(error.as_str());
        }
    }

    ledger.record_attempt(&attempt)?;
    Ok(())
}

fn outcome_json(file: &Path, outcome: &NoteOutcome) -> serde_json::Value {
    let mut value = serde_json::json!({
        "file": file,
        "status": outcome.label(),
        "note": outcome.note(),
    });
    match outcome {
        NoteOutcome::Imported { report, warnings, .. }
        | NoteOutcome::Partial { report, warnings, .. } => {
            value["report"] = serde_json::json!(report);
            value["warnings"] = serde_json::json!(warnings);
        }
        NoteOutcome::Skipped { reason, .. } => value["reason"] = serde_json::json!(reason),
        NoteOutcome::Converted {
            reference,
            attachments,
            warnings,
            ..
        } => {
            value["reference"] = serde_json::json!(reference);
            value["attachments"] = serde_json::json!(attachments);
            value["warnings"] = serde_json::json!(warnings);
        }
        NoteOutcome::Failed { error, .. } => value["error"] = serde_json::json!(error.to_string()),
    }
    value
}
