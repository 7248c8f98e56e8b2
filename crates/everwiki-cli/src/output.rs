//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use anyhow::Result;
use serde::Serialize;

use everwiki_core::ledger::{AttemptRecord, FileSummary, ImportSession};
use everwiki_core::pipeline::SkipReason;
use everwiki_core::{ImportSummary, NoteOutcome};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print any serialisable value as pretty JSON
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print one line per processed note (human mode only)
    pub fn print_outcome(&self, outcome: &NoteOutcome) {
        if self.format != OutputFormat::Human {
            return;
        }
        match outcome {
            NoteOutcome::Imported { note, report, .. } => {
                println!("✓ {} → {}", truncate(&note.title, 50), report.reference);
            }
            NoteOutcome::Partial { note, report, .. } => {
                println!(
                    "◐ {} → {} ({} attachment(s) failed{})",
                    truncate(&note.title, 50),
                    report.reference,
                    report.attachments_failed.len(),
                    if report.tags_error.is_some() {
                        ", tags failed"
                    } else {
                        ""
                    }
                );
            }
            NoteOutcome::Skipped { note, reason } => {
                println!("- {} ({})", truncate(&note.title, 50), skip_label(*reason));
            }
            NoteOutcome::Converted {
                note,
                reference,
                attachments,
                warnings,
            } => {
                println!(
                    "[dry run] {} → {} ({} attachment(s))",
                    truncate(&note.title, 50),
                    reference,
                    attachments
                );
                for warning in warnings {
                    println!("    ⚠ {}", warning);
                }
            }
            NoteOutcome::Failed { note, error } => {
                let title = note.as_ref().map(|n| n.title.as_str()).unwrap_or("(unreadable note)");
                println!("✗ {}: {}", truncate(title, 50), error);
            }
        }
    }

    /// Print the totals of an import run
    pub fn print_import_summary(&self, summary: &ImportSummary, session_id: Option<&str>) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!();
                println!("{}", "=".repeat(50));
                println!("Import complete!");
                println!("  Imported:  {}", summary.imported);
                if summary.partial > 0 {
                    println!("  Partial:   {}", summary.partial);
                }
                println!("  Failed:    {}", summary.failed);
                println!("  Skipped:   {}", summary.skipped);
                if summary.converted > 0 {
                    println!("  Converted: {} (dry run, nothing uploaded)", summary.converted);
                }
                if let Some(id) = session_id {
                    if summary.failed + summary.partial > 0 {
                        println!();
                        println!("Details: everwiki history --session {}", id);
                    }
                }
            }
            OutputFormat::Json => {
                self.print_json(&serde_json::json!({
                    "session_id": session_id,
                    "summary": summary,
                }))?;
            }
            OutputFormat::Quiet => {
                if let Some(id) = session_id {
                    println!("{}", id);
                }
            }
        }
        Ok(())
    }

    /// Print a list of import sessions
    pub fn print_sessions(&self, sessions: &[ImportSession]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if sessions.is_empty() {
                    println!("No import sessions found.");
                    return Ok(());
                }
                for session in sessions {
                    println!(
                        "{} | {} | {:<11} | {}/{} ok, {} failed, {} skipped | {}",
                        &session.id[..8.min(session.id.len())],
                        session.started_at.format("%Y-%m-%d %H:%M"),
                        session.status,
                        session.completed_notes,
                        session.total_notes,
                        session.failed_notes,
                        session.skipped_notes,
                        truncate(&session.source_path, 40)
                    );
                }
                println!("\n{} session(s)", sessions.len());
            }
            OutputFormat::Json => self.print_json(sessions)?,
            OutputFormat::Quiet => {
                for session in sessions {
                    println!("{}", session.id);
                }
            }
        }
        Ok(())
    }

    /// Print a session with its per-file summary and note records
    pub fn print_session_detail(
        &self,
        session: &ImportSession,
        files: &[FileSummary],
        records: &[AttemptRecord],
    ) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!("Session:      {}", session.id);
                println!("Source:       {}", session.source_path);
                println!("Wiki:         {}", session.wiki_url);
                println!("Target space: {}", session.target_space);
                println!("Status:       {}", session.status);
                println!("Started:      {}", session.started_at.format("%Y-%m-%d %H:%M:%S"));
                if let Some(finished) = session.finished_at {
                    println!("Finished:     {}", finished.format("%Y-%m-%d %H:%M:%S"));
                }
                println!(
                    "Notes:        {} total, {} completed, {} failed, {} skipped",
                    session.total_notes,
                    session.completed_notes,
                    session.failed_notes,
                    session.skipped_notes
                );

                if !files.is_empty() {
                    println!();
                    println!("── Files ──");
                    for file in files {
                        println!(
                            "{}: {} completed, {} failed, {} skipped",
                            file.source_file, file.completed, file.failed, file.skipped
                        );
                    }
                }

                if !records.is_empty() {
                    println!();
                    println!("── Notes ({}) ──", records.len());
                    for record in records {
                        let detail = record
                            .error_message
                            .as_deref()
                            .or(record.page_url.as_deref())
                            .unwrap_or("");
                        println!(
                            "[{}] {} {}",
                            record.status,
                            truncate(&record.note_title, 50),
                            truncate_line(detail, 80)
                        );
                    }
                }
            }
            OutputFormat::Json => {
                self.print_json(&serde_json::json!({
                    "session": session,
                    "files": files,
                    "records": records,
                }))?;
            }
            OutputFormat::Quiet => {
                println!("{}", session.status);
            }
        }
        Ok(())
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::AlreadyImported => "already imported",
        SkipReason::PageExists => "page exists",
    }
}

/// Truncate a string to max characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        // Counts characters, not bytes
        assert_eq!(truncate("Über größe Notiz", 8), "Über ...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
        assert_eq!(
            truncate_line("very long single line here", 10),
            "very lo..."
        );
    }
}
