//! History command handlers

use anyhow::{anyhow, Result};

use everwiki_core::ledger::ImportStatus;
use everwiki_core::{Config, SqliteLedger};

use crate::output::Output;

/// List recent import sessions
pub fn list(config: &Config, limit: usize, output: &Output) -> Result<()> {
    let ledger = SqliteLedger::open(&config.ledger_path())?;
    let sessions = ledger.recent_sessions(limit)?;
    output.print_sessions(&sessions)
}

/// Show one session; `failed_only` limits the note list to failures
pub fn show(config: &Config, session_id: &str, failed_only: bool, output: &Output) -> Result<()> {
    let ledger = SqliteLedger::open(&config.ledger_path())?;
    let session_id = resolve_session_id(&ledger, session_id)?;

    let session = ledger
        .get_session(&session_id)?
        .ok_or_else(|| anyhow!("Session not found: {}", session_id))?;
    let files = ledger.session_file_summary(&session_id)?;
    let filter = failed_only.then_some(ImportStatus::Failed);
    let records = ledger.session_records(&session_id, filter)?;

    output.print_session_detail(&session, &files, &records)
}

/// Accept a full session id or a unique prefix of one
pub fn resolve_session_id(ledger: &SqliteLedger, id: &str) -> Result<String> {
    if ledger.get_session(id)?.is_some() {
        return Ok(id.to_string());
    }

    let matches: Vec<String> = ledger
        .recent_sessions(usize::MAX)?
        .into_iter()
        .map(|s| s.id)
        .filter(|s| s.starts_with(id))
        .collect();

    match matches.as_slice() {
        [only] => Ok(only.clone()),
        [] => Err(anyhow!("Session not found: {}", id)),
        _ => Err(anyhow!(
            "Ambiguous session prefix '{}' matches {} sessions",
            id,
            matches.len()
        )),
    }
}
