//! Reset command handler

use anyhow::{bail, Result};

use everwiki_core::{Config, SqliteLedger};

use super::confirm;
use super::history::resolve_session_id;
use crate::output::Output;

/// Forget imported notes, or delete one session's history
///
/// Clearing the ledger makes the next import upload every note again.
pub fn run(config: &Config, session: Option<String>, yes: bool, output: &Output) -> Result<()> {
    let mut ledger = SqliteLedger::open(&config.ledger_path())?;

    if let Some(id) = session {
        let id = resolve_session_id(&ledger, &id)?;
        if !yes && !confirm_or_refuse(&format!("Delete session {} and its records?", id), output)? {
            return Ok(());
        }
        if !ledger.delete_session(&id)? {
            bail!("Session not found: {}", id);
        }
        output.success(&format!("Deleted session {}", id));
        return Ok(());
    }

    let count = ledger.imported_count()?;
    if count == 0 {
        output.message("Ledger is already empty.");
        return Ok(());
    }
    if !yes
        && !confirm_or_refuse(
            &format!("Forget {} imported note(s)? They will be uploaded again.", count),
            output,
        )?
    {
        return Ok(());
    }

    let removed = ledger.clear_imported()?;
    output.success(&format!("Forgot {} imported note(s)", removed));
    Ok(())
}

fn confirm_or_refuse(prompt: &str, output: &Output) -> Result<bool> {
    if !output.should_prompt() {
        bail!("Refusing to reset without confirmation; pass --yes");
    }
    if confirm(prompt)? {
        Ok(true)
    } else {
        println!("Cancelled.");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use chrono::Utc;
    use everwiki_core::Ledger;

    #[test]
    fn test_reset_with_yes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let output = Output::new(OutputFormat::Quiet);

        {
            let mut ledger = SqliteLedger::open(&config.ledger_path()).unwrap();
            ledger.record_imported("a", Utc::now()).unwrap();
            ledger.record_imported("b", Utc::now()).unwrap();
        }

        run(&config, None, true, &output).unwrap();
        let ledger = SqliteLedger::open(&config.ledger_path()).unwrap();
        assert_eq!(ledger.imported_count().unwrap(), 0);
    }

    #[test]
    fn test_reset_without_confirmation_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        {
            let mut ledger = SqliteLedger::open(&config.ledger_path()).unwrap();
            ledger.record_imported("a", Utc::now()).unwrap();
        }

        let err = run(&config, None, false, &Output::new(OutputFormat::Json)).unwrap_err();
        assert!(err.to_string().contains("--yes"));
    }

    #[test]
    fn test_reset_one_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let id = {
            let mut ledger = SqliteLedger::open(&config.ledger_path()).unwrap();
            ledger.start_session("a.enex", "", "Notes", 1).unwrap()
        };

        run(&config, Some(id.clone()), true, &Output::new(OutputFormat::Quiet)).unwrap();
        let ledger = SqliteLedger::open(&config.ledger_path()).unwrap();
        assert!(ledger.get_session(&id).unwrap().is_none());
    }
}
