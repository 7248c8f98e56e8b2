//! Status command handler

use anyhow::Result;

use everwiki_core::{Config, SqliteLedger};

use crate::output::{Output, OutputFormat};

/// Show ledger statistics and the most recent session
pub fn show(config: &Config, output: &Output) -> Result<()> {
    let ledger_path = config.ledger_path();
    let ledger = SqliteLedger::open(&ledger_path)?;
    let stats = ledger.stats()?;
    let last = ledger.recent_sessions(1)?.into_iter().next();

    match output.format {
        OutputFormat::Json => {
            output.print_json(&serde_json::json!({
                "wiki_url": config.wiki_url,
                "target_space": config.target_space,
                "ledger_path": ledger_path,
                "stats": stats,
                "last_session": last,
            }))?;
        }
        OutputFormat::Quiet => {
            println!("{}", stats.imported_notes);
        }
        OutputFormat::Human => {
            println!("everwiki Status");
            println!("===============");
            println!();
            println!("Wiki:");
            println!(
                "  URL:          {}",
                config.wiki_url.as_deref().unwrap_or("(not set)")
            );
            println!("  Target space: {}", config.target_space);
            println!();
            println!("Ledger:");
            println!("  Location:       {}", ledger_path.display());
            println!("  Imported notes: {}", stats.imported_notes);
            println!();
            println!("History:");
            println!("  Sessions:  {}", stats.sessions);
            println!("  Attempts:  {}", stats.attempts);
            println!("    Completed: {}", stats.completed);
            println!("    Failed:    {}", stats.failed);
            println!("    Skipped:   {}", stats.skipped);
            if let Some(session) = last {
                println!();
                println!(
                    "Last session: {} ({}, {})",
                    session.id,
                    session.status,
                    session.started_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }

    Ok(())
}
