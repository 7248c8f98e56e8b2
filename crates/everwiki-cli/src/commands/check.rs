//! Check command handler

use anyhow::{Context, Result};

use everwiki_core::{Config, XWikiClient};

use crate::output::Output;

/// Verify that the configured wiki answers with these credentials
pub fn run(config: &Config, output: &Output) -> Result<()> {
    let settings = config.xwiki_settings()?;
    let client = XWikiClient::new(&settings)?;

    output.message(&format!("Connecting to {}...", client.rest_url()));
    if let Err(e) = client.test_connection() {
        if let Some(hint) = e.recovery_suggestion() {
            eprintln!("Hint: {}", hint);
        }
        return Err(e).context("XWiki connection check failed");
    }

    output.success(&format!(
        "Connected to wiki '{}' as {}",
        settings.wiki_name, settings.username
    ));
    Ok(())
}
