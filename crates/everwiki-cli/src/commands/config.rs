//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use everwiki_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config: &Config, config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let password = config.password.as_ref().map(|_| "********");

    match output.format {
        OutputFormat::Json => {
            output.print_json(&serde_json::json!({
                "data_dir": config.data_dir,
                "wiki_url": config.wiki_url,
                "wiki_name": config.wiki_name,
                "username": config.username,
                "password": password,
                "target_space": config.target_space,
                "rate_limit_ms": config.rate_limit_ms,
                "timeout_secs": config.timeout_secs,
                "download_external_images": config.download_external_images,
                "log_file": config.log_file
            }))?;
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            let unset = "(not set)";
            println!("Configuration:");
            println!("  data_dir:                 {}", config.data_dir.display());
            println!(
                "  wiki_url:                 {}",
                config.wiki_url.as_deref().unwrap_or(unset)
            );
            println!("  wiki_name:                {}", config.wiki_name);
            println!(
                "  username:                 {}",
                config.username.as_deref().unwrap_or(unset)
            );
            println!("  password:                 {}", password.unwrap_or(unset));
            println!("  target_space:             {}", config.target_space);
            println!("  rate_limit_ms:            {}", config.rate_limit_ms);
            println!("  timeout_secs:             {}", config.timeout_secs);
            println!(
                "  download_external_images: {}",
                config.download_external_images
            );
            println!(
                "  log_file:                 {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| unset.to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
            println!("Ledger:      {}", config.ledger_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value
///
/// Only the file's own values are rewritten; environment overrides are not
/// saved.
pub fn set(key: String, value: String, config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);

    let mut config = Config::from_file(&save_path).context("Failed to load configuration")?;
    config.set(&key, &value)?;
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "password" { "********" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let output = Output::new(OutputFormat::Quiet);

        set("target_space".into(), "Archive".into(), Some(&path), &output).unwrap();
        set("rate_limit_ms".into(), "0".into(), Some(&path), &output).unwrap();
        assert!(set("bogus".into(), "1".into(), Some(&path), &output).is_err());

        let saved = Config::from_file(&path).unwrap();
        assert_eq!(saved.target_space, "Archive");
        assert_eq!(saved.rate_limit_ms, 0);
    }
}
