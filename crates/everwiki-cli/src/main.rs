//! everwiki CLI
//!
//! Command-line interface for everwiki - Evernote to XWiki migration.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use everwiki_core::Config;

mod commands;
mod output;

use commands::import::ImportArgs;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "everwiki")]
#[command(about = "everwiki - Move Evernote notes into XWiki")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug logging (overridden by EVERWIKI_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import notes into XWiki
    Import {
        /// .enex file, directory of .enex files, or .json API dump
        source: PathBuf,
        /// Convert without uploading or recording anything
        #[arg(long)]
        dry_run: bool,
        /// Skip notes whose page already exists in the wiki
        #[arg(long)]
        skip_existing: bool,
        /// Import notes even if the ledger lists them
        #[arg(long)]
        force: bool,
        /// Target space (default from config: ImportedNotes)
        #[arg(long)]
        space: Option<String>,
        /// XWiki URL (default from config)
        #[arg(long)]
        wiki_url: Option<String>,
        /// Delay before each write request, in milliseconds
        #[arg(long, value_name = "MS")]
        rate_limit: Option<u64>,
        /// Keep external images as links instead of downloading them
        #[arg(long)]
        no_images: bool,
        /// Leave out the "Originally created" footer
        #[arg(long)]
        no_metadata: bool,
    },
    /// Convert notes to XWiki markup files without uploading
    Convert {
        /// .enex file, directory of .enex files, or .json API dump
        source: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = "converted")]
        output: PathBuf,
        /// Target space written into each file header
        #[arg(long)]
        space: Option<String>,
        /// Also write the document tree of each note as JSON
        #[arg(long)]
        document: bool,
    },
    /// List the notes in an ENEX file or directory
    Scan {
        source: PathBuf,
        /// Show each note's title and creation date
        #[arg(long)]
        notes: bool,
    },
    /// Show ledger statistics
    Status,
    /// Show import sessions
    History {
        /// Session ID (full or prefix) to show in detail
        #[arg(short, long)]
        session: Option<String>,
        /// Only list failed notes of the session
        #[arg(long, requires = "session")]
        failed: bool,
        /// Number of sessions to list
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// Check the connection to XWiki
    Check,
    /// Forget imported notes so they are uploaded again
    Reset {
        /// Delete only this session's history
        #[arg(long)]
        session: Option<String>,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (wiki_url, target_space, rate_limit_ms, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Writing the config file must not pick up environment overrides
    if let Commands::Config {
        command: Some(ConfigCommands::Set { key, value }),
    } = cli.command
    {
        return commands::config::set(key, value, config_path, &output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);
    debug!("Loaded configuration from {:?}", config_path);

    match cli.command {
        Commands::Import {
            source,
            dry_run,
            skip_existing,
            force,
            space,
            wiki_url,
            rate_limit,
            no_images,
            no_metadata,
        } => commands::import::run(
            ImportArgs {
                source,
                dry_run,
                skip_existing,
                force,
                space,
                wiki_url,
                rate_limit_ms: rate_limit,
                no_images,
                no_metadata,
            },
            config,
            &output,
        ),
        Commands::Convert {
            source,
            output: output_dir,
            space,
            document,
        } => {
            let space = space.unwrap_or_else(|| config.target_space.clone());
            commands::convert::run(&source, &output_dir, &space, document, &output)
        }
        Commands::Scan { source, notes } => commands::scan::run(&source, notes, &output),
        Commands::Status => commands::status::show(&config, &output),
        Commands::History {
            session,
            failed,
            limit,
        } => match session {
            Some(id) => commands::history::show(&config, &id, failed, &output),
            None => commands::history::list(&config, limit, &output),
        },
        Commands::Check => commands::check::run(&config, &output),
        Commands::Reset { session, yes } => commands::reset::run(&config, session, yes, &output),
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => commands::config::show(&config, config_path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, config_path, &output)
            }
        },
    }
}

/// Initialize logging
///
/// The level comes from EVERWIKI_LOG, or `debug` with --verbose, otherwise
/// `warn`. Logs go to config.log_file when set, else to stderr.
fn init_logging(config: &Config, verbose: bool) {
    let level = std::env::var("EVERWIKI_LOG")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| if verbose { "debug" } else { "warn" }.to_string());

    // Full directives (e.g. "everwiki_core=trace") are used as given
    let env_filter = if level.contains('=') {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(format!("everwiki_core={0},everwiki_cli={0}", level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Ignore error if already initialized
    match &config.log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let _ = builder.with_ansi(false).with_writer(file).try_init();
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file {:?}: {}", path, e);
                let _ = builder.with_writer(std::io::stderr).try_init();
            }
        },
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}
