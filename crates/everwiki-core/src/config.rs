//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/everwiki/config.toml)
//! 3. Environment variables (EVERWIKI_* prefix, plus XWIKI_USERNAME and
//!    XWIKI_PASSWORD for credentials)
//!
//! Environment variables take precedence over config file values.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::convert::DEFAULT_TARGET_SPACE;
use crate::xwiki::XWikiSettings;

/// Environment variable prefix
const ENV_PREFIX: &str = "EVERWIKI";

/// Keys accepted by [`Config::set`]
pub const CONFIG_KEYS: &[&str] = &[
    "data_dir",
    "wiki_url",
    "wiki_name",
    "username",
    "password",
    "target_space",
    "rate_limit_ms",
    "timeout_secs",
    "download_external_images",
    "log_file",
];

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for the import ledger
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// XWiki root URL, e.g. https://yourwiki.xwiki.cloud
    #[serde(default)]
    pub wiki_url: Option<String>,

    /// Wiki name in REST paths
    #[serde(default = "default_wiki_name")]
    pub wiki_name: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Root space for imported pages
    #[serde(default = "default_target_space")]
    pub target_space: String,

    /// Delay before each write request, in milliseconds
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    /// HTTP request timeout, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Download `http(s)` images referenced from notes and attach them
    #[serde(default = "default_true")]
    pub download_external_images: bool,

    /// Write logs here instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            wiki_url: None,
            wiki_name: default_wiki_name(),
            username: None,
            password: None,
            target_space: default_target_space(),
            rate_limit_ms: default_rate_limit_ms(),
            timeout_secs: default_timeout_secs(),
            download_external_images: true,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (EVERWIKI_WIKI_URL, XWIKI_USERNAME, ...)
    /// 2. Config file (~/.config/everwiki/config.toml or EVERWIKI_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(config_path: Option<&PathBuf>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Read only the config file, without environment overrides
    ///
    /// Used when the file is rewritten, so that values coming from the
    /// environment (credentials in particular) are not persisted.
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        let var = |name: &str| std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok();

        if let Some(val) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
        if let Some(val) = var("WIKI_URL") {
            self.wiki_url = non_empty(val);
        }
        if let Some(val) = var("WIKI_NAME") {
            self.wiki_name = val;
        }
        if let Some(val) = var("TARGET_SPACE") {
            self.target_space = val;
        }
        if let Some(val) = var("RATE_LIMIT_MS") {
            self.rate_limit_ms = val
                .parse()
                .with_context(|| format!("Invalid {}_RATE_LIMIT_MS: '{}'", ENV_PREFIX, val))?;
        }
        if let Some(val) = var("TIMEOUT_SECS") {
            self.timeout_secs = val
                .parse()
                .with_context(|| format!("Invalid {}_TIMEOUT_SECS: '{}'", ENV_PREFIX, val))?;
        }
        if let Some(val) = var("DOWNLOAD_IMAGES") {
            self.download_external_images = parse_bool(&val);
        }
        if let Some(val) = var("LOG_FILE") {
            self.log_file = non_empty(val).map(PathBuf::from);
        }

        // Credentials use the names the wiki's own tooling documents
        if let Ok(val) = std::env::var("XWIKI_USERNAME") {
            self.username = non_empty(val);
        }
        if let Ok(val) = std::env::var("XWIKI_PASSWORD") {
            self.password = non_empty(val);
        }
        Ok(())
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Set a value by key, as `everwiki config set` does.
    ///
    /// Empty strings and `none` clear optional values.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "wiki_url" => self.wiki_url = optional(value),
            "wiki_name" => self.wiki_name = value.to_string(),
            "username" => self.username = optional(value),
            "password" => self.password = optional(value),
            "target_space" => self.target_space = value.to_string(),
            "rate_limit_ms" => {
                self.rate_limit_ms = value
                    .parse()
                    .context("Invalid value for rate_limit_ms. Use milliseconds, e.g. 500.")?
            }
            "timeout_secs" => {
                self.timeout_secs = value
                    .parse()
                    .context("Invalid value for timeout_secs. Use seconds, e.g. 30.")?
            }
            "download_external_images" => {
                self.download_external_images = value
                    .parse()
                    .context("Invalid value for download_external_images. Use 'true' or 'false'.")?
            }
            "log_file" => self.log_file = optional(value).map(PathBuf::from),
            _ => bail!(
                "Unknown configuration key: '{}'\nValid keys: {}",
                key,
                CONFIG_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with EVERWIKI_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("everwiki")
            .join("config.toml")
    }

    /// Get the path to the import ledger database
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("imports.db")
    }

    /// Connection settings for the XWiki client
    ///
    /// Fails when the wiki URL or credentials are missing.
    pub fn xwiki_settings(&self) -> Result<XWikiSettings> {
        let Some(base_url) = self.wiki_url.clone() else {
            bail!("No wiki URL configured. Set EVERWIKI_WIKI_URL or run `everwiki config set wiki_url <url>`.");
        };
        let (Some(username), Some(password)) = (self.username.clone(), self.password.clone())
        else {
            bail!("XWiki credentials missing. Set XWIKI_USERNAME and XWIKI_PASSWORD.");
        };

        Ok(XWikiSettings {
            base_url,
            wiki_name: self.wiki_name.clone(),
            username,
            password,
            rate_limit: Duration::from_millis(self.rate_limit_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("everwiki")
}

fn default_wiki_name() -> String {
    "xwiki".to_string()
}

fn default_target_space() -> String {
    DEFAULT_TARGET_SPACE.to_string()
}

fn default_rate_limit_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}
