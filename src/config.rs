use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::bitbucket::{Credentials, DEFAULT_API_URL};
use crate::discovery::CloneProtocol;
use crate::error::SetupError;

/// Environment variable consulted when the config file carries no password
pub const PASSWORD_ENV: &str = "BITBUCKET_APP_PASSWORD";

/// Main configuration structure for bbmirror
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Bitbucket account and workspace (required unless running interactively)
    #[serde(default)]
    pub bitbucket: Option<BitbucketConfig>,

    /// Local mirror settings
    #[serde(default)]
    pub git: GitConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bitbucket account settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BitbucketConfig {
    /// Login name used for basic authentication
    pub user: String,

    /// App password; falls back to `$BITBUCKET_APP_PASSWORD` when absent
    #[serde(default)]
    pub password: Option<String>,

    /// Workspace slug to mirror
    pub workspace: String,

    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

/// Local mirror settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitConfig {
    /// Root directory repositories are mirrored under
    #[serde(default = "default_destination_path")]
    pub destination_path: String,

    /// Clone protocol
    #[serde(default)]
    pub protocol: CloneProtocol,

    /// Refuse non fast-forward pulls
    #[serde(default)]
    pub fast_forward_only: bool,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
fn default_destination_path() -> String {
    "${HOME}/bitbucket".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            destination_path: default_destination_path(),
            protocol: CloneProtocol::default(),
            fast_forward_only: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            color: default_true(),
        }
    }
}

impl BitbucketConfig {
    /// Credentials from this section, taking the password from the
    /// environment when the file has none
    pub fn credentials(&self) -> Result<Credentials, SetupError> {
        let password = match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => password.to_string(),
            None => std::env::var(PASSWORD_ENV)
                .ok()
                .filter(|p| !p.is_empty())
                .ok_or(SetupError::MissingPassword)?,
        };

        Ok(Credentials::new(self.user.clone(), password))
    }
}

impl Config {
    /// Load configuration from `path`, or fall back to defaults when the
    /// file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", path);
            let mut config = Self::default();
            config.expand_paths()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("bbmirror").join("config.yml"))
    }

    /// Expand environment variables and `~` in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.git.destination_path = shellexpand::full(&self.git.destination_path)
            .context("Failed to expand destination_path")?
            .into_owned();

        Ok(())
    }

    /// The `bitbucket` section, required outside interactive mode
    pub fn bitbucket_section(&self) -> Result<&BitbucketConfig, SetupError> {
        self.bitbucket
            .as_ref()
            .ok_or(SetupError::MissingSection("bitbucket"))
    }

    /// API base URL, from the `bitbucket` section when present
    pub fn api_url(&self) -> &str {
        self.bitbucket
            .as_ref()
            .map(|b| b.api_url.as_str())
            .unwrap_or(DEFAULT_API_URL)
    }
}
