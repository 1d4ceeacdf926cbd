//! Client configuration at `~/.rexec/config.toml`.
//!
//! Provides default host, port, user and key settings.
//! CLI flags always override config file values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Default connection settings.
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultConfig {
    /// Default remote host (empty = none).
    #[serde(default)]
    pub host: String,

    /// Server port. There is no built-in default.
    #[serde(default)]
    pub port: Option<u16>,

    /// Remote user when the target does not name one.
    #[serde(default)]
    pub user: Option<String>,

    /// Private key to use instead of scanning `~/.ssh`.
    #[serde(default)]
    pub private_key: Option<PathBuf>,

    /// Directory to scan instead of `~/.ssh`.
    #[serde(default)]
    pub key_dir: Option<PathBuf>,

    /// Dial timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            user: None,
            private_key: None,
            key_dir: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

impl Config {
    /// Default location: `~/.rexec/config.toml`.
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_default();
        home.join(".rexec").join("config.toml")
    }

    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

/// Parse a `[user@]host` string into `(user, host)`.
///
/// The user is `None` when the target does not name one.
pub fn parse_target(target: &str) -> Result<(Option<String>, String)> {
    if let Some(at_pos) = target.find('@') {
        let user = &target[..at_pos];
        let host = &target[at_pos + 1..];
        if user.is_empty() {
            anyhow::bail!("empty username in target '{target}'");
        }
        if host.is_empty() {
            anyhow::bail!("empty host in target '{target}'");
        }
        Ok((Some(user.to_string()), host.to_string()))
    } else {
        if target.is_empty() {
            anyhow::bail!("empty host");
        }
        Ok((None, target.to_string()))
    }
}

/// The local login name, used when neither target nor config names a user.
pub fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".into())
}
