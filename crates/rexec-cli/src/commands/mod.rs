//! CLI subcommand implementations.

pub mod check;
pub mod exec;
pub mod transfer;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use rexec_client::{ConnectConfig, Connector, KeyCandidate};
use tracing::debug;

use crate::config::{self, Config};

/// Environment variable holding the password sent with every call.
pub const PASSWORD_ENV: &str = "REXEC_PASSWORD";

/// Flags shared by every subcommand, merged over the config file.
pub struct Globals {
    pub config: Config,
    pub config_path: PathBuf,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub key_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub ask_password: bool,
}

impl Globals {
    /// Resolve the final connection settings for `target`.
    pub fn connect_config(&self, target: &str) -> Result<ConnectConfig> {
        let defaults = &self.config.default;
        let (user, host) = config::parse_target(target)?;
        let user = user
            .or_else(|| defaults.user.clone())
            .unwrap_or_else(config::whoami);

        let port = self.port.or(defaults.port).with_context(|| {
            format!(
                "no port given: pass --port or set `port` under [default] in {}",
                self.config_path.display()
            )
        })?;

        let mut cfg = ConnectConfig::new(host, port, user);
        cfg.private_key = self
            .identity_file
            .clone()
            .or_else(|| defaults.private_key.clone())
            .map(KeyCandidate::Path);
        cfg.key_dir = self.key_dir.clone().or_else(|| defaults.key_dir.clone());
        cfg.connect_timeout =
            Duration::from_secs(self.timeout_secs.unwrap_or(defaults.connect_timeout_secs));
        cfg.password = self.password(&cfg)?;
        Ok(cfg)
    }

    /// Password from the environment, else an interactive prompt if asked for.
    fn password(&self, cfg: &ConnectConfig) -> Result<Option<String>> {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            debug!("using password from {PASSWORD_ENV}");
            return Ok(Some(password));
        }
        if !self.ask_password {
            return Ok(None);
        }
        let password = dialoguer::Password::new()
            .with_prompt(format!("{}@{}'s password", cfg.user, cfg.host))
            .allow_empty_password(true)
            .interact()
            .context("failed to read password")?;
        Ok(Some(password))
    }

    /// Fall back to the configured default host when no target is given.
    pub fn target_or_default(&self, target: Option<&str>) -> Result<String> {
        match target {
            Some(target) => Ok(target.to_string()),
            None if !self.config.default.host.is_empty() => Ok(self.config.default.host.clone()),
            None => anyhow::bail!(
                "no target given and no default host in {}",
                self.config_path.display()
            ),
        }
    }
}

/// Connect and authenticate to `target`.
pub async fn connect(globals: &Globals, target: &str) -> Result<Connector> {
    let cfg = globals.connect_config(target)?;
    let label = format!("{}@{}:{}", cfg.user, cfg.host, cfg.port);
    let mut connector = Connector::new(cfg);
    connector
        .establish()
        .await
        .with_context(|| format!("cannot establish session with {label}"))?;
    Ok(connector)
}
