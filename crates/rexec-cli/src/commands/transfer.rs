//! `rexec put` / `rexec fetch`: file transfer using `[user@]host:path` syntax.
//!
//! Shows a terminal progress bar during transfer.

use anyhow::{Context, Result};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::info;

use super::Globals;

/// A parsed transfer endpoint, either local or remote.
#[derive(Debug, PartialEq, Eq)]
enum Endpoint {
    Local(PathBuf),
    Remote { target: String, path: String },
}

/// Upload `local` to a `[user@]host:path` destination.
pub async fn put(globals: &Globals, local: &Path, remote: &str) -> Result<()> {
    let Endpoint::Remote { target, path } = parse_endpoint(remote)? else {
        anyhow::bail!("destination '{remote}' is local; expected [user@]host:path");
    };
    if let Endpoint::Remote { .. } = parse_endpoint(&local.to_string_lossy())? {
        anyhow::bail!("remote-to-remote transfer is not supported");
    }
    info!(local = %local.display(), remote = %format!("{target}:{path}"), "upload");

    let mut connector = super::connect(globals, &target).await?;
    let sent = connector
        .upload_with_progress(local, &path, print_progress)
        .await
        .with_context(|| format!("failed to upload {}", local.display()))?;
    connector.close().await;

    eprintln!("{} -> {target}:{path} ({})", local.display(), format_size(sent));
    Ok(())
}

/// Download a `[user@]host:path` source to `local`.
pub async fn fetch(globals: &Globals, remote: &str, local: &Path) -> Result<()> {
    let Endpoint::Remote { target, path } = parse_endpoint(remote)? else {
        anyhow::bail!("source '{remote}' is local; expected [user@]host:path");
    };
    info!(remote = %format!("{target}:{path}"), local = %local.display(), "download");

    let mut connector = super::connect(globals, &target).await?;
    let received = connector
        .download_with_progress(&path, local, print_progress)
        .await
        .with_context(|| format!("failed to download {path}"))?;
    connector.close().await;

    eprintln!("{target}:{path} -> {} ({})", local.display(), format_size(received));
    Ok(())
}

/// Parse a transfer endpoint string. Remote endpoints use `[user@]host:path` syntax.
fn parse_endpoint(s: &str) -> Result<Endpoint> {
    // The part before the colon must look like a host (no path separators),
    // which also leaves Windows drive letters such as C:\path local.
    if let Some(colon_pos) = s.find(':') {
        let before = &s[..colon_pos];
        if !before.contains('/') && !before.contains('\\') && before.len() > 1 {
            let path = &s[colon_pos + 1..];
            if path.is_empty() {
                anyhow::bail!("remote path cannot be empty in '{s}'");
            }
            return Ok(Endpoint::Remote {
                target: before.to_string(),
                path: path.to_string(),
            });
        }
    }

    Ok(Endpoint::Local(PathBuf::from(s)))
}

/// Print a progress bar to stderr.
fn print_progress(transferred: u64, total: u64) {
    if total == 0 {
        return;
    }
    let pct = (transferred as f64 / total as f64 * 100.0).min(100.0);
    let bar_width = 40;
    let filled = (pct / 100.0 * bar_width as f64) as usize;
    let empty = bar_width - filled;

    eprint!(
        "\r  [{}{}] {:5.1}% {}/{}",
        "=".repeat(filled),
        " ".repeat(empty),
        pct,
        format_size(transferred),
        format_size(total),
    );

    if transferred >= total {
        eprintln!();
    }
    let _ = io::stderr().flush();
}

/// Format a byte count as a human-readable string.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
