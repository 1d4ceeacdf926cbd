//! `rexec exec <target> <command...>`: one-off remote command execution.
//!
//! Connects to the remote host, runs the command through the remote shell,
//! copies its output to the local terminal, and exits with the remote
//! exit code.

use std::io::Write as _;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use super::Globals;

/// Machine-readable result for `--json`.
#[derive(Debug, Serialize)]
struct ExecReport<'a> {
    exit_code: i32,
    stdout: &'a str,
    stderr: &'a str,
}

/// Execute a remote command and print its output. Returns the exit code.
pub async fn run(globals: &Globals, target: &str, command: &[String], json: bool) -> Result<i32> {
    let command = command.join(" ");
    info!(target = %target, command = %command, "exec");

    let mut connector = super::connect(globals, target).await?;
    let output = connector
        .exec(&command)
        .await
        .with_context(|| format!("failed to run '{command}'"))?;
    connector.close().await;

    if json {
        let stdout = output.stdout_lossy();
        let stderr = output.stderr_lossy();
        let report = ExecReport {
            exit_code: output.exit_code,
            stdout: &stdout,
            stderr: &stderr,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        std::io::stdout().write_all(&output.stdout)?;
        std::io::stderr().write_all(&output.stderr)?;
        std::io::stdout().flush()?;
    }

    Ok(output.exit_code)
}
