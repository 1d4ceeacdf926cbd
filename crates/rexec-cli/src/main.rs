//! rexec: remote execution client CLI.
//!
//! Authenticates with the local user's SSH keys, then runs one command or
//! moves one file on the remote host over gRPC.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

use commands::Globals;

/// rexec: remote execution client
#[derive(Parser)]
#[command(name = "rexec", version, about = "Run commands and move files on remote hosts over gRPC")]
struct Cli {
    /// Server port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Private key to use instead of scanning ~/.ssh
    #[arg(short = 'i', long = "identity-file", global = true)]
    identity_file: Option<PathBuf>,

    /// Directory to scan for id_* keys instead of ~/.ssh
    #[arg(long = "key-dir", global = true)]
    key_dir: Option<PathBuf>,

    /// Dial timeout in seconds
    #[arg(long = "timeout", global = true)]
    timeout: Option<u64>,

    /// Prompt for a password to send along with the key proof
    #[arg(long = "ask-password", global = true)]
    ask_password: bool,

    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that one of the local keys is accepted
    Check {
        /// Target in [user@]host format (defaults to the configured host)
        target: Option<String>,
    },

    /// Run a command on a remote host and exit with its exit code
    Exec {
        /// Print exit code, stdout and stderr as JSON
        #[arg(long)]
        json: bool,
        /// Target in [user@]host format
        target: String,
        /// Command to run through the remote shell
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Upload a local file ([user@]host:path destination)
    Put {
        /// Local source file
        local: PathBuf,
        /// Remote destination in [user@]host:path format
        remote: String,
    },

    /// Download a remote file ([user@]host:path source)
    Fetch {
        /// Remote source in [user@]host:path format
        remote: String,
        /// Local destination file
        local: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("rexec=debug,rexec_client=debug,rexec_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("rexec=warn,rexec_client=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("rexec: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    // Load config file.
    let config_path = cli.config.clone().unwrap_or_else(config::Config::default_path);
    let cfg = config::Config::load(&config_path)?;

    let globals = Globals {
        config: cfg,
        config_path,
        port: cli.port,
        identity_file: cli.identity_file,
        key_dir: cli.key_dir,
        timeout_secs: cli.timeout,
        ask_password: cli.ask_password,
    };

    match cli.command {
        Command::Check { target } => commands::check::run(&globals, target.as_deref())
            .await
            .map(|()| 0),
        Command::Exec {
            json,
            target,
            command,
        } => commands::exec::run(&globals, &target, &command, json).await,
        Command::Put { local, remote } => commands::transfer::put(&globals, &local, &remote)
            .await
            .map(|()| 0),
        Command::Fetch { remote, local } => commands::transfer::fetch(&globals, &remote, &local)
            .await
            .map(|()| 0),
    }
}
