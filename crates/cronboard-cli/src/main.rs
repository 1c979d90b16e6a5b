//! Cronboard - operator console for a scheduled plugin runner
//!
//! Logs in against the runtime's HTTP API, keeps the session token on disk
//! and drives plugins and their configuration from the command line.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cronboard_core::{paths, ConsoleConfig, ConsoleError};

mod commands;

/// Cronboard - plugin runner console
#[derive(Parser)]
#[command(name = "cronboard")]
#[command(about = "Operator console for a scheduled plugin runner", long_about = None)]
struct Cli {
    /// Log to stderr instead of ~/.cronboard/logs/cronboard.log
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the backend base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Read settings from this file instead of ~/.cronboard/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and persist the session token
    Login {
        #[arg(short, long)]
        username: Option<String>,
        /// Prompted for on stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// End the session here and on the backend
    Logout,
    /// Show who the stored session belongs to
    Whoami,
    /// Show runtime status
    Status,
    /// Show recent runtime log lines
    Logs,
    /// Inspect and manage plugins
    Plugins {
        #[command(subcommand)]
        command: commands::PluginCommand,
    },
    /// Read, validate and write the system config
    System {
        #[command(subcommand)]
        command: commands::SystemCommand,
    },
}

fn init_logging(verbose: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return;
    }

    // Log to file so command output on stdout stays clean
    let log_dir = paths::logs_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory: {}", e);
    }
    match std::fs::File::create(log_dir.join("cronboard.log")) {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init(),
        Err(e) => eprintln!("Failed to create log file: {}, logging disabled", e),
    }
}

fn load_config(cli: &Cli) -> Result<ConsoleConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = ConsoleConfig::load_from_path(path)?;
            config.apply_env();
            config
        }
        None => ConsoleConfig::load()?,
    };
    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match load_config(&cli) {
        Ok(config) => commands::run(cli.command, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {:#}", e);
        let needs_login = e
            .downcast_ref::<ConsoleError>()
            .is_some_and(ConsoleError::requires_login);
        if needs_login {
            eprintln!("Run `cronboard login` to start a new session.");
        }
        std::process::exit(1);
    }
}
