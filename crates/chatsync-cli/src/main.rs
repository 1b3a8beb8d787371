//! chatsync CLI
//!
//! Command-line interface for chatsync - a polling chat client.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chatsync_core::{Config, Viewer};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "chatsync")]
#[command(about = "chatsync - Keep a chat room feed in sync from the terminal")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use an alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the room: print the feed as it changes, send lines from stdin
    Watch,
    /// Fetch and print the feed once
    #[command(alias = "ls")]
    List,
    /// Send a message
    Send {
        /// Message text
        text: String,
    },
    /// Delete a message (admin only)
    #[command(alias = "rm")]
    Delete {
        /// Message ID
        id: String,
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
        /// Configuration key (server_url, poll_interval_ms, request_timeout_secs,
        /// token, role, username, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Commands that don't need a session
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    init_logging(&config);

    match cli.command {
        Commands::Watch => commands::watch::run(&config, &output).await,
        Commands::List => commands::list::run(&config, &output).await,
        Commands::Send { text } => commands::send::run(&config, &text, &output).await,
        Commands::Delete { id } => commands::delete::run(&config, &id, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Viewer identity from configuration
pub(crate) fn viewer(config: &Config) -> Viewer {
    Viewer::new(config.username.clone(), config.role)
}

/// Initialize logging when CHATSYNC_LOG is set
///
/// Logs go to the configured log file, or stderr when none is set, so they
/// never mix with command output on stdout.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("CHATSYNC_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "chatsync_core={},chatsync_cli={}",
        log_level, log_level
    ));

    // Ignore error if already initialized
    match &config.log_file {
        Some(log_path) => {
            let log_file = match OpenOptions::new().create(true).append(true).open(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
                    return;
                }
            };
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();
            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
