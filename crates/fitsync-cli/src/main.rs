//! `fitsync`: drive the offline sync engine from a terminal

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fitsync_core::{Collaborators, Config, SyncEngine};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "fitsync")]
#[command(about = "Queue, inspect and replay FitFusion writes while offline")]
#[command(version, propagate_version = true)]
struct Cli {
    /// Emit machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Print ids only
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Read settings from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check reachability and show queue totals
    Status,
    /// Run the engine in the foreground and print sync events
    Watch,
    /// Inspect and manage queued operations
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Queue an operation for later delivery
    Enqueue {
        /// Operation name (e.g. update-profile)
        operation: String,
        /// JSON payload
        payload: Option<String>,
    },
    /// Send an operation now, queueing it if the server is unreachable
    Submit {
        /// Operation name (e.g. complete-session)
        operation: String,
        /// JSON payload
        payload: Option<String>,
    },
    /// Inspect or reset the persisted client state
    State {
        #[command(subcommand)]
        command: Option<StateCommands>,
    },
    /// Read or change settings
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// List queued operations
    #[command(alias = "ls")]
    List {
        /// Only show failed operations
        #[arg(long)]
        failed: bool,
    },
    /// Send everything pending now
    Flush,
    /// Retry a failed operation
    Retry {
        /// Entry ID (full UUID or prefix)
        id: String,
    },
    /// Drop a queued operation
    #[command(alias = "rm")]
    Discard {
        /// Entry ID (full UUID or prefix)
        id: String,
    },
}

#[derive(Subcommand, Clone)]
enum StateCommands {
    /// Show the current state
    Show,
    /// Forget the snapshot and every queued operation
    Reset,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Print the effective settings
    Show,
    /// Persist one setting
    Set {
        /// Dotted key, e.g. api_url or monitor.poll_interval_secs
        key: String,
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // no engine (and no storage) needed to edit settings
    if let Commands::Config { command } = &cli.command {
        return config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("could not load settings")?;
    init_logging(&config);

    let collaborators = Collaborators::from_config(&config)?;
    let engine = SyncEngine::init(config, collaborators);

    match cli.command {
        Commands::Config { .. } => Ok(()),
        Commands::Status => commands::status::show(&engine, &output).await,
        Commands::Watch => commands::watch::run(&engine, &output).await,
        Commands::Queue { command } => queue_command(command, &engine, &output).await,
        Commands::Enqueue { operation, payload } => {
            commands::queue::enqueue(&engine, operation, payload, &output)
        }
        Commands::Submit { operation, payload } => {
            commands::queue::submit(&engine, operation, payload, &output).await
        }
        Commands::State { command } => match command {
            Some(StateCommands::Show) | None => commands::state::show(&engine, &output),
            Some(StateCommands::Reset) => commands::state::reset(&engine, &output),
        },
    }
}

async fn queue_command(
    command: QueueCommands,
    engine: &SyncEngine,
    output: &Output,
) -> Result<()> {
    match command {
        QueueCommands::List { failed } => commands::queue::list(engine, failed, output),
        QueueCommands::Flush => commands::queue::flush(engine, output).await,
        QueueCommands::Retry { id } => commands::queue::retry(engine, id, output).await,
        QueueCommands::Discard { id } => commands::queue::discard(engine, id, output),
    }
}

fn config_command(
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

/// Log to stderr, or to `log_file` when one is configured.
///
/// The level comes from FITSYNC_LOG, then RUST_LOG, and defaults to warn.
fn init_logging(config: &Config) {
    let level = ["FITSYNC_LOG", "RUST_LOG"]
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .unwrap_or_else(|| "warn".to_owned());
    let filter = || EnvFilter::new(format!("fitsync_core={level},fitsync_cli={level}"));

    let file = config.log_file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("fitsync: log file {} unusable ({e}), using stderr", path.display()))
            .ok()
    });

    let installed = match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    // a second init only happens in tests
    drop(installed);
}
