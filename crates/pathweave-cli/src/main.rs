//! Pathweave CLI - Security inventory ingestion
//!
//! Loads collector output (directory dumps, host inventories) into one
//! unified object graph and reports what was built.
//!
//! # Usage
//!
//! ```bash
//! # Ingest a collection directory
//! pathweave analyze ./collected
//!
//! # Ingest specific files and print statistics as JSON
//! pathweave analyze corp.objects.jsonl ws01.localmachine.json --json
//!
//! # Show the effective configuration
//! pathweave config show
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod progress;

/// Pathweave - Unified security inventory graphs
#[derive(Parser, Debug)]
#[command(name = "pathweave")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true, env = "PATHWEAVE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest inventory files into a unified graph
    Analyze(commands::analyze::AnalyzeArgs),

    /// View configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(&cli.global)?;

    init_logging(&cli.global, &config.logging.level)?;

    match cli.command {
        Commands::Analyze(args) => commands::analyze::execute(args, config, cli.global),
        Commands::Config(cmd) => commands::config::execute(cmd, config),
    }
}

/// Install the stderr subscriber. `--quiet`/`--verbose` win over `RUST_LOG`,
/// which wins over the configured level.
fn init_logging(global: &GlobalOptions, configured: &str) -> Result<()> {
    let filter = if global.quiet {
        EnvFilter::new(Level::ERROR.as_str())
    } else if global.verbose {
        EnvFilter::new(Level::DEBUG.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = configured.parse().unwrap_or(Level::INFO);
            EnvFilter::new(level.as_str())
        })
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
