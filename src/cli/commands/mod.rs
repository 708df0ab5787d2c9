//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod config_cmd;
mod info;
mod run;
mod verify;
mod worker;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use tallyscan::Config;

#[derive(Parser)]
#[command(name = "tallyscan")]
#[command(about = "Parallel page extraction and OCR for scanned documents")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "TALLYSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors and the final summary
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, recognize and grade every page of a document
    Run(run::RunArgs),

    /// Grade the results already written to an output directory
    Verify {
        /// Output directory of a previous run
        dir: PathBuf,
        /// Entity to track (repeatable; overrides the configured list)
        #[arg(short, long = "entity")]
        entities: Vec<String>,
    },

    /// Show page count, size and checksum of a document
    Info {
        /// PDF file or directory of page images
        document: PathBuf,
    },

    /// Check availability of external tools
    Check,

    /// Print the effective configuration as TOML
    Config,

    /// Serve page tasks over stdin/stdout (used by the process pool)
    #[command(hide = true)]
    Worker,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Workers get their settings over stdin and never read config files.
    if matches!(cli.command, Commands::Worker) {
        return worker::cmd_worker().await;
    }

    let (config, config_path) = Config::load(cli.config.as_deref())
        .await
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Run(args) => run::cmd_run(config, args, cli.quiet).await,
        Commands::Verify { dir, entities } => {
            verify::cmd_verify(&config, &dir, entities, cli.quiet).await
        }
        Commands::Info { document } => info::cmd_info(&config, &document).await,
        Commands::Check => check::cmd_check(&config).await,
        Commands::Config => config_cmd::cmd_config(&config, config_path.as_deref()).await,
        Commands::Worker => worker::cmd_worker().await,
    }
}
