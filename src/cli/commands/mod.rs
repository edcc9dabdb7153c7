//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod init;
mod run;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_config, LoadOptions};

#[derive(Parser)]
#[command(name = "scanbox")]
#[command(about = "Folder-based OCR pipeline for scanned document images")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding inbox/, processing/, processed/, failed/ and output/
    #[arg(short, long, global = true, env = "SCANBOX_ROOT")]
    root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Process every image currently in the inbox
    Run {
        /// Also write a JSON document with every processed file's sections
        #[arg(long, value_name = "PATH")]
        batch_json: Option<PathBuf>,
    },

    /// Create the directory layout
    Init,

    /// Show files per stage, orphans and manifest totals
    Status,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        root: cli.root,
    };
    let config = load_config(&options).await?;
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Run { batch_json } => {
            run::cmd_run(&config, &options, &cwd, batch_json.as_deref()).await
        }
        Commands::Init => init::cmd_init(&config.layout(options.root.as_deref(), &cwd)).await,
        Commands::Status => status::cmd_status(&config.layout(options.root.as_deref(), &cwd)).await,
    }
}
