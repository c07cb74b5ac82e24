use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "relaygram")]
#[command(about = "Replicate a Telegram channel into another channel")]
#[command(version)]
pub struct Cli {
    /// Path to relaygram.toml config file
    #[arg(short, long, global = true, default_value = "relaygram.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create relaygram.toml and .env.example in a directory
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Replicate everything posted since the last run
    Run {
        /// Stop gracefully after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Show checkpoint and identity map status
    Status,

    /// Inspect units that could not be replicated
    Failed {
        #[command(subcommand)]
        command: FailedCommands,
    },
}

#[derive(Subcommand)]
pub enum FailedCommands {
    /// List failed units, oldest first
    List {
        /// Maximum number of entries to show
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Remove all failed-unit records
    Clear,
}
