//! CLI definitions for TaskHands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// TaskHands CLI.
#[derive(Parser)]
#[command(name = "taskhands")]
#[command(about = "Dynamic cron task scheduler with runtime start/stop control")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (default: config/default.toml, then
    /// ~/.taskhands/config.toml)
    #[arg(short, long, global = true, env = "TASKHANDS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler and control server in foreground (default)
    Run {
        /// Server host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Server port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate the configuration and print the task table
    Check,
}
