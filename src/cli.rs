use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "airwave")]
#[command(author, version, about = "Linear TV-station playout scheduler")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the playout scheduler for one or more stations
    Serve {
        /// Stations to start immediately (all known stations if omitted)
        #[arg(long)]
        station: Vec<String>,
    },

    /// Probe durations and measure loudness for videos missing metadata
    Backfill {
        /// Concurrent subprocess jobs (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
