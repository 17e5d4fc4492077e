//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Incremental event sync job
#[derive(Parser, Debug)]
#[command(name = "event-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Job configuration file (YAML); defaults plus environment when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every feed once and exit
    Run {
        /// Only run this feed
        #[arg(long)]
        feed: Option<String>,
    },

    /// Run every feed on a fixed interval until interrupted
    Schedule {
        /// Seconds between run starts (overrides run.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Print the stored cursor of each feed
    Checkpoint {
        /// Only show this feed
        #[arg(long)]
        feed: Option<String>,
    },

    /// Load and validate the configuration
    Validate,
}
