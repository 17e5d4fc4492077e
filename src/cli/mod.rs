//! CLI module
//!
//! Command-line interface and trigger surface for the sync job.
//!
//! # Commands
//!
//! - `run` - One invocation over all (or one) feeds
//! - `schedule` - In-process interval trigger
//! - `checkpoint` - Show stored cursors
//! - `validate` - Check the configuration

mod commands;
mod runner;

pub use commands::{Cli, Commands};
pub use runner::{build_engine, run_job, Runner};
