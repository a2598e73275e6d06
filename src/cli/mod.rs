//! Command-line interface.
//!
//! Unified CLI for Castor operations.

pub mod commands;

use clap::{Parser, Subcommand};

/// Castor - tuple reservation and fragment store for MPC engines.
#[derive(Parser, Debug)]
#[command(name = "castor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the Castor service.
    Start(commands::StartArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
}
