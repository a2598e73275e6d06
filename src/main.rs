//! Castor - unified CLI entrypoint.
//!
//! Usage:
//!   castor start --config config/castor.toml [--master]
//!   castor config validate --config config/castor.toml
//!   castor config show --config config/castor.toml

use anyhow::Result;
use castor::cli::commands::{run_config, run_start_with_config};
use castor::cli::{Cli, Commands};
use castor::core::config::ConfigOverrides;
use clap::Parser;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config/castor.toml"));
    let overrides = ConfigOverrides {
        log_level: cli.log_level,
        ..ConfigOverrides::default()
    };

    match cli.command {
        Commands::Start(args) => run_start_with_config(&config_path, &args, &overrides).await,
        Commands::Config(args) => run_config(&config_path, &args),
    }
}
