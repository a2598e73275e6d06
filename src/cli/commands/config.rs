//! Configuration command implementation.

use crate::core::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Parse and validate a configuration file.
    Validate,
    /// Print the effective configuration as TOML.
    Show,
}

/// Run a config subcommand against the given config path.
pub fn run_config(config_path: &Path, args: &ConfigArgs) -> Result<()> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("failed to load config from {:?}", config_path))?;
    match args.command {
        ConfigCommand::Validate => {
            println!("configuration OK: {}", config_path.display());
        }
        ConfigCommand::Show => {
            let rendered =
                toml::to_string_pretty(&config).context("failed to render configuration")?;
            print!("{rendered}");
        }
    }
    Ok(())
}
