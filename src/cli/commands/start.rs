//! Start command implementation.

use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

/// Start the Castor service.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Run as the selecting master node.
    #[arg(long)]
    pub master: bool,
}

/// Initialize tracing subscriber if the telemetry feature is enabled.
#[cfg(feature = "telemetry")]
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing() {}

/// Run the start command with the given config path and overrides.
pub async fn run_start_with_config(
    config_path: &Path,
    args: &StartArgs,
    overrides: &ConfigOverrides,
) -> Result<()> {
    init_tracing();

    let mut config = Config::from_file(config_path)
        .with_context(|| format!("failed to load config from {:?}", config_path))?;
    config.apply_overrides(overrides);
    if args.master {
        config.service.master = true;
    }
    config.validate()?;

    let runtime = Runtime::new(config)?;
    runtime.run().await
}
