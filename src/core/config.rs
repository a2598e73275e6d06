//! Configuration parsing and validation.
//!
//! Castor configuration is loaded from TOML files with CLI overrides. Every
//! instance of a deployment runs the same binary; the `[service]` section
//! decides whether this node selects reservations (master) or replays them
//! (slave).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level Castor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Role and replication topology.
    pub service: ServiceConfig,

    /// Shared cache namespaces.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Consumption telemetry and logging.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Slave-side retry policy while waiting for replicated chunks.
    #[serde(default)]
    pub slave: SlaveConfig,

    /// Transport parameters handed to the inter-VCP collaborator.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Filesystem paths.
    #[serde(default)]
    pub paths: PathConfig,
}

/// Role and replication topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Whether this node selects the fragments backing each reservation.
    pub master: bool,

    /// Ordered slave endpoints the master replicates reservations to.
    #[serde(default)]
    pub slave_uris: Vec<String>,
}

/// Shared cache namespaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Namespace for reservation entries.
    #[serde(default = "default_reservation_store")]
    pub reservation_store: String,

    /// Key prefix for consumption buckets.
    #[serde(default = "default_consumption_store_prefix")]
    pub consumption_store_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            reservation_store: default_reservation_store(),
            consumption_store_prefix: default_consumption_store_prefix(),
        }
    }
}

/// Consumption telemetry and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Consumption bucket width in milliseconds.
    #[serde(default = "default_telemetry_interval_ms")]
    pub interval_ms: u64,

    /// Consumption bucket retention in milliseconds.
    #[serde(default = "default_telemetry_ttl_ms")]
    pub ttl_ms: u64,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_telemetry_interval_ms(),
            ttl_ms: default_telemetry_ttl_ms(),
            log_level: default_log_level(),
        }
    }
}

/// Slave-side retry policy while waiting for replicated chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveConfig {
    /// Give up waiting for a referenced chunk after this many milliseconds.
    #[serde(default = "default_wait_for_reservation_timeout_ms")]
    pub wait_for_reservation_timeout_ms: u64,

    /// Delay between availability probes in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            wait_for_reservation_timeout_ms: default_wait_for_reservation_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Transport parameters consumed by the inter-VCP collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Server heartbeat interval in milliseconds.
    #[serde(default = "default_server_heartbeat_ms")]
    pub server_heartbeat_ms: u64,

    /// Client heartbeat interval in milliseconds.
    #[serde(default = "default_client_heartbeat_ms")]
    pub client_heartbeat_ms: u64,

    /// Message buffer size in bytes.
    #[serde(default = "default_message_buffer")]
    pub message_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_heartbeat_ms: default_server_heartbeat_ms(),
            client_heartbeat_ms: default_client_heartbeat_ms(),
            message_buffer: default_message_buffer(),
        }
    }
}

/// Filesystem path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Directory for the fragment journal.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
        }
    }
}

// Default value functions

fn default_reservation_store() -> String {
    "reservationStore".to_string()
}

fn default_consumption_store_prefix() -> String {
    "consumption".to_string()
}

fn default_telemetry_interval_ms() -> u64 {
    60_000
}

fn default_telemetry_ttl_ms() -> u64 {
    3_600_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_wait_for_reservation_timeout_ms() -> u64 {
    5_000
}

fn default_retry_delay_ms() -> u64 {
    250
}

fn default_server_heartbeat_ms() -> u64 {
    10_000
}

fn default_client_heartbeat_ms() -> u64 {
    10_000
}

fn default_message_buffer() -> usize {
    262_144
}

fn default_storage_dir() -> String {
    "data".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref storage_dir) = overrides.storage_dir {
            self.paths.storage_dir = storage_dir.clone();
        }
        if let Some(master) = overrides.master {
            self.service.master = master;
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_service()?;
        self.validate_telemetry()?;
        self.validate_slave()?;
        self.validate_transport()?;
        Ok(())
    }

    fn validate_service(&self) -> Result<()> {
        if !self.service.master && !self.service.slave_uris.is_empty() {
            anyhow::bail!("service.slave_uris is only meaningful on the master");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        if self.telemetry.interval_ms == 0 {
            anyhow::bail!("telemetry.interval_ms must be > 0");
        }
        if self.telemetry.ttl_ms < self.telemetry.interval_ms {
            anyhow::bail!(
                "telemetry.ttl_ms ({}) must be at least telemetry.interval_ms ({})",
                self.telemetry.ttl_ms,
                self.telemetry.interval_ms
            );
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }

    fn validate_slave(&self) -> Result<()> {
        if self.slave.retry_delay_ms == 0 {
            anyhow::bail!("slave.retry_delay_ms must be > 0");
        }
        if self.slave.wait_for_reservation_timeout_ms < self.slave.retry_delay_ms {
            anyhow::bail!(
                "slave.wait_for_reservation_timeout_ms ({}) must be at least slave.retry_delay_ms ({})",
                self.slave.wait_for_reservation_timeout_ms,
                self.slave.retry_delay_ms
            );
        }
        Ok(())
    }

    fn validate_transport(&self) -> Result<()> {
        if self.transport.server_heartbeat_ms == 0 || self.transport.client_heartbeat_ms == 0 {
            anyhow::bail!("transport heartbeats must be > 0");
        }
        if self.transport.message_buffer == 0 {
            anyhow::bail!("transport.message_buffer must be > 0");
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override storage directory.
    pub storage_dir: Option<String>,
    /// Override the master role flag.
    pub master: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = Config::from_toml("[service]\nmaster = true\n").unwrap();
        assert!(config.service.master);
        assert_eq!(config.cache.reservation_store, "reservationStore");
        assert_eq!(config.telemetry.interval_ms, 60_000);
        assert_eq!(config.slave.retry_delay_ms, 250);
    }

    #[test]
    fn slave_uris_rejected_on_non_master() {
        let result = Config::from_toml(
            r#"
[service]
master = false
slave_uris = ["http://castor-1:8080"]
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn retention_must_cover_one_bucket() {
        let result = Config::from_toml(
            r#"
[service]
master = true

[telemetry]
interval_ms = 60000
ttl_ms = 1000
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn overrides_apply() {
        let mut config = Config::from_toml("[service]\nmaster = false\n").unwrap();
        config.apply_overrides(&ConfigOverrides {
            log_level: Some("debug".to_string()),
            storage_dir: Some("/var/lib/castor".to_string()),
            master: Some(true),
        });
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.paths.storage_dir, "/var/lib/castor");
        assert!(config.service.master);
    }
}
