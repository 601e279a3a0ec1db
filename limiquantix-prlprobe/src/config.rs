//! Configuration management for prlprobe.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use limiquantix_common::LogFormat;
use limiquantix_parallels::ConnectionConfig;
use serde::Deserialize;

use crate::cli::Args;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/limiquantix/prlprobe.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Adapter connection settings
    pub connection: ConnectionConfig,
    /// Domain inventory for the mock SDK
    pub inventory: Option<PathBuf>,
    /// Host logical CPU count; detected when unset
    pub host_cpus: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            connection: ConnectionConfig::default(),
            inventory: None,
            host_cpus: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Result<Self> {
        if let Some(ref level) = args.log_level {
            self.log_level = level.clone();
        }

        if let Some(ref format) = args.log_format {
            self.log_format = format.parse()?;
        }

        if let Some(timeout) = args.job_timeout_ms {
            self.connection.job_timeout_ms = Some(timeout);
        }

        if let Some(ref inventory) = args.inventory {
            self.inventory = Some(inventory.clone());
        }

        if let Some(cpus) = args.host_cpus {
            self.host_cpus = Some(cpus);
        }

        Ok(self)
    }
}
