//! # limiquantix prlprobe
//!
//! Loads Parallels domains through the adapter and prints them.
//!
//! ## Usage
//! ```bash
//! prlprobe --inventory config/inventory.yaml list
//! prlprobe --config /etc/limiquantix/prlprobe.yaml show 4c3f2d1e-8a9b-4c5d-9e0f-1a2b3c4d5e6f
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use limiquantix_prlprobe::cli::Args;
use limiquantix_prlprobe::config::{Config, DEFAULT_CONFIG_PATH};
use limiquantix_prlprobe::Inventory;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration; logging is configured from it, so report afterwards
    let (config, source) = match &args.config {
        Some(config_path) => (Config::load(config_path)?, Some(config_path.as_str())),
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(cfg) => (cfg, Some(DEFAULT_CONFIG_PATH)),
            Err(_) => (Config::default(), None),
        },
    };
    let config = config.with_cli_overrides(&args)?;

    // Initialize logging
    limiquantix_common::init_logging_with_format(config.log_format, &config.log_level)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting prlprobe");
    match source {
        Some(path) => info!(config_path = %path, "Configuration loaded"),
        None => info!("No config file found, using CLI arguments and defaults"),
    }

    let inventory = match &config.inventory {
        Some(path) => Inventory::load(path)?,
        None => {
            warn!("No inventory configured, the dispatcher has no domains");
            Inventory::default()
        }
    };

    info!(
        domains = inventory.domains.len(),
        job_timeout = ?config.connection.job_timeout(),
        "prlprobe configured"
    );

    // The adapter blocks on vendor jobs; keep it off the async workers.
    let command = args.command.clone();
    let output = tokio::task::spawn_blocking(move || {
        limiquantix_prlprobe::run(&config, &inventory, &command)
    })
    .await
    .context("Probe task panicked")?;

    match output {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Probe failed");
            Err(e)
        }
    }
}
