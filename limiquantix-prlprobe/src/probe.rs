//! Runs one probe command against the adapter.

use std::sync::Arc;

use anyhow::{Context, Result};
use limiquantix_parallels::{
    Connection, FixedHost, HostInfo, MockSdk, ParallelsDriver, Sdk, SystemHost,
};
use tracing::{debug, info};

use crate::cli::Command;
use crate::config::Config;
use crate::inventory::Inventory;

/// Connect, execute `command` and return its printable output.
///
/// Blocks the calling thread for as long as the vendor jobs take.
pub fn run(config: &Config, inventory: &Inventory, command: &Command) -> Result<String> {
    let sdk: Arc<dyn Sdk> = Arc::new(MockSdk::with_vms(inventory.to_mock_vms()));
    let host: Arc<dyn HostInfo> = match config.host_cpus {
        Some(cpus) => Arc::new(FixedHost(cpus)),
        None => Arc::new(SystemHost),
    };

    let conn = Connection::open(sdk, host, &config.connection)
        .context("Failed to connect to dispatcher")?;
    let driver = ParallelsDriver::new(conn);

    let output = match command {
        Command::List => {
            let count = driver.load_domains().context("Failed to load domains")?;
            info!(count, "Domains loaded");
            list(&driver)
        }
        Command::Show { uuid } => {
            let dom = driver
                .add_domain(uuid)
                .with_context(|| format!("Failed to load domain {}", uuid))?;
            serde_json::to_string_pretty(&*dom)?
        }
        Command::Refresh { uuid } => {
            let mut dom = driver
                .add_domain(uuid)
                .with_context(|| format!("Failed to load domain {}", uuid))?;
            driver
                .refresh_domain(&mut dom)
                .with_context(|| format!("Failed to refresh domain {}", uuid))?;
            debug!(uuid = %uuid, state = %dom.lifecycle, "Domain refreshed");
            serde_json::to_string_pretty(&*dom)?
        }
    };

    driver.close();
    Ok(output)
}

/// One line per domain, sorted by name.
fn list(driver: &ParallelsDriver) -> String {
    let mut rows: Vec<String> = driver
        .domains()
        .uuids()
        .iter()
        .filter_map(|uuid| driver.domains().lookup_by_uuid(uuid))
        .map(|dom| {
            let id = dom.def.id.map_or_else(|| "-".to_string(), |id| id.to_string());
            format!("{:<24} {} {:<20} {}", dom.name(), dom.uuid(), dom.lifecycle.to_string(), id)
        })
        .collect();
    rows.sort();
    rows.join("\n")
}
