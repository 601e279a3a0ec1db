//! Host capability queries.

use sysinfo::{CpuRefreshKind, RefreshKind, System};

use crate::error::{PrlError, Result};

/// Source of host facts the adapter needs while assembling domains.
pub trait HostInfo: Send + Sync {
    /// Number of logical CPUs on the host.
    fn logical_cpu_count(&self) -> Result<usize>;
}

/// Queries the running system through `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl HostInfo for SystemHost {
    fn logical_cpu_count(&self) -> Result<usize> {
        let system = System::new_with_specifics(
            RefreshKind::new().with_cpu(CpuRefreshKind::new()),
        );
        match system.cpus().len() {
            0 => Err(PrlError::HostQuery("no logical CPUs reported".to_string())),
            n => Ok(n),
        }
    }
}

/// Fixed CPU count, for tests and for hosts where detection is overridden.
#[derive(Debug, Clone, Copy)]
pub struct FixedHost(pub usize);

impl HostInfo for FixedHost {
    fn logical_cpu_count(&self) -> Result<usize> {
        Ok(self.0)
    }
}
