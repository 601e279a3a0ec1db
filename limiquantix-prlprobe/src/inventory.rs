//! Domain inventory files.
//!
//! An inventory describes vendor-side domains in readable YAML and is turned
//! into [`MockVm`] fixtures for the mock SDK:
//!
//! ```yaml
//! domains:
//!   - name: web-01
//!     state: running
//!     env_id: 101
//!     disks:
//!       - { path: /vz/web-01.pvm/harddisk.hdd, bus: scsi }
//!     nets:
//!       - { kind: bridged, ifname: veth101, mac: "00:1c:42:00:01:01", network: Bridged }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use limiquantix_parallels::mock::{MockDisk, MockNet, MockSerial, MockVm};
use limiquantix_parallels::sdk::consts::*;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub domains: Vec<DomainEntry>,
}

impl Inventory {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid inventory: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Build the mock fixtures, one per entry.
    pub fn to_mock_vms(&self) -> Vec<MockVm> {
        self.domains.iter().map(DomainEntry::to_mock).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    #[default]
    Vm,
    Ct,
}

/// Vendor lifecycle state names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorState {
    Unknown,
    #[default]
    Stopped,
    Starting,
    Restoring,
    Running,
    Paused,
    Suspending,
    Stopping,
    Compacting,
    Suspended,
    Snapshoting,
    Resetting,
    Pausing,
    Continuing,
    Migrating,
    DeletingState,
    Resuming,
    SuspendingSync,
    Reconnecting,
    Mounted,
    /// Raw vendor code, for exercising unknown states.
    Code(u32),
}

impl VendorState {
    pub fn code(self) -> u32 {
        match self {
            Self::Unknown => VMS_UNKNOWN,
            Self::Stopped => VMS_STOPPED,
            Self::Starting => VMS_STARTING,
            Self::Restoring => VMS_RESTORING,
            Self::Running => VMS_RUNNING,
            Self::Paused => VMS_PAUSED,
            Self::Suspending => VMS_SUSPENDING,
            Self::Stopping => VMS_STOPPING,
            Self::Compacting => VMS_COMPACTING,
            Self::Suspended => VMS_SUSPENDED,
            Self::Snapshoting => VMS_SNAPSHOTING,
            Self::Resetting => VMS_RESETTING,
            Self::Pausing => VMS_PAUSING,
            Self::Continuing => VMS_CONTINUING,
            Self::Migrating => VMS_MIGRATING,
            Self::DeletingState => VMS_DELETING_STATE,
            Self::Resuming => VMS_RESUMING,
            Self::SuspendingSync => VMS_SUSPENDING_SYNC,
            Self::Reconnecting => VMS_RECONNECTING,
            Self::Mounted => VMS_MOUNTED,
            Self::Code(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VncMode {
    #[default]
    Disabled,
    Manual,
    Auto,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VncEntry {
    pub mode: VncMode,
    pub port: u32,
    pub address: String,
}

/// One vendor domain. Unset fields take the mock's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomainEntry {
    pub name: String,
    pub uuid: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: DomainKind,
    pub state: VendorState,
    pub env_id: u32,
    pub memory_mib: Option<u32>,
    pub cpus: Option<u32>,
    pub cpu_mask: String,
    /// 32 or 64
    pub cpu_bits: Option<u32>,
    pub autostart: bool,
    pub video_ram_mib: Option<u32>,
    pub home: Option<String>,
    pub vnc: VncEntry,
    pub disks: Vec<DiskEntry>,
    pub nets: Vec<NetEntry>,
    pub serials: Vec<SerialEntry>,
}

impl DomainEntry {
    pub fn to_mock(&self) -> MockVm {
        let mut vm = match self.kind {
            DomainKind::Vm => MockVm::new(&self.name),
            DomainKind::Ct => MockVm::container(&self.name),
        };

        if let Some(uuid) = self.uuid {
            vm = vm.with_uuid(uuid);
        }
        vm = vm.with_state(self.state.code(), self.env_id);
        if let Some(mib) = self.memory_mib {
            vm = vm.with_memory(mib);
        }
        let cpus = self.cpus.unwrap_or(vm.cpu_count);
        vm = vm.with_cpus(cpus, &self.cpu_mask);
        match self.cpu_bits {
            Some(32) => vm = vm.with_cpu_mode(PCM_CPU_MODE_32),
            Some(64) | None => {}
            // Passed through so the adapter reports it.
            Some(other) => vm = vm.with_cpu_mode(other),
        }
        if self.autostart {
            vm = vm.with_autostart(PAO_VM_START_ON_LOAD);
        }
        if let Some(mib) = self.video_ram_mib {
            vm = vm.with_video_ram(mib);
        }
        if let Some(ref home) = self.home {
            vm = vm.with_home(home);
        }

        let vnc_mode = match self.vnc.mode {
            VncMode::Disabled => PRD_DISABLED,
            VncMode::Manual => PRD_MANUAL,
            VncMode::Auto => PRD_AUTO,
        };
        vm = vm.with_vnc(vnc_mode, self.vnc.port, &self.vnc.address);

        for (i, disk) in self.disks.iter().enumerate() {
            vm = vm.with_disk(disk.to_mock(i as u32));
        }
        for (i, net) in self.nets.iter().enumerate() {
            vm = vm.with_net(net.to_mock(i as u32));
        }
        for (i, serial) in self.serials.iter().enumerate() {
            vm = vm.with_serial(serial.to_mock(i as u32));
        }
        vm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskKind {
    #[default]
    Image,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bus {
    Ide,
    #[default]
    Scsi,
    Sata,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiskEntry {
    pub path: String,
    pub kind: DiskKind,
    pub bus: Bus,
    /// Defaults to the disk's position in the list.
    pub stack_index: Option<u32>,
}

impl DiskEntry {
    fn to_mock(&self, index: u32) -> MockDisk {
        let bus = match self.bus {
            Bus::Ide => PMS_IDE_DEVICE,
            Bus::Scsi => PMS_SCSI_DEVICE,
            Bus::Sata => PMS_SATA_DEVICE,
        };
        let stack_index = self.stack_index.unwrap_or(index);
        match self.kind {
            DiskKind::Image => MockDisk::image(&self.path, bus, stack_index, index),
            DiskKind::Block => MockDisk::block(&self.path, bus, stack_index, index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetKind {
    #[default]
    Bridged,
    Routed,
    /// Container venet adapter
    Venet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetEntry {
    pub kind: NetKind,
    pub ifname: String,
    pub mac: String,
    pub network: String,
    pub connected: bool,
}

impl Default for NetEntry {
    fn default() -> Self {
        Self {
            kind: NetKind::default(),
            ifname: String::new(),
            mac: String::new(),
            network: String::new(),
            connected: true,
        }
    }
}

impl NetEntry {
    fn to_mock(&self, index: u32) -> MockNet {
        match self.kind {
            NetKind::Bridged => {
                MockNet::bridged(index, &self.ifname, &self.mac, &self.network, self.connected)
            }
            NetKind::Routed => MockNet::routed(index, &self.ifname, &self.mac),
            NetKind::Venet => MockNet::venet(&self.ifname),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialKind {
    #[default]
    File,
    Socket,
    Device,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SerialEntry {
    pub kind: SerialKind,
    pub path: String,
}

impl SerialEntry {
    fn to_mock(&self, index: u32) -> MockSerial {
        let emulated = match self.kind {
            SerialKind::File => PDT_USE_OUTPUT_FILE,
            SerialKind::Socket => PDT_USE_SERIAL_PORT_SOCKET_MODE,
            SerialKind::Device => PDT_USE_REAL_DEVICE,
        };
        MockSerial::new(index, emulated, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_entry_uses_mock_defaults() {
        let inventory = Inventory::from_yaml("domains:\n  - name: plain\n").unwrap();
        let vms = inventory.to_mock_vms();

        assert_eq!(vms.len(), 1);
        assert_eq!(vms[0].name, "plain");
        assert_eq!(vms[0].vm_type, PVT_VM);
        assert_eq!(vms[0].state, VMS_STOPPED);
        assert_eq!(vms[0].cpu_count, 2);
        assert_eq!(vms[0].vnc_mode, PRD_DISABLED);
    }

    #[test]
    fn test_raw_state_code() {
        let inventory = Inventory::from_yaml(
            "domains:\n  - name: odd\n    state: !code 805306623\n",
        )
        .unwrap();
        assert_eq!(inventory.to_mock_vms()[0].state, 0x3000_00ff);
    }

    #[test]
    fn test_devices_are_indexed_by_position() {
        let yaml = r#"
domains:
  - name: ct-101
    type: ct
    disks:
      - { path: /vz/private/101/root.hdd }
      - { path: /dev/sdd, kind: block, bus: sata, stack_index: 5 }
    nets:
      - { kind: venet, ifname: venet0 }
    serials:
      - { kind: socket, path: /tmp/ct-101.sock }
"#;
        let vm = &Inventory::from_yaml(yaml).unwrap().to_mock_vms()[0];

        assert_eq!(vm.vm_type, PVT_CT);
        assert_eq!(vm.disks[1].index, 1);
        assert_eq!(vm.disks[1].stack_index, 5);
        assert_eq!(vm.disks[1].emulated_type, PDT_USE_REAL_DEVICE);
        assert_eq!(vm.nets[0].index, ROUTED_ADAPTER_INDEX);
        assert_eq!(vm.serials[0].emulated_type, PDT_USE_SERIAL_PORT_SOCKET_MODE);
    }
}
