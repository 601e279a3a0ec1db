//! Assembly of a domain's hardware description from its configuration handle.
//!
//! Each device collection is walked index by index. Device handles are
//! released as soon as the device has been translated, and a collection is
//! appended to the definition only once every entry in it translated cleanly.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{PrlError, Result, SdkResultExt};
use crate::handle::Handle;
use crate::sdk::consts::*;
use crate::sdk::{RawHandle, Sdk, SdkResult};
use crate::types::*;

/// Guest disk name for a zero-based index: `sda`, ..., `sdz`, `sdaa`, ...
pub fn disk_name(index: u32, prefix: &str) -> String {
    let mut suffix = Vec::new();
    let mut idx = i64::from(index);
    while idx >= 0 {
        suffix.push(b'a' + (idx % 26) as u8);
        idx = idx / 26 - 1;
    }
    suffix.reverse();

    let mut name = String::with_capacity(prefix.len() + suffix.len());
    name.push_str(prefix);
    name.extend(suffix.into_iter().map(char::from));
    name
}

/// Map the vendor interface type of a disk to a bus.
pub fn map_disk_bus(iface_type: u32) -> Result<DiskBus> {
    match iface_type {
        PMS_IDE_DEVICE => Ok(DiskBus::Ide),
        PMS_SCSI_DEVICE => Ok(DiskBus::Scsi),
        PMS_SATA_DEVICE => Ok(DiskBus::Sata),
        other => Err(PrlError::unrecognized("disk bus", other)),
    }
}

/// Map a serial port's emulation type to its character source.
pub fn map_serial_source(emulated_type: u32, path: String) -> Result<CharSource> {
    match emulated_type {
        PDT_USE_OUTPUT_FILE => Ok(CharSource::File(path)),
        PDT_USE_SERIAL_PORT_SOCKET_MODE => Ok(CharSource::Unix(path)),
        PDT_USE_REAL_DEVICE => Ok(CharSource::Dev(path)),
        other => Err(PrlError::unrecognized("serial type", other)),
    }
}

/// Remote display mode. `None` when the display is disabled.
pub fn map_vnc_autoport(mode: u32) -> Result<Option<bool>> {
    match mode {
        PRD_DISABLED => Ok(None),
        PRD_MANUAL => Ok(Some(false)),
        PRD_AUTO => Ok(Some(true)),
        other => Err(PrlError::unrecognized("remote display mode", other)),
    }
}

/// Empty list with room for a vendor-reported number of devices.
fn reserve_devices<T>(count: u32, what: &str) -> Result<Vec<T>> {
    let mut devices = Vec::new();
    devices
        .try_reserve_exact(count as usize)
        .map_err(|e| PrlError::AllocationFailed(format!("{} {}: {}", count, what, e)))?;
    Ok(devices)
}

/// Builds device descriptors from a vendor configuration handle.
pub struct HardwareAssembler<'a> {
    sdk: &'a Arc<dyn Sdk>,
}

impl<'a> HardwareAssembler<'a> {
    pub fn new(sdk: &'a Arc<dyn Sdk>) -> Self {
        Self { sdk }
    }

    fn sdk(&self) -> &dyn Sdk {
        self.sdk.as_ref()
    }

    /// Video, disks, network adapters and serial ports, in that order.
    pub fn add_hardware(&self, vm: &Handle, def: &mut DomainDef) -> Result<()> {
        if !def.is_container() {
            self.add_video(vm, def)?;
        }
        self.add_disks(vm, def)?;
        self.add_nets(vm, def)?;
        self.add_serials(vm, def)?;
        Ok(())
    }

    /// One VGA adapter sized from the vendor's video RAM.
    pub fn add_video(&self, vm: &Handle, def: &mut DomainDef) -> Result<()> {
        let vram_mib = self.sdk().vm_cfg_video_ram_size(vm.raw()).or_vendor_err(self.sdk())?;

        def.videos.push(VideoDef {
            model: VideoModel::Vga,
            vram_kib: mib_to_kib(vram_mib),
            heads: 1,
            accel: VideoAccel::default(),
        });
        Ok(())
    }

    pub fn add_disks(&self, vm: &Handle, def: &mut DomainDef) -> Result<()> {
        let count = self.sdk().vm_cfg_hard_disks_count(vm.raw()).or_vendor_err(self.sdk())?;
        let is_ct = def.is_container();

        let mut disks = reserve_devices(count, "disks")?;
        for i in 0..count {
            let hdd = self.device(|s| s.vm_cfg_hard_disk(vm.raw(), i))?;
            if is_ct {
                warn!(domain = %def.name, index = i, "Skipping disk information for container");
                continue;
            }
            disks.push(self.disk_info(&hdd)?);
        }

        debug!(domain = %def.name, count = disks.len(), "Disks translated");
        def.disks.extend(disks);
        Ok(())
    }

    fn disk_info(&self, hdd: &Handle) -> Result<DiskDef> {
        let sdk = self.sdk();

        let emulated = sdk.dev_emulated_type(hdd.raw()).or_vendor_err(sdk)?;
        let (storage, format) = if emulated == PDT_USE_IMAGE_FILE {
            (StorageType::File, Some(DiskFormat::Ploop))
        } else {
            (StorageType::Block, None)
        };

        let source = sdk.dev_friendly_name(hdd.raw()).or_vendor_err(sdk)?;
        let bus = map_disk_bus(sdk.dev_iface_type(hdd.raw()).or_vendor_err(sdk)?)?;
        let stack_index = sdk.dev_stack_index(hdd.raw()).or_vendor_err(sdk)?;
        let index = sdk.dev_index(hdd.raw()).or_vendor_err(sdk)?;

        Ok(DiskDef {
            storage,
            format,
            source,
            bus,
            target: disk_name(index, "sd"),
            address: DriveAddress { target: stack_index },
        })
    }

    pub fn add_nets(&self, vm: &Handle, def: &mut DomainDef) -> Result<()> {
        let count = self.sdk().vm_cfg_net_adapters_count(vm.raw()).or_vendor_err(self.sdk())?;
        let is_ct = def.is_container();

        let mut nets = reserve_devices(count, "network adapters")?;
        for i in 0..count {
            let adapter = self.device(|s| s.vm_cfg_net_adapter(vm.raw(), i))?;
            nets.push(self.net_info(&adapter, is_ct)?);
        }

        debug!(domain = %def.name, count = nets.len(), "Network adapters translated");
        def.nets.extend(nets);
        Ok(())
    }

    fn net_info(&self, adapter: &Handle, is_ct: bool) -> Result<NetDef> {
        let sdk = self.sdk();

        let index = sdk.dev_index(adapter.raw()).or_vendor_err(sdk)?;
        let ifname = sdk.net_host_interface_name(adapter.raw()).or_vendor_err(sdk)?;

        if is_ct && index == ROUTED_ADAPTER_INDEX {
            // venet: no MAC, always up
            return Ok(NetDef {
                ifname,
                mac: None,
                network: ROUTED_NETWORK_NAME.to_string(),
                link_state: LinkState::Up,
            });
        }

        let mac: MacAddr = sdk.net_mac_canonical(adapter.raw()).or_vendor_err(sdk)?.parse()?;

        let emulated = sdk.dev_emulated_type(adapter.raw()).or_vendor_err(sdk)?;
        let network = if emulated == PNA_ROUTED {
            ROUTED_NETWORK_NAME.to_string()
        } else {
            sdk.net_virtual_network_id(adapter.raw()).or_vendor_err(sdk)?
        };

        let link_state = if sdk.dev_is_connected(adapter.raw()).or_vendor_err(sdk)? {
            LinkState::Up
        } else {
            LinkState::Down
        };

        Ok(NetDef {
            ifname,
            mac: Some(mac),
            network,
            link_state,
        })
    }

    pub fn add_serials(&self, vm: &Handle, def: &mut DomainDef) -> Result<()> {
        let count = self.sdk().vm_cfg_serial_ports_count(vm.raw()).or_vendor_err(self.sdk())?;

        let mut serials = reserve_devices(count, "serial ports")?;
        for i in 0..count {
            let port = self.device(|s| s.vm_cfg_serial_port(vm.raw(), i))?;
            serials.push(self.serial_info(&port)?);
        }

        def.serials.extend(serials);
        Ok(())
    }

    fn serial_info(&self, port: &Handle) -> Result<SerialDef> {
        let sdk = self.sdk();

        let index = sdk.dev_index(port.raw()).or_vendor_err(sdk)?;
        let emulated = sdk.dev_emulated_type(port.raw()).or_vendor_err(sdk)?;
        let path = sdk.dev_friendly_name(port.raw()).or_vendor_err(sdk)?;

        Ok(SerialDef {
            port: index,
            source: map_serial_source(emulated, path)?,
        })
    }

    /// VNC display, if enabled: exactly one graphics entry with one listen.
    pub fn add_vnc(&self, vm: &Handle, def: &mut DomainDef) -> Result<()> {
        let sdk = self.sdk();

        let mode = sdk.vm_cfg_vnc_mode(vm.raw()).or_vendor_err(sdk)?;
        let Some(autoport) = map_vnc_autoport(mode)? else {
            return Ok(());
        };

        let port = sdk.vm_cfg_vnc_port(vm.raw()).or_vendor_err(sdk)?;
        let address = sdk.vm_cfg_vnc_host_name(vm.raw()).or_vendor_err(sdk)?;

        def.graphics.push(GraphicsDef::Vnc {
            port,
            autoport,
            listens: vec![GraphicsListen::Address(address)],
        });
        Ok(())
    }

    #[track_caller]
    fn device<F>(&self, get: F) -> Result<Handle>
    where
        F: FnOnce(&dyn Sdk) -> SdkResult<RawHandle>,
    {
        Handle::acquire(self.sdk, get(self.sdk()))
    }
}
