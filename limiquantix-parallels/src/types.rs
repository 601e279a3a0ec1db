//! Domain definition types populated by the adapter.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::PrlError;

/// Well-known network name for routed adapters.
pub const ROUTED_NETWORK_NAME: &str = "Routed";

/// Init path for container domains.
pub const CONTAINER_INIT: &str = "/sbin/init";

// =============================================================================
// DOMAIN DEFINITION
// =============================================================================

/// Structured description of one domain, rebuilt on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainDef {
    pub name: String,
    pub uuid: Uuid,
    /// Runtime id while the domain is active
    pub id: Option<u32>,
    pub virt_type: VirtType,
    pub memory: MemoryDef,
    pub vcpus: u32,
    pub max_vcpus: u32,
    pub os: OsDef,
    pub on_reboot: LifecycleAction,
    pub on_poweroff: LifecycleAction,
    pub on_crash: LifecycleAction,
    pub disks: Vec<DiskDef>,
    pub nets: Vec<NetDef>,
    pub serials: Vec<SerialDef>,
    pub videos: Vec<VideoDef>,
    pub graphics: Vec<GraphicsDef>,
}

impl DomainDef {
    /// Empty definition with the fixed Parallels defaults.
    pub fn new(name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            uuid,
            id: None,
            virt_type: VirtType::Parallels,
            memory: MemoryDef::default(),
            vcpus: 0,
            max_vcpus: 0,
            os: OsDef::default(),
            on_reboot: LifecycleAction::Restart,
            on_poweroff: LifecycleAction::Destroy,
            on_crash: LifecycleAction::Destroy,
            disks: Vec::new(),
            nets: Vec::new(),
            serials: Vec::new(),
            videos: Vec::new(),
            graphics: Vec::new(),
        }
    }

    pub fn is_container(&self) -> bool {
        self.os.os_type == OsType::Exe
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VirtType {
    Parallels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Destroy,
    Restart,
}

/// Memory sizes in KiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MemoryDef {
    pub max_balloon_kib: u64,
    pub cur_balloon_kib: u64,
}

impl MemoryDef {
    /// Both balloons set from a MiB figure.
    pub fn from_mib(mib: u32) -> Self {
        let kib = mib_to_kib(mib);
        Self {
            max_balloon_kib: kib,
            cur_balloon_kib: kib,
        }
    }
}

pub(crate) fn mib_to_kib(mib: u32) -> u64 {
    u64::from(mib) << 10
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct OsDef {
    pub os_type: OsType,
    pub init: Option<String>,
    pub arch: Arch,
}

/// Domain category: full virtual machine or container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    #[default]
    Hvm,
    Exe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Arch {
    #[serde(rename = "i686")]
    I686,
    #[default]
    #[serde(rename = "x86_64")]
    X86_64,
}

// =============================================================================
// DEVICES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskDef {
    pub storage: StorageType,
    pub format: Option<DiskFormat>,
    /// Image path or device node
    pub source: String,
    pub bus: DiskBus,
    /// Guest target name (`sda`, `sdb`, ...)
    pub target: String,
    pub address: DriveAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    File,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    Ploop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskBus {
    Ide,
    Scsi,
    Sata,
}

/// Drive address keyed by the vendor stack position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriveAddress {
    pub target: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetDef {
    /// Host-side interface name
    pub ifname: String,
    /// Absent for a container's routed adapter
    pub mac: Option<MacAddr>,
    /// Bound virtual network
    pub network: String,
    pub link_state: LinkState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialDef {
    pub port: u32,
    pub source: CharSource,
}

/// Backend of a serial port; each variant carries the vendor's friendly name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "path", rename_all = "lowercase")]
pub enum CharSource {
    File(String),
    Unix(String),
    Dev(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoDef {
    pub model: VideoModel,
    pub vram_kib: u64,
    pub heads: u32,
    pub accel: VideoAccel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoModel {
    Vga,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VideoAccel {
    pub accel2d: bool,
    pub accel3d: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GraphicsDef {
    Vnc {
        port: u32,
        autoport: bool,
        listens: Vec<GraphicsListen>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "address", rename_all = "lowercase")]
pub enum GraphicsListen {
    Address(String),
}

// =============================================================================
// MAC ADDRESS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl FromStr for MacAddr {
    type Err = PrlError;

    /// Accepts `XX:XX:XX:XX:XX:XX` or `XX-XX-XX-XX-XX-XX`, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PrlError::InvalidData(format!("malformed MAC address '{}'", s));

        let mut bytes = [0u8; 6];
        let mut parts = s.split(|c: char| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// =============================================================================
// LIFECYCLE STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainState {
    #[default]
    NoState,
    Running,
    Paused,
    /// Shutdown in progress
    Shutdown,
    Shutoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateReason {
    #[default]
    Unknown,
    Booted,
    Restored,
    Unpaused,
    User,
    Snapshot,
    Migration,
    Save,
    Shutdown,
    Saved,
}

/// Lifecycle state plus the reason tag explaining it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Lifecycle {
    pub state: DomainState,
    pub reason: StateReason,
}

impl Lifecycle {
    pub const fn new(state: DomainState, reason: StateReason) -> Self {
        Self { state, reason }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            DomainState::Running | DomainState::Paused | DomainState::Shutdown
        )
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.state, self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_and_display() {
        let mac: MacAddr = "00:1C:42:AB:cd:0F".parse().unwrap();
        assert_eq!(mac.0, [0x00, 0x1c, 0x42, 0xab, 0xcd, 0x0f]);
        assert_eq!(mac.to_string(), "00:1c:42:ab:cd:0f");

        let dashed: MacAddr = "00-1c-42-ab-cd-0f".parse().unwrap();
        assert_eq!(dashed, mac);
    }

    #[test]
    fn test_mac_parse_rejects_garbage() {
        for bad in ["", "00:1c:42:ab:cd", "00:1c:42:ab:cd:0f:11", "001c42abcd0f", "zz:1c:42:ab:cd:0f", "0:1c:42:ab:cd:0f"] {
            assert!(bad.parse::<MacAddr>().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_memory_from_mib() {
        let mem = MemoryDef::from_mib(2048);
        assert_eq!(mem.max_balloon_kib, 2048 * 1024);
        assert_eq!(mem.cur_balloon_kib, mem.max_balloon_kib);
    }

    #[test]
    fn test_new_definition_defaults() {
        let def = DomainDef::new("web-01", Uuid::nil());
        assert_eq!(def.virt_type, VirtType::Parallels);
        assert_eq!(def.on_reboot, LifecycleAction::Restart);
        assert_eq!(def.on_poweroff, LifecycleAction::Destroy);
        assert_eq!(def.on_crash, LifecycleAction::Destroy);
        assert_eq!(def.id, None);
        assert!(!def.is_container());
    }

    #[test]
    fn test_serialized_shape() {
        let serial = SerialDef { port: 0, source: CharSource::Unix("/tmp/s0".into()) };
        let json = serde_json::to_value(&serial).unwrap();
        assert_eq!(json["source"]["type"], "unix");
        assert_eq!(json["source"]["path"], "/tmp/s0");
    }
}
