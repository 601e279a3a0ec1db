//! Vendor SDK seam.
//!
//! [`Sdk`] mirrors the entry points of the Parallels Virtualization SDK that
//! the adapter consumes. Every call returns the vendor's 32-bit result code on
//! failure; objects are referenced through opaque [`RawHandle`]s which must be
//! released with [`Sdk::handle_free`] (see [`crate::handle::Handle`]).

use std::fmt;
use std::time::Duration;

/// Vendor result code (`PRL_RESULT`).
pub type ResultCode = u32;

/// Result of a single vendor call.
pub type SdkResult<T> = std::result::Result<T, ResultCode>;

/// Opaque vendor object reference (`PRL_HANDLE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawHandle(pub u64);

impl RawHandle {
    /// The null handle (`PRL_INVALID_HANDLE`).
    pub const INVALID: RawHandle = RawHandle(0);

    pub fn is_invalid(self) -> bool {
        self == Self::INVALID
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// How `server_get_vm_config` interprets its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSearch {
    /// Brace-delimited UUID text.
    Uuid,
    /// Domain name.
    Name,
}

/// Vendor enumeration values.
pub mod consts {
    use super::ResultCode;

    // Result codes
    pub const PRL_ERR_SUCCESS: ResultCode = 0;
    pub const PRL_ERR_UNINITIALIZED: ResultCode = 0x8000_0001;
    pub const PRL_ERR_INVALID_ARG: ResultCode = 0x8000_0003;
    pub const PRL_ERR_INVALID_HANDLE: ResultCode = 0x8000_0004;
    pub const PRL_ERR_OUT_OF_MEMORY: ResultCode = 0x8000_0009;
    pub const PRL_ERR_TIMEOUT: ResultCode = 0x8000_0013;
    pub const PRL_ERR_NO_DATA: ResultCode = 0x8000_0020;
    pub const PRL_ERR_OPERATION_FAILED: ResultCode = 0x8000_0029;
    pub const PRL_ERR_VM_UUID_NOT_FOUND: ResultCode = 0x8000_0401;
    pub const PRL_ERR_ACCESS_DENIED: ResultCode = 0x8000_0414;

    // VIRTUAL_MACHINE_STATE
    pub const VMS_UNKNOWN: u32 = 0;
    pub const VMS_STOPPED: u32 = 0x3000_0001;
    pub const VMS_STARTING: u32 = 0x3000_0002;
    pub const VMS_RESTORING: u32 = 0x3000_0003;
    pub const VMS_RUNNING: u32 = 0x3000_0004;
    pub const VMS_PAUSED: u32 = 0x3000_0005;
    pub const VMS_SUSPENDING: u32 = 0x3000_0006;
    pub const VMS_STOPPING: u32 = 0x3000_0007;
    pub const VMS_COMPACTING: u32 = 0x3000_0008;
    pub const VMS_SUSPENDED: u32 = 0x3000_0009;
    pub const VMS_SNAPSHOTING: u32 = 0x3000_000A;
    pub const VMS_RESETTING: u32 = 0x3000_000B;
    pub const VMS_PAUSING: u32 = 0x3000_000C;
    pub const VMS_CONTINUING: u32 = 0x3000_000D;
    pub const VMS_MIGRATING: u32 = 0x3000_000E;
    pub const VMS_DELETING_STATE: u32 = 0x3000_000F;
    pub const VMS_RESUMING: u32 = 0x3000_0010;
    pub const VMS_SUSPENDING_SYNC: u32 = 0x3000_0011;
    pub const VMS_RECONNECTING: u32 = 0x3000_0012;
    pub const VMS_MOUNTED: u32 = 0x3000_0013;

    // PRL_VM_TYPE
    pub const PVT_VM: u32 = 0;
    pub const PVT_CT: u32 = 1;

    // Filter flags for server_get_vm_list
    pub const PVTF_VM: u32 = 0x1;
    pub const PVTF_CT: u32 = 0x2;

    // PRL_CPU_MODE
    pub const PCM_CPU_MODE_32: u32 = 0;
    pub const PCM_CPU_MODE_64: u32 = 1;

    // PRL_VM_AUTOSTART_OPTION
    pub const PAO_VM_START_MANUAL: u32 = 0;
    pub const PAO_VM_START_ON_LOAD: u32 = 1;
    pub const PAO_VM_START_ON_GUI_VM_START: u32 = 2;

    // PRL_VM_DEV_EMULATION_TYPE
    pub const PDT_USE_REAL_DEVICE: u32 = 0;
    pub const PDT_USE_IMAGE_FILE: u32 = 1;
    pub const PDT_USE_OUTPUT_FILE: u32 = 2;
    pub const PDT_USE_TCP: u32 = 3;
    pub const PDT_USE_SERIAL_PORT_SOCKET_MODE: u32 = 4;

    // PRL_MASS_STORAGE_INTERFACE_TYPE
    pub const PMS_IDE_DEVICE: u32 = 0;
    pub const PMS_SCSI_DEVICE: u32 = 1;
    pub const PMS_SATA_DEVICE: u32 = 2;

    // PRL_NET_ADAPTER_EMULATED_TYPE
    pub const PNA_HOST_ONLY: u32 = 0;
    pub const PNA_SHARED: u32 = 1;
    pub const PNA_BRIDGED_ETHERNET: u32 = 2;
    pub const PNA_ROUTED: u32 = 3;

    // PRL_VM_REMOTE_DISPLAY_MODE
    pub const PRD_DISABLED: u32 = 0;
    pub const PRD_MANUAL: u32 = 1;
    pub const PRD_AUTO: u32 = 2;

    /// Device index reported for a container's routed (venet) adapter.
    pub const ROUTED_ADAPTER_INDEX: u32 = u32::MAX;
}

/// Parallels Virtualization SDK entry points used by the adapter.
///
/// Calls that start an asynchronous operation return a job handle; see
/// [`crate::job::JobRunner`] for the completion protocol. Every handle
/// returned by a method is owned by the caller.
pub trait Sdk: Send + Sync {
    // =========================================================================
    // API lifetime
    // =========================================================================

    fn api_init(&self) -> SdkResult<()>;

    fn api_deinit(&self);

    /// Human-readable description of a result code, short or long form.
    fn result_description(&self, code: ResultCode, brief: bool) -> String;

    // =========================================================================
    // Handles
    // =========================================================================

    fn handle_add_ref(&self, handle: RawHandle) -> SdkResult<()>;

    /// Drop one reference. Freeing [`RawHandle::INVALID`] is a no-op.
    fn handle_free(&self, handle: RawHandle) -> SdkResult<()>;

    // =========================================================================
    // Server (each returns a job handle)
    // =========================================================================

    fn server_create(&self) -> SdkResult<RawHandle>;

    fn server_login_local(&self, server: RawHandle) -> SdkResult<RawHandle>;

    fn server_logoff(&self, server: RawHandle) -> SdkResult<RawHandle>;

    fn server_get_vm_list(&self, server: RawHandle, flags: u32) -> SdkResult<RawHandle>;

    fn server_get_vm_config(
        &self,
        server: RawHandle,
        id: &str,
        search: ConfigSearch,
    ) -> SdkResult<RawHandle>;

    // =========================================================================
    // Jobs, events and results
    // =========================================================================

    /// Block until the job completes. `None` waits forever.
    fn job_wait(&self, job: RawHandle, timeout: Option<Duration>) -> SdkResult<()>;

    fn job_ret_code(&self, job: RawHandle) -> SdkResult<ResultCode>;

    fn job_result(&self, job: RawHandle) -> SdkResult<RawHandle>;

    /// Error event attached to a failed job.
    fn job_error(&self, job: RawHandle) -> SdkResult<RawHandle>;

    fn event_err_code(&self, event: RawHandle) -> SdkResult<ResultCode>;

    fn event_err_string(&self, event: RawHandle, brief: bool) -> SdkResult<String>;

    fn result_params_count(&self, result: RawHandle) -> SdkResult<u32>;

    fn result_param_by_index(&self, result: RawHandle, index: u32) -> SdkResult<RawHandle>;

    // =========================================================================
    // Runtime state
    // =========================================================================

    /// Job whose first result parameter is a VM info object.
    fn vm_get_state(&self, vm: RawHandle) -> SdkResult<RawHandle>;

    fn vm_info_state(&self, info: RawHandle) -> SdkResult<u32>;

    // =========================================================================
    // VM configuration getters
    // =========================================================================

    fn vm_cfg_name(&self, vm: RawHandle) -> SdkResult<String>;

    /// Brace-delimited UUID text.
    fn vm_cfg_uuid(&self, vm: RawHandle) -> SdkResult<String>;

    /// RAM size in MiB.
    fn vm_cfg_ram_size(&self, vm: RawHandle) -> SdkResult<u32>;

    fn vm_cfg_cpu_count(&self, vm: RawHandle) -> SdkResult<u32>;

    fn vm_cfg_cpu_mask(&self, vm: RawHandle) -> SdkResult<String>;

    fn vm_cfg_cpu_mode(&self, vm: RawHandle) -> SdkResult<u32>;

    fn vm_cfg_vm_type(&self, vm: RawHandle) -> SdkResult<u32>;

    /// Video memory in MiB.
    fn vm_cfg_video_ram_size(&self, vm: RawHandle) -> SdkResult<u32>;

    fn vm_cfg_hard_disks_count(&self, vm: RawHandle) -> SdkResult<u32>;

    fn vm_cfg_hard_disk(&self, vm: RawHandle, index: u32) -> SdkResult<RawHandle>;

    fn vm_cfg_net_adapters_count(&self, vm: RawHandle) -> SdkResult<u32>;

    fn vm_cfg_net_adapter(&self, vm: RawHandle, index: u32) -> SdkResult<RawHandle>;

    fn vm_cfg_serial_ports_count(&self, vm: RawHandle) -> SdkResult<u32>;

    fn vm_cfg_serial_port(&self, vm: RawHandle, index: u32) -> SdkResult<RawHandle>;

    fn vm_cfg_vnc_mode(&self, vm: RawHandle) -> SdkResult<u32>;

    fn vm_cfg_vnc_port(&self, vm: RawHandle) -> SdkResult<u32>;

    fn vm_cfg_vnc_host_name(&self, vm: RawHandle) -> SdkResult<String>;

    fn vm_cfg_env_id(&self, vm: RawHandle) -> SdkResult<u32>;

    fn vm_cfg_home_path(&self, vm: RawHandle) -> SdkResult<String>;

    fn vm_cfg_auto_start(&self, vm: RawHandle) -> SdkResult<u32>;

    // =========================================================================
    // Device getters (disks, adapters, serial ports)
    // =========================================================================

    fn dev_emulated_type(&self, dev: RawHandle) -> SdkResult<u32>;

    fn dev_friendly_name(&self, dev: RawHandle) -> SdkResult<String>;

    fn dev_iface_type(&self, dev: RawHandle) -> SdkResult<u32>;

    fn dev_stack_index(&self, dev: RawHandle) -> SdkResult<u32>;

    fn dev_index(&self, dev: RawHandle) -> SdkResult<u32>;

    fn dev_is_connected(&self, dev: RawHandle) -> SdkResult<bool>;

    fn net_host_interface_name(&self, dev: RawHandle) -> SdkResult<String>;

    fn net_mac_canonical(&self, dev: RawHandle) -> SdkResult<String>;

    fn net_virtual_network_id(&self, dev: RawHandle) -> SdkResult<String>;
}
