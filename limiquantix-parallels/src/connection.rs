//! Connection lifecycle against the vendor SDK.
//!
//! A [`Connection`] initialises the SDK, logs in to the local dispatcher and
//! owns the resulting server handle together with the job timeout. It is
//! passed explicitly to every operation; teardown happens on
//! [`Connection::close`] or when the value is dropped.
//!
//! Every handle acquired through a connection keeps the SDK session alive.
//! The API is deinitialised once the connection and the last such handle are
//! gone, so a record still held by a caller at close time releases its
//! configuration handle against a live SDK.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SdkResultExt};
use crate::handle::Handle;
use crate::host::HostInfo;
use crate::job::JobRunner;
use crate::sdk::{ConfigSearch, RawHandle, ResultCode, Sdk, SdkResult};

/// Connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Job wait timeout in milliseconds; unset waits indefinitely.
    pub job_timeout_ms: Option<u64>,
}

impl ConnectionConfig {
    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_ms.map(Duration::from_millis)
    }
}

/// Logged-in session with the vendor dispatcher.
pub struct Connection {
    sdk: Arc<dyn Sdk>,
    host: Arc<dyn HostInfo>,
    server: Handle,
    jobs: JobRunner,
    open: bool,
}

impl Connection {
    /// Initialise the SDK, create a server object and log in locally.
    ///
    /// On failure everything acquired so far is released and the SDK is
    /// deinitialised again.
    pub fn open(
        sdk: Arc<dyn Sdk>,
        host: Arc<dyn HostInfo>,
        config: &ConnectionConfig,
    ) -> Result<Self> {
        info!(job_timeout = ?config.job_timeout(), "Connecting to Parallels dispatcher");

        sdk.api_init().or_vendor_err(sdk.as_ref())?;
        let sdk: Arc<dyn Sdk> = Arc::new(Session { inner: sdk });

        let jobs = JobRunner::new(Arc::clone(&sdk), config.job_timeout());

        let login = Handle::acquire(&sdk, sdk.server_create()).and_then(|server| {
            jobs.wait(|s| s.server_login_local(server.raw()))?;
            Ok(server)
        });

        // on failure the session drops here and deinitialises the API
        let server = login?;

        info!(server = %server.raw(), "Connected to Parallels dispatcher");

        Ok(Self {
            sdk,
            host,
            server,
            jobs,
            open: true,
        })
    }

    pub fn sdk(&self) -> &Arc<dyn Sdk> {
        &self.sdk
    }

    pub fn server(&self) -> &Handle {
        &self.server
    }

    pub fn jobs(&self) -> &JobRunner {
        &self.jobs
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.jobs.timeout()
    }

    pub fn host_cpu_count(&self) -> Result<usize> {
        self.host.logical_cpu_count()
    }

    /// Log off and release the server handle. The SDK is deinitialised as
    /// soon as no handle acquired through this connection is left.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        let server = self.server.raw();
        if let Err(fault) = self.jobs.wait(|s| s.server_logoff(server)) {
            warn!(error = %fault, "Logoff failed");
        }
        self.server.release();

        info!("Disconnected from Parallels dispatcher");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("server", &self.server)
            .field("job_timeout", &self.jobs.timeout())
            .field("open", &self.open)
            .finish()
    }
}

/// Initialised SDK shared by a connection and every handle acquired through
/// it. Dropping the last reference deinitialises the API.
struct Session {
    inner: Arc<dyn Sdk>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.api_deinit();
        debug!("Parallels SDK deinitialised");
    }
}

macro_rules! forward {
    ($($name:ident($($arg:ident: $ty:ty),*) -> $ret:ty;)*) => {
        $(
            fn $name(&self, $($arg: $ty),*) -> $ret {
                self.inner.$name($($arg),*)
            }
        )*
    };
}

impl Sdk for Session {
    fn api_init(&self) -> SdkResult<()> {
        Ok(())
    }

    // deinit happens when the session drops
    fn api_deinit(&self) {}

    forward! {
        result_description(code: ResultCode, brief: bool) -> String;
        handle_add_ref(handle: RawHandle) -> SdkResult<()>;
        handle_free(handle: RawHandle) -> SdkResult<()>;
        server_create() -> SdkResult<RawHandle>;
        server_login_local(server: RawHandle) -> SdkResult<RawHandle>;
        server_logoff(server: RawHandle) -> SdkResult<RawHandle>;
        server_get_vm_list(server: RawHandle, flags: u32) -> SdkResult<RawHandle>;
        server_get_vm_config(server: RawHandle, id: &str, search: ConfigSearch) -> SdkResult<RawHandle>;
        job_wait(job: RawHandle, timeout: Option<Duration>) -> SdkResult<()>;
        job_ret_code(job: RawHandle) -> SdkResult<ResultCode>;
        job_result(job: RawHandle) -> SdkResult<RawHandle>;
        job_error(job: RawHandle) -> SdkResult<RawHandle>;
        event_err_code(event: RawHandle) -> SdkResult<ResultCode>;
        event_err_string(event: RawHandle, brief: bool) -> SdkResult<String>;
        result_params_count(result: RawHandle) -> SdkResult<u32>;
        result_param_by_index(result: RawHandle, index: u32) -> SdkResult<RawHandle>;
        vm_get_state(vm: RawHandle) -> SdkResult<RawHandle>;
        vm_info_state(info: RawHandle) -> SdkResult<u32>;
        vm_cfg_name(vm: RawHandle) -> SdkResult<String>;
        vm_cfg_uuid(vm: RawHandle) -> SdkResult<String>;
        vm_cfg_ram_size(vm: RawHandle) -> SdkResult<u32>;
        vm_cfg_cpu_count(vm: RawHandle) -> SdkResult<u32>;
        vm_cfg_cpu_mask(vm: RawHandle) -> SdkResult<String>;
        vm_cfg_cpu_mode(vm: RawHandle) -> SdkResult<u32>;
        vm_cfg_vm_type(vm: RawHandle) -> SdkResult<u32>;
        vm_cfg_video_ram_size(vm: RawHandle) -> SdkResult<u32>;
        vm_cfg_hard_disks_count(vm: RawHandle) -> SdkResult<u32>;
        vm_cfg_hard_disk(vm: RawHandle, index: u32) -> SdkResult<RawHandle>;
        vm_cfg_net_adapters_count(vm: RawHandle) -> SdkResult<u32>;
        vm_cfg_net_adapter(vm: RawHandle, index: u32) -> SdkResult<RawHandle>;
        vm_cfg_serial_ports_count(vm: RawHandle) -> SdkResult<u32>;
        vm_cfg_serial_port(vm: RawHandle, index: u32) -> SdkResult<RawHandle>;
        vm_cfg_vnc_mode(vm: RawHandle) -> SdkResult<u32>;
        vm_cfg_vnc_port(vm: RawHandle) -> SdkResult<u32>;
        vm_cfg_vnc_host_name(vm: RawHandle) -> SdkResult<String>;
        vm_cfg_env_id(vm: RawHandle) -> SdkResult<u32>;
        vm_cfg_home_path(vm: RawHandle) -> SdkResult<String>;
        vm_cfg_auto_start(vm: RawHandle) -> SdkResult<u32>;
        dev_emulated_type(dev: RawHandle) -> SdkResult<u32>;
        dev_friendly_name(dev: RawHandle) -> SdkResult<String>;
        dev_iface_type(dev: RawHandle) -> SdkResult<u32>;
        dev_stack_index(dev: RawHandle) -> SdkResult<u32>;
        dev_index(dev: RawHandle) -> SdkResult<u32>;
        dev_is_connected(dev: RawHandle) -> SdkResult<bool>;
        net_host_interface_name(dev: RawHandle) -> SdkResult<String>;
        net_mac_canonical(dev: RawHandle) -> SdkResult<String>;
        net_virtual_network_id(dev: RawHandle) -> SdkResult<String>;
    }
}
