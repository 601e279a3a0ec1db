//! Mock vendor SDK for testing and development.
//!
//! [`MockSdk`] keeps a set of VM configurations in memory and implements the
//! [`Sdk`] handle and job protocol on top of them. It tracks every live
//! handle so tests can assert that nothing leaked, and it can inject faults:
//! failing individual calls, failing whole jobs, and slowing jobs down to
//! trigger timeouts.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::sdk::consts::*;
use crate::sdk::{ConfigSearch, RawHandle, ResultCode, Sdk, SdkResult};
use crate::uuid_text::{format_braced, parse_braced};

// =============================================================================
// VM FIXTURES
// =============================================================================

/// One vendor-side VM or container.
#[derive(Debug, Clone, PartialEq)]
pub struct MockVm {
    pub name: String,
    pub uuid: Uuid,
    pub vm_type: u32,
    pub state: u32,
    pub env_id: u32,
    pub ram_mib: u32,
    pub cpu_count: u32,
    pub cpu_mask: String,
    pub cpu_mode: u32,
    pub autostart: u32,
    pub video_ram_mib: u32,
    pub home_path: String,
    pub vnc_mode: u32,
    pub vnc_port: u32,
    pub vnc_host: String,
    pub disks: Vec<MockDisk>,
    pub nets: Vec<MockNet>,
    pub serials: Vec<MockSerial>,
}

impl MockVm {
    /// Stopped 64-bit VM with 1 GiB RAM, 2 CPUs and no devices.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            home_path: format!("/vz/vmprivate/{}.pvm", name),
            name,
            uuid: Uuid::new_v4(),
            vm_type: PVT_VM,
            state: VMS_STOPPED,
            env_id: 0,
            ram_mib: 1024,
            cpu_count: 2,
            cpu_mask: String::new(),
            cpu_mode: PCM_CPU_MODE_64,
            autostart: PAO_VM_START_MANUAL,
            video_ram_mib: 32,
            vnc_mode: PRD_DISABLED,
            vnc_port: 0,
            vnc_host: String::new(),
            disks: Vec::new(),
            nets: Vec::new(),
            serials: Vec::new(),
        }
    }

    /// Stopped container.
    pub fn container(name: impl Into<String>) -> Self {
        let vm = Self::new(name);
        Self {
            vm_type: PVT_CT,
            video_ram_mib: 0,
            home_path: format!("/vz/private/{}", vm.name),
            ..vm
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn with_state(mut self, state: u32, env_id: u32) -> Self {
        self.state = state;
        self.env_id = env_id;
        self
    }

    pub fn with_memory(mut self, ram_mib: u32) -> Self {
        self.ram_mib = ram_mib;
        self
    }

    pub fn with_cpus(mut self, count: u32, mask: impl Into<String>) -> Self {
        self.cpu_count = count;
        self.cpu_mask = mask.into();
        self
    }

    pub fn with_cpu_mode(mut self, mode: u32) -> Self {
        self.cpu_mode = mode;
        self
    }

    pub fn with_autostart(mut self, mode: u32) -> Self {
        self.autostart = mode;
        self
    }

    pub fn with_video_ram(mut self, mib: u32) -> Self {
        self.video_ram_mib = mib;
        self
    }

    pub fn with_home(mut self, path: impl Into<String>) -> Self {
        self.home_path = path.into();
        self
    }

    pub fn with_vnc(mut self, mode: u32, port: u32, host: impl Into<String>) -> Self {
        self.vnc_mode = mode;
        self.vnc_port = port;
        self.vnc_host = host.into();
        self
    }

    pub fn with_disk(mut self, disk: MockDisk) -> Self {
        self.disks.push(disk);
        self
    }

    pub fn with_net(mut self, net: MockNet) -> Self {
        self.nets.push(net);
        self
    }

    pub fn with_serial(mut self, serial: MockSerial) -> Self {
        self.serials.push(serial);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockDisk {
    pub emulated_type: u32,
    pub friendly_name: String,
    pub iface_type: u32,
    pub stack_index: u32,
    pub index: u32,
}

impl MockDisk {
    /// Image-file backed disk.
    pub fn image(path: impl Into<String>, iface_type: u32, stack_index: u32, index: u32) -> Self {
        Self {
            emulated_type: PDT_USE_IMAGE_FILE,
            friendly_name: path.into(),
            iface_type,
            stack_index,
            index,
        }
    }

    /// Host block device.
    pub fn block(path: impl Into<String>, iface_type: u32, stack_index: u32, index: u32) -> Self {
        Self {
            emulated_type: PDT_USE_REAL_DEVICE,
            ..Self::image(path, iface_type, stack_index, index)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockNet {
    pub index: u32,
    pub host_ifname: String,
    pub mac: String,
    pub emulated_type: u32,
    pub virtual_network: String,
    pub connected: bool,
}

impl MockNet {
    pub fn bridged(
        index: u32,
        ifname: impl Into<String>,
        mac: impl Into<String>,
        network: impl Into<String>,
        connected: bool,
    ) -> Self {
        Self {
            index,
            host_ifname: ifname.into(),
            mac: mac.into(),
            emulated_type: PNA_BRIDGED_ETHERNET,
            virtual_network: network.into(),
            connected,
        }
    }

    /// Routed adapter of a VM; has a MAC but no virtual network.
    pub fn routed(index: u32, ifname: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            emulated_type: PNA_ROUTED,
            ..Self::bridged(index, ifname, mac, "", true)
        }
    }

    /// Container venet adapter: sentinel index, no MAC.
    pub fn venet(ifname: impl Into<String>) -> Self {
        Self::routed(ROUTED_ADAPTER_INDEX, ifname, "")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MockSerial {
    pub index: u32,
    pub emulated_type: u32,
    pub friendly_name: String,
}

impl MockSerial {
    pub fn new(index: u32, emulated_type: u32, path: impl Into<String>) -> Self {
        Self {
            index,
            emulated_type,
            friendly_name: path.into(),
        }
    }
}

// =============================================================================
// FAULT INJECTION
// =============================================================================

/// Error event attached to a failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockEvent {
    pub code: ResultCode,
    pub short: String,
    pub long: String,
}

impl MockEvent {
    pub fn new(code: ResultCode, short: impl Into<String>, long: impl Into<String>) -> Self {
        Self {
            code,
            short: short.into(),
            long: long.into(),
        }
    }
}

/// How an injected job failure completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub ret_code: ResultCode,
    pub event: Option<MockEvent>,
}

impl JobFailure {
    /// Failure whose error event restates the return code.
    pub fn code(ret_code: ResultCode) -> Self {
        let (short, long) = describe(ret_code);
        Self::with_event(ret_code, MockEvent::new(ret_code, short, long))
    }

    pub fn with_event(ret_code: ResultCode, event: MockEvent) -> Self {
        Self {
            ret_code,
            event: Some(event),
        }
    }

    /// Failure with no error event attached.
    pub fn without_event(ret_code: ResultCode) -> Self {
        Self {
            ret_code,
            event: None,
        }
    }
}

fn describe(code: ResultCode) -> (String, String) {
    let (short, long) = match code {
        PRL_ERR_SUCCESS => ("Success.", ""),
        PRL_ERR_UNINITIALIZED => ("API not initialized.", "Call the initialization routine first."),
        PRL_ERR_INVALID_ARG => ("Invalid argument.", "An argument passed to the call is not valid."),
        PRL_ERR_INVALID_HANDLE => ("Invalid handle.", "The handle is not valid or was already freed."),
        PRL_ERR_OUT_OF_MEMORY => ("Out of memory.", "Not enough memory to complete the operation."),
        PRL_ERR_TIMEOUT => ("Operation timed out.", "The job did not finish within the wait period."),
        PRL_ERR_NO_DATA => ("No data.", "The requested information is not available."),
        PRL_ERR_OPERATION_FAILED => ("Operation failed.", "The dispatcher could not complete the request."),
        PRL_ERR_VM_UUID_NOT_FOUND => ("Virtual machine not found.", "No virtual machine with this UUID is registered."),
        PRL_ERR_ACCESS_DENIED => ("Access denied.", "You do not have permission to perform this operation."),
        other => return (format!("Error {:#x}.", other), "Unknown error.".to_string()),
    };
    (short.to_string(), long.to_string())
}

// =============================================================================
// HANDLE TABLE
// =============================================================================

#[derive(Debug, Clone)]
enum Object {
    Server,
    Job { delay: Duration, plan: JobPlan },
    Result(Vec<Object>),
    Event(MockEvent),
    VmConfig(Box<MockVm>),
    VmInfo(u32),
    Disk(MockDisk),
    Net(MockNet),
    Serial(MockSerial),
}

#[derive(Debug, Clone)]
enum JobPlan {
    Succeeded(Vec<Object>),
    Failed(JobFailure),
}

struct Slot {
    refs: u32,
    object: Object,
}

#[derive(Default)]
struct MockState {
    next_handle: u64,
    handles: HashMap<u64, Slot>,
    vms: Vec<MockVm>,
    failing_calls: HashMap<String, ResultCode>,
    failing_jobs: HashMap<String, JobFailure>,
    reported_counts: HashMap<String, u32>,
    job_delay: Duration,
    initialized: bool,
    logged_in: bool,
    invalid_frees: usize,
}

impl MockState {
    fn check(&self, call: &str) -> SdkResult<()> {
        match self.failing_calls.get(call) {
            Some(code) => Err(*code),
            None => Ok(()),
        }
    }

    fn alloc(&mut self, object: Object) -> RawHandle {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.handles.insert(raw, Slot { refs: 1, object });
        RawHandle(raw)
    }

    fn get(&self, call: &str, handle: RawHandle) -> SdkResult<&Object> {
        self.check(call)?;
        self.handles
            .get(&handle.0)
            .map(|slot| &slot.object)
            .ok_or(PRL_ERR_INVALID_HANDLE)
    }

    fn vm(&self, uuid: &Uuid) -> Option<&MockVm> {
        self.vms.iter().find(|vm| vm.uuid == *uuid)
    }

    fn submit(&mut self, call: &str, job: &str, plan: JobPlan) -> SdkResult<RawHandle> {
        self.check(call)?;
        let plan = match self.failing_jobs.get(job) {
            Some(failure) => JobPlan::Failed(failure.clone()),
            None => plan,
        };
        let delay = self.job_delay;
        Ok(self.alloc(Object::Job { delay, plan }))
    }
}

/// In-memory vendor SDK.
pub struct MockSdk {
    state: Mutex<MockState>,
}

impl MockSdk {
    pub fn new() -> Self {
        info!("Creating mock Parallels SDK");
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Mock seeded with the given VMs.
    pub fn with_vms(vms: impl IntoIterator<Item = MockVm>) -> Self {
        let sdk = Self::new();
        sdk.state.lock().vms.extend(vms);
        sdk
    }

    pub fn add_vm(&self, vm: MockVm) {
        debug!(name = %vm.name, uuid = %vm.uuid, "Registering mock VM");
        self.state.lock().vms.push(vm);
    }

    pub fn remove_vm(&self, uuid: &Uuid) -> Option<MockVm> {
        let mut st = self.state.lock();
        let pos = st.vms.iter().position(|vm| vm.uuid == *uuid)?;
        Some(st.vms.remove(pos))
    }

    /// Mutate a registered VM in place. Returns false if it does not exist.
    pub fn update_vm(&self, uuid: &Uuid, f: impl FnOnce(&mut MockVm)) -> bool {
        let mut st = self.state.lock();
        match st.vms.iter_mut().find(|vm| vm.uuid == *uuid) {
            Some(vm) => {
                f(vm);
                true
            }
            None => false,
        }
    }

    pub fn vm_count(&self) -> usize {
        self.state.lock().vms.len()
    }

    /// Make every call to the named [`Sdk`] method fail with `code`.
    pub fn fail_call(&self, call: &str, code: ResultCode) {
        self.state.lock().failing_calls.insert(call.to_string(), code);
    }

    /// Make every job of the given kind fail.
    ///
    /// Kinds: `login`, `logoff`, `vm_list`, `vm_config`, `vm_state`.
    pub fn fail_job(&self, job: &str, failure: JobFailure) {
        self.state.lock().failing_jobs.insert(job.to_string(), failure);
    }

    /// Make the named device count getter report `count` regardless of the
    /// devices actually configured.
    pub fn report_count(&self, call: &str, count: u32) {
        self.state.lock().reported_counts.insert(call.to_string(), count);
    }

    pub fn clear_faults(&self) {
        let mut st = self.state.lock();
        st.failing_calls.clear();
        st.failing_jobs.clear();
        st.reported_counts.clear();
        st.job_delay = Duration::ZERO;
    }

    /// Time every subsequently submitted job takes to complete.
    pub fn set_job_delay(&self, delay: Duration) {
        self.state.lock().job_delay = delay;
    }

    /// Number of live handles, counting each reference.
    pub fn outstanding_handles(&self) -> usize {
        self.state
            .lock()
            .handles
            .values()
            .map(|slot| slot.refs as usize)
            .sum()
    }

    /// Frees of handles that were not live.
    pub fn invalid_frees(&self) -> usize {
        self.state.lock().invalid_frees
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.lock().logged_in
    }

    fn vm_cfg<T>(&self, call: &str, vm: RawHandle, f: impl FnOnce(&MockVm) -> T) -> SdkResult<T> {
        let st = self.state.lock();
        match st.get(call, vm)? {
            Object::VmConfig(cfg) => Ok(f(cfg)),
            _ => Err(PRL_ERR_INVALID_ARG),
        }
    }

    fn vm_cfg_count(&self, call: &str, vm: RawHandle, f: impl FnOnce(&MockVm) -> usize) -> SdkResult<u32> {
        let st = self.state.lock();
        let actual = match st.get(call, vm)? {
            Object::VmConfig(cfg) => f(cfg) as u32,
            _ => return Err(PRL_ERR_INVALID_ARG),
        };
        Ok(st.reported_counts.get(call).copied().unwrap_or(actual))
    }

    fn vm_cfg_device(
        &self,
        call: &str,
        vm: RawHandle,
        index: u32,
        pick: impl FnOnce(&MockVm, usize) -> Option<Object>,
    ) -> SdkResult<RawHandle> {
        let mut st = self.state.lock();
        let object = match st.get(call, vm)? {
            Object::VmConfig(cfg) => pick(cfg, index as usize).ok_or(PRL_ERR_INVALID_ARG)?,
            _ => return Err(PRL_ERR_INVALID_ARG),
        };
        Ok(st.alloc(object))
    }

    fn dev<T>(&self, call: &str, dev: RawHandle, f: impl FnOnce(&Object) -> Option<T>) -> SdkResult<T> {
        let st = self.state.lock();
        let object = st.get(call, dev)?;
        f(object).ok_or(PRL_ERR_INVALID_ARG)
    }

    fn job<T>(&self, call: &str, job: RawHandle, f: impl FnOnce(&JobPlan) -> SdkResult<T>) -> SdkResult<T> {
        let st = self.state.lock();
        match st.get(call, job)? {
            Object::Job { plan, .. } => f(plan),
            _ => Err(PRL_ERR_INVALID_ARG),
        }
    }

    fn require_server(st: &MockState, server: RawHandle) -> SdkResult<()> {
        match st.handles.get(&server.0) {
            Some(Slot { object: Object::Server, .. }) => Ok(()),
            _ => Err(PRL_ERR_INVALID_HANDLE),
        }
    }
}

impl Default for MockSdk {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(id: &str) -> JobPlan {
    JobPlan::Failed(JobFailure::with_event(
        PRL_ERR_VM_UUID_NOT_FOUND,
        MockEvent::new(
            PRL_ERR_VM_UUID_NOT_FOUND,
            "Virtual machine not found.",
            format!("The virtual machine '{}' could not be found.", id),
        ),
    ))
}

impl Sdk for MockSdk {
    fn api_init(&self) -> SdkResult<()> {
        let mut st = self.state.lock();
        st.check("api_init")?;
        st.initialized = true;
        Ok(())
    }

    fn api_deinit(&self) {
        self.state.lock().initialized = false;
    }

    fn result_description(&self, code: ResultCode, brief: bool) -> String {
        let (short, long) = describe(code);
        if brief {
            short
        } else {
            long
        }
    }

    fn handle_add_ref(&self, handle: RawHandle) -> SdkResult<()> {
        let mut st = self.state.lock();
        st.check("handle_add_ref")?;
        let slot = st.handles.get_mut(&handle.0).ok_or(PRL_ERR_INVALID_HANDLE)?;
        slot.refs += 1;
        Ok(())
    }

    fn handle_free(&self, handle: RawHandle) -> SdkResult<()> {
        if handle.is_invalid() {
            return Ok(());
        }
        let mut st = self.state.lock();
        let remaining = match st.handles.get_mut(&handle.0) {
            Some(slot) => {
                slot.refs -= 1;
                slot.refs
            }
            None => {
                st.invalid_frees += 1;
                return Err(PRL_ERR_INVALID_HANDLE);
            }
        };
        if remaining == 0 {
            st.handles.remove(&handle.0);
        }
        Ok(())
    }

    fn server_create(&self) -> SdkResult<RawHandle> {
        let mut st = self.state.lock();
        st.check("server_create")?;
        Ok(st.alloc(Object::Server))
    }

    fn server_login_local(&self, server: RawHandle) -> SdkResult<RawHandle> {
        let mut st = self.state.lock();
        Self::require_server(&st, server)?;
        let job = st.submit("server_login_local", "login", JobPlan::Succeeded(Vec::new()))?;
        st.logged_in = !st.failing_jobs.contains_key("login");
        Ok(job)
    }

    fn server_logoff(&self, server: RawHandle) -> SdkResult<RawHandle> {
        let mut st = self.state.lock();
        Self::require_server(&st, server)?;
        let job = st.submit("server_logoff", "logoff", JobPlan::Succeeded(Vec::new()))?;
        if !st.failing_jobs.contains_key("logoff") {
            st.logged_in = false;
        }
        Ok(job)
    }

    fn server_get_vm_list(&self, server: RawHandle, flags: u32) -> SdkResult<RawHandle> {
        let mut st = self.state.lock();
        Self::require_server(&st, server)?;
        let configs = st
            .vms
            .iter()
            .filter(|vm| match vm.vm_type {
                PVT_VM => flags & PVTF_VM != 0,
                PVT_CT => flags & PVTF_CT != 0,
                _ => true,
            })
            .map(|vm| Object::VmConfig(Box::new(vm.clone())))
            .collect();
        st.submit("server_get_vm_list", "vm_list", JobPlan::Succeeded(configs))
    }

    fn server_get_vm_config(
        &self,
        server: RawHandle,
        id: &str,
        search: ConfigSearch,
    ) -> SdkResult<RawHandle> {
        let mut st = self.state.lock();
        Self::require_server(&st, server)?;
        let found = match search {
            ConfigSearch::Uuid => parse_braced(id).ok().and_then(|uuid| st.vm(&uuid)).cloned(),
            ConfigSearch::Name => st.vms.iter().find(|vm| vm.name == id).cloned(),
        };
        let plan = match found {
            Some(vm) => JobPlan::Succeeded(vec![Object::VmConfig(Box::new(vm))]),
            None => not_found(id),
        };
        st.submit("server_get_vm_config", "vm_config", plan)
    }

    fn job_wait(&self, job: RawHandle, timeout: Option<Duration>) -> SdkResult<()> {
        let delay = match self.state.lock().get("job_wait", job)? {
            Object::Job { delay, .. } => *delay,
            _ => return Err(PRL_ERR_INVALID_ARG),
        };

        // sleep without the state lock

        match timeout {
            Some(limit) if delay > limit => {
                thread::sleep(limit);
                Err(PRL_ERR_TIMEOUT)
            }
            _ => {
                thread::sleep(delay);
                Ok(())
            }
        }
    }

    fn job_ret_code(&self, job: RawHandle) -> SdkResult<ResultCode> {
        self.job("job_ret_code", job, |plan| match plan {
            JobPlan::Succeeded(_) => Ok(PRL_ERR_SUCCESS),
            JobPlan::Failed(failure) => Ok(failure.ret_code),
        })
    }

    fn job_result(&self, job: RawHandle) -> SdkResult<RawHandle> {
        let params = self.job("job_result", job, |plan| match plan {
            JobPlan::Succeeded(params) => Ok(params.clone()),
            JobPlan::Failed(failure) => Err(failure.ret_code),
        })?;
        Ok(self.state.lock().alloc(Object::Result(params)))
    }

    fn job_error(&self, job: RawHandle) -> SdkResult<RawHandle> {
        let event = self.job("job_error", job, |plan| match plan {
            JobPlan::Failed(JobFailure { event: Some(event), .. }) => Ok(event.clone()),
            _ => Err(PRL_ERR_NO_DATA),
        })?;
        Ok(self.state.lock().alloc(Object::Event(event)))
    }

    fn event_err_code(&self, event: RawHandle) -> SdkResult<ResultCode> {
        self.dev("event_err_code", event, |object| match object {
            Object::Event(e) => Some(e.code),
            _ => None,
        })
    }

    fn event_err_string(&self, event: RawHandle, brief: bool) -> SdkResult<String> {
        self.dev("event_err_string", event, |object| match object {
            Object::Event(e) if brief => Some(e.short.clone()),
            Object::Event(e) => Some(e.long.clone()),
            _ => None,
        })
    }

    fn result_params_count(&self, result: RawHandle) -> SdkResult<u32> {
        self.dev("result_params_count", result, |object| match object {
            Object::Result(params) => Some(params.len() as u32),
            _ => None,
        })
    }

    fn result_param_by_index(&self, result: RawHandle, index: u32) -> SdkResult<RawHandle> {
        let param = self.dev("result_param_by_index", result, |object| match object {
            Object::Result(params) => params.get(index as usize).cloned(),
            _ => None,
        })?;
        Ok(self.state.lock().alloc(param))
    }

    fn vm_get_state(&self, vm: RawHandle) -> SdkResult<RawHandle> {
        let mut st = self.state.lock();
        let uuid = match st.get("vm_get_state", vm)? {
            Object::VmConfig(cfg) => cfg.uuid,
            _ => return Err(PRL_ERR_INVALID_ARG),
        };
        let plan = match st.vm(&uuid) {
            Some(live) => JobPlan::Succeeded(vec![Object::VmInfo(live.state)]),
            None => not_found(&format_braced(&uuid)),
        };
        st.submit("vm_get_state", "vm_state", plan)
    }

    fn vm_info_state(&self, info: RawHandle) -> SdkResult<u32> {
        self.dev("vm_info_state", info, |object| match object {
            Object::VmInfo(state) => Some(*state),
            _ => None,
        })
    }

    fn vm_cfg_name(&self, vm: RawHandle) -> SdkResult<String> {
        self.vm_cfg("vm_cfg_name", vm, |cfg| cfg.name.clone())
    }

    fn vm_cfg_uuid(&self, vm: RawHandle) -> SdkResult<String> {
        // The dispatcher reports UUIDs in upper case.
        self.vm_cfg("vm_cfg_uuid", vm, |cfg| format_braced(&cfg.uuid).to_uppercase())
    }

    fn vm_cfg_ram_size(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg("vm_cfg_ram_size", vm, |cfg| cfg.ram_mib)
    }

    fn vm_cfg_cpu_count(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg("vm_cfg_cpu_count", vm, |cfg| cfg.cpu_count)
    }

    fn vm_cfg_cpu_mask(&self, vm: RawHandle) -> SdkResult<String> {
        self.vm_cfg("vm_cfg_cpu_mask", vm, |cfg| cfg.cpu_mask.clone())
    }

    fn vm_cfg_cpu_mode(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg("vm_cfg_cpu_mode", vm, |cfg| cfg.cpu_mode)
    }

    fn vm_cfg_vm_type(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg("vm_cfg_vm_type", vm, |cfg| cfg.vm_type)
    }

    fn vm_cfg_video_ram_size(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg("vm_cfg_video_ram_size", vm, |cfg| cfg.video_ram_mib)
    }

    fn vm_cfg_hard_disks_count(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg_count("vm_cfg_hard_disks_count", vm, |cfg| cfg.disks.len())
    }

    fn vm_cfg_hard_disk(&self, vm: RawHandle, index: u32) -> SdkResult<RawHandle> {
        self.vm_cfg_device("vm_cfg_hard_disk", vm, index, |cfg, i| {
            cfg.disks.get(i).cloned().map(Object::Disk)
        })
    }

    fn vm_cfg_net_adapters_count(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg_count("vm_cfg_net_adapters_count", vm, |cfg| cfg.nets.len())
    }

    fn vm_cfg_net_adapter(&self, vm: RawHandle, index: u32) -> SdkResult<RawHandle> {
        self.vm_cfg_device("vm_cfg_net_adapter", vm, index, |cfg, i| {
            cfg.nets.get(i).cloned().map(Object::Net)
        })
    }

    fn vm_cfg_serial_ports_count(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg_count("vm_cfg_serial_ports_count", vm, |cfg| cfg.serials.len())
    }

    fn vm_cfg_serial_port(&self, vm: RawHandle, index: u32) -> SdkResult<RawHandle> {
        self.vm_cfg_device("vm_cfg_serial_port", vm, index, |cfg, i| {
            cfg.serials.get(i).cloned().map(Object::Serial)
        })
    }

    fn vm_cfg_vnc_mode(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg("vm_cfg_vnc_mode", vm, |cfg| cfg.vnc_mode)
    }

    fn vm_cfg_vnc_port(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg("vm_cfg_vnc_port", vm, |cfg| cfg.vnc_port)
    }

    fn vm_cfg_vnc_host_name(&self, vm: RawHandle) -> SdkResult<String> {
        self.vm_cfg("vm_cfg_vnc_host_name", vm, |cfg| cfg.vnc_host.clone())
    }

    fn vm_cfg_env_id(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg("vm_cfg_env_id", vm, |cfg| cfg.env_id)
    }

    fn vm_cfg_home_path(&self, vm: RawHandle) -> SdkResult<String> {
        self.vm_cfg("vm_cfg_home_path", vm, |cfg| cfg.home_path.clone())
    }

    fn vm_cfg_auto_start(&self, vm: RawHandle) -> SdkResult<u32> {
        self.vm_cfg("vm_cfg_auto_start", vm, |cfg| cfg.autostart)
    }

    fn dev_emulated_type(&self, dev: RawHandle) -> SdkResult<u32> {
        self.dev("dev_emulated_type", dev, |object| match object {
            Object::Disk(d) => Some(d.emulated_type),
            Object::Net(n) => Some(n.emulated_type),
            Object::Serial(s) => Some(s.emulated_type),
            _ => None,
        })
    }

    fn dev_friendly_name(&self, dev: RawHandle) -> SdkResult<String> {
        self.dev("dev_friendly_name", dev, |object| match object {
            Object::Disk(d) => Some(d.friendly_name.clone()),
            Object::Serial(s) => Some(s.friendly_name.clone()),
            _ => None,
        })
    }

    fn dev_iface_type(&self, dev: RawHandle) -> SdkResult<u32> {
        self.dev("dev_iface_type", dev, |object| match object {
            Object::Disk(d) => Some(d.iface_type),
            _ => None,
        })
    }

    fn dev_stack_index(&self, dev: RawHandle) -> SdkResult<u32> {
        self.dev("dev_stack_index", dev, |object| match object {
            Object::Disk(d) => Some(d.stack_index),
            _ => None,
        })
    }

    fn dev_index(&self, dev: RawHandle) -> SdkResult<u32> {
        self.dev("dev_index", dev, |object| match object {
            Object::Disk(d) => Some(d.index),
            Object::Net(n) => Some(n.index),
            Object::Serial(s) => Some(s.index),
            _ => None,
        })
    }

    fn dev_is_connected(&self, dev: RawHandle) -> SdkResult<bool> {
        self.dev("dev_is_connected", dev, |object| match object {
            Object::Net(n) => Some(n.connected),
            Object::Disk(_) | Object::Serial(_) => Some(true),
            _ => None,
        })
    }

    fn net_host_interface_name(&self, dev: RawHandle) -> SdkResult<String> {
        self.dev("net_host_interface_name", dev, |object| match object {
            Object::Net(n) => Some(n.host_ifname.clone()),
            _ => None,
        })
    }

    fn net_mac_canonical(&self, dev: RawHandle) -> SdkResult<String> {
        self.dev("net_mac_canonical", dev, |object| match object {
            Object::Net(n) => Some(n.mac.clone()),
            _ => None,
        })
    }

    fn net_virtual_network_id(&self, dev: RawHandle) -> SdkResult<String> {
        self.dev("net_virtual_network_id", dev, |object| match object {
            Object::Net(n) => Some(n.virtual_network.clone()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_reference_counted() {
        let sdk = MockSdk::new();
        let server = sdk.server_create().unwrap();
        sdk.handle_add_ref(server).unwrap();
        assert_eq!(sdk.outstanding_handles(), 2);

        sdk.handle_free(server).unwrap();
        sdk.handle_free(server).unwrap();
        assert_eq!(sdk.outstanding_handles(), 0);

        assert_eq!(sdk.handle_free(server), Err(PRL_ERR_INVALID_HANDLE));
        assert_eq!(sdk.invalid_frees(), 1);
        assert_eq!(sdk.handle_free(RawHandle::INVALID), Ok(()));
    }

    #[test]
    fn test_vm_list_filters_by_type() {
        let sdk = MockSdk::with_vms([MockVm::new("vm"), MockVm::container("ct")]);
        let server = sdk.server_create().unwrap();

        for (flags, expected) in [(PVTF_VM, 1), (PVTF_CT, 1), (PVTF_VM | PVTF_CT, 2)] {
            let job = sdk.server_get_vm_list(server, flags).unwrap();
            sdk.job_wait(job, None).unwrap();
            let result = sdk.job_result(job).unwrap();
            assert_eq!(sdk.result_params_count(result).unwrap(), expected);
            sdk.handle_free(result).unwrap();
            sdk.handle_free(job).unwrap();
        }
    }

    #[test]
    fn test_config_lookup_of_unknown_uuid_fails_job() {
        let sdk = MockSdk::new();
        let server = sdk.server_create().unwrap();
        let id = format_braced(&Uuid::new_v4());

        let job = sdk.server_get_vm_config(server, &id, ConfigSearch::Uuid).unwrap();
        assert_eq!(sdk.job_ret_code(job).unwrap(), PRL_ERR_VM_UUID_NOT_FOUND);
        let event = sdk.job_error(job).unwrap();
        assert_eq!(sdk.event_err_code(event).unwrap(), PRL_ERR_VM_UUID_NOT_FOUND);
        assert!(sdk.event_err_string(event, false).unwrap().contains(&id));
    }

    #[test]
    fn test_config_is_a_snapshot() {
        let vm = MockVm::new("snap").with_memory(512);
        let uuid = vm.uuid;
        let sdk = MockSdk::with_vms([vm]);
        let server = sdk.server_create().unwrap();

        let job = sdk.server_get_vm_config(server, "snap", ConfigSearch::Name).unwrap();
        let result = sdk.job_result(job).unwrap();
        let cfg = sdk.result_param_by_index(result, 0).unwrap();

        assert!(sdk.update_vm(&uuid, |vm| vm.ram_mib = 4096));
        assert_eq!(sdk.vm_cfg_ram_size(cfg).unwrap(), 512);
    }

    #[test]
    fn test_add_update_remove_vms() {
        let sdk = MockSdk::new();
        let vm = MockVm::new("scratch");
        sdk.add_vm(vm.clone());
        assert_eq!(sdk.vm_count(), 1);

        assert!(sdk.update_vm(&vm.uuid, |v| v.cpu_count = 4));
        assert!(!sdk.update_vm(&Uuid::new_v4(), |v| v.cpu_count = 8));

        assert_eq!(sdk.remove_vm(&vm.uuid).map(|v| v.cpu_count), Some(4));
        assert!(sdk.remove_vm(&vm.uuid).is_none());
        assert_eq!(sdk.vm_count(), 0);
    }

    #[test]
    fn test_reported_count_override() {
        let vm = MockVm::new("counted").with_serial(MockSerial::new(0, PDT_USE_OUTPUT_FILE, "/tmp/s0"));
        let sdk = MockSdk::with_vms([vm.clone()]);
        let server = sdk.server_create().unwrap();
        let job = sdk
            .server_get_vm_config(server, &format_braced(&vm.uuid), ConfigSearch::Uuid)
            .unwrap();
        let result = sdk.job_result(job).unwrap();
        let cfg = sdk.result_param_by_index(result, 0).unwrap();

        assert_eq!(sdk.vm_cfg_serial_ports_count(cfg).unwrap(), 1);
        sdk.report_count("vm_cfg_serial_ports_count", 7);
        assert_eq!(sdk.vm_cfg_serial_ports_count(cfg).unwrap(), 7);
        assert_eq!(sdk.vm_cfg_serial_port(cfg, 1), Err(PRL_ERR_INVALID_ARG));
        sdk.clear_faults();
        assert_eq!(sdk.vm_cfg_serial_ports_count(cfg).unwrap(), 1);
    }

    #[test]
    fn test_failing_call_injection() {
        let sdk = MockSdk::new();
        sdk.fail_call("server_create", PRL_ERR_OUT_OF_MEMORY);
        assert_eq!(sdk.server_create(), Err(PRL_ERR_OUT_OF_MEMORY));
        sdk.clear_faults();
        assert!(sdk.server_create().is_ok());
    }
}
