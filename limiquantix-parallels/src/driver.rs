//! Domain loading and refresh against a connected dispatcher.
//!
//! [`ParallelsDriver`] is what the management daemon talks to. It enumerates
//! vendor domains into its [`DomainRegistry`], adds single domains on demand
//! and refreshes existing records in place. A domain record is always built
//! completely before it touches the registry, so a failed load leaves no
//! trace and a failed refresh leaves the previous contents in place.

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::connection::Connection;
use crate::cpumask::CpuMask;
use crate::error::{PrlError, Result, SdkResultExt};
use crate::handle::Handle;
use crate::hardware::HardwareAssembler;
use crate::registry::{DomainObject, DomainRegistry, LockedDomain, PrivateData};
use crate::sdk::consts::{PVTF_CT, PVTF_VM};
use crate::sdk::ConfigSearch;
use crate::state::{map_autostart, map_cpu_mode, map_domain_type, map_state};
use crate::types::{DomainDef, MemoryDef};
use crate::uuid_text::{format_braced, parse_braced};

/// Parallels driver state: one connection plus the domains loaded through it.
#[derive(Debug)]
pub struct ParallelsDriver {
    // Dropped first: records hold config handles of this connection.
    domains: DomainRegistry,
    conn: Connection,
}

impl ParallelsDriver {
    pub fn new(conn: Connection) -> Self {
        Self {
            domains: DomainRegistry::new(),
            conn,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn domains(&self) -> &DomainRegistry {
        &self.domains
    }

    /// Disconnect, discarding all loaded records.
    pub fn close(self) {
        let Self { domains, conn } = self;
        drop(domains);
        conn.close();
    }

    /// Load every VM and container the dispatcher knows about.
    ///
    /// Stops at the first domain that fails to load.
    #[instrument(skip(self))]
    pub fn load_domains(&self) -> Result<usize> {
        let sdk = self.conn.sdk();
        let server = self.conn.server().raw();

        let result = self
            .conn
            .jobs()
            .run(|s| s.server_get_vm_list(server, PVTF_VM | PVTF_CT))?;
        let count = sdk.result_params_count(result.raw()).or_vendor_err(sdk.as_ref())?;

        for i in 0..count {
            let config = Handle::acquire(sdk, sdk.result_param_by_index(result.raw(), i))?;
            self.load_new(&config)?;
        }

        info!(count, "Loaded domains");
        Ok(count as usize)
    }

    /// Return the record for `uuid`, loading it from the dispatcher if it is
    /// not registered yet.
    #[instrument(skip(self), fields(uuid = %uuid))]
    pub fn add_domain(&self, uuid: &Uuid) -> Result<LockedDomain> {
        if let Some(dom) = self.domains.lookup_by_uuid(uuid) {
            return Ok(dom);
        }
        let config = self.fetch_config(uuid)?;
        self.load_new(&config)
    }

    /// Look up a registered record.
    pub fn lookup_by_uuid(&self, uuid: &Uuid) -> Result<LockedDomain> {
        self.domains
            .lookup_by_uuid(uuid)
            .ok_or_else(|| PrlError::NotFound(uuid.to_string()))
    }

    /// Build a record from a configuration handle and register it.
    ///
    /// Nothing is registered unless the whole record builds.
    pub fn load_new(&self, config: &Handle) -> Result<LockedDomain> {
        let dom = self.build(config)?;
        debug!(uuid = %dom.uuid(), name = %dom.name(), "Domain loaded");
        Ok(self.domains.insert(dom))
    }

    /// Rebuild a record the caller holds locked from a configuration handle.
    ///
    /// On failure `dom` is left untouched.
    pub fn refresh(&self, config: &Handle, dom: &mut DomainObject) -> Result<()> {
        let fresh = self.build(config)?;
        if fresh.uuid() != dom.uuid() {
            return Err(PrlError::InvalidData(format!(
                "configuration for '{}' describes domain '{}'",
                dom.uuid(),
                fresh.uuid()
            )));
        }
        dom.replace_contents(fresh);
        Ok(())
    }

    /// Fetch the current configuration of a locked record and rebuild it.
    #[instrument(skip(self, dom), fields(uuid = %dom.uuid()))]
    pub fn refresh_domain(&self, dom: &mut DomainObject) -> Result<()> {
        let config = self.fetch_config(&dom.uuid())?;
        self.refresh(&config, dom)?;
        debug!(state = %dom.lifecycle, "Domain refreshed");
        Ok(())
    }

    /// Configuration handle of one domain. A failed lookup job means the
    /// dispatcher does not know the UUID.
    fn fetch_config(&self, uuid: &Uuid) -> Result<Handle> {
        let sdk = self.conn.sdk();
        let server = self.conn.server().raw();
        let id = format_braced(uuid);

        let result = match self
            .conn
            .jobs()
            .run(|s| s.server_get_vm_config(server, &id, ConfigSearch::Uuid))
        {
            Ok(result) => result,
            Err(fault) if fault.is_job_failure() => {
                return Err(PrlError::NotFound(uuid.to_string()));
            }
            Err(fault) => return Err(fault.into()),
        };
        Handle::acquire(sdk, sdk.result_param_by_index(result.raw(), 0))
    }

    fn build(&self, config: &Handle) -> Result<DomainObject> {
        let sdk = self.conn.sdk();
        let vm = config.raw();

        let name = sdk.vm_cfg_name(vm).or_vendor_err(sdk.as_ref())?;
        let uuid = parse_braced(&sdk.vm_cfg_uuid(vm).or_vendor_err(sdk.as_ref())?)?;
        let mut def = DomainDef::new(name, uuid);

        def.memory = MemoryDef::from_mib(sdk.vm_cfg_ram_size(vm).or_vendor_err(sdk.as_ref())?);
        let cpumask = self.add_cpu_info(config, &mut def)?;

        def.os = map_domain_type(sdk.vm_cfg_vm_type(vm).or_vendor_err(sdk.as_ref())?)?;
        def.os.arch = map_cpu_mode(sdk.vm_cfg_cpu_mode(vm).or_vendor_err(sdk.as_ref())?)?;

        let assembler = HardwareAssembler::new(sdk);
        assembler.add_hardware(config, &mut def)?;
        assembler.add_vnc(config, &mut def)?;

        let env_id = sdk.vm_cfg_env_id(vm).or_vendor_err(sdk.as_ref())?;
        let home = sdk.vm_cfg_home_path(vm).or_vendor_err(sdk.as_ref())?;

        let vendor_state = {
            let info = self.conn.jobs().first_param(|s| s.vm_get_state(vm))?;
            sdk.vm_info_state(info.raw()).or_vendor_err(sdk.as_ref())?
        };
        let (lifecycle, id) = map_state(vendor_state, env_id)?;
        def.id = id;

        let autostart = map_autostart(sdk.vm_cfg_auto_start(vm).or_vendor_err(sdk.as_ref())?)?;

        let private = PrivateData {
            sdkdom: Some(config.share()?),
            home,
            cpumask,
            env_id,
        };
        Ok(DomainObject::new(def, lifecycle, autostart, private))
    }

    /// vCPU count clamped to the host, and the affinity mask.
    fn add_cpu_info(&self, config: &Handle, def: &mut DomainDef) -> Result<CpuMask> {
        let sdk = self.conn.sdk();
        let host_cpus = self.conn.host_cpu_count()?;

        let requested = sdk.vm_cfg_cpu_count(config.raw()).or_vendor_err(sdk.as_ref())?;
        let vcpus = u32::try_from(host_cpus).map_or(requested, |host| requested.min(host));
        if vcpus < requested {
            warn!(
                domain = %def.name,
                requested,
                host_cpus,
                "vCPU count exceeds host CPUs, clamping"
            );
        }
        def.vcpus = vcpus;
        def.max_vcpus = vcpus;

        let mask = sdk.vm_cfg_cpu_mask(config.raw()).or_vendor_err(sdk.as_ref())?;
        CpuMask::parse(&mask, host_cpus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::connection::ConnectionConfig;
    use crate::host::FixedHost;
    use crate::mock::{JobFailure, MockSdk, MockVm};
    use crate::sdk::consts::*;
    use crate::sdk::Sdk;
    use crate::types::{Arch, DomainState, Lifecycle, OsType, StateReason};

    fn driver(sdk: &Arc<MockSdk>, host_cpus: usize) -> ParallelsDriver {
        let dyn_sdk: Arc<dyn Sdk> = sdk.clone();
        let conn = Connection::open(dyn_sdk, Arc::new(FixedHost(host_cpus)), &ConnectionConfig::default())
            .unwrap();
        ParallelsDriver::new(conn)
    }

    #[test]
    fn test_load_domains_registers_vms_and_containers() {
        let vm = MockVm::new("vm-01").with_state(VMS_RUNNING, 7);
        let ct = MockVm::container("ct-101");
        let sdk = Arc::new(MockSdk::with_vms([vm.clone(), ct.clone()]));
        let driver = driver(&sdk, 4);

        assert_eq!(driver.load_domains().unwrap(), 2);
        assert_eq!(driver.domains().len(), 2);

        let dom = driver.lookup_by_uuid(&vm.uuid).unwrap();
        assert_eq!(dom.def.id, Some(7));
        assert_eq!(dom.lifecycle.state, DomainState::Running);
        assert_eq!(dom.def.os.arch, Arch::X86_64);
        drop(dom);

        let dom = driver.lookup_by_uuid(&ct.uuid).unwrap();
        assert_eq!(dom.def.os.os_type, OsType::Exe);
        assert_eq!(dom.def.id, None);
        assert!(dom.def.videos.is_empty());
    }

    #[test]
    fn test_record_fields() {
        let vm = MockVm::new("db-01")
            .with_memory(2048)
            .with_cpus(2, "0-1")
            .with_cpu_mode(PCM_CPU_MODE_32)
            .with_home("/vz/db-01.pvm")
            .with_autostart(PAO_VM_START_ON_LOAD)
            .with_state(VMS_PAUSED, 12);
        let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
        let driver = driver(&sdk, 4);

        let dom = driver.add_domain(&vm.uuid).unwrap();
        assert_eq!(dom.uuid(), vm.uuid);
        assert_eq!(dom.name(), "db-01");
        assert_eq!(dom.def.memory.max_balloon_kib, 2048 * 1024);
        assert_eq!(dom.def.os.arch, Arch::I686);
        assert_eq!(dom.lifecycle, Lifecycle::new(DomainState::Paused, StateReason::User));
        assert!(dom.autostart);
        assert!(dom.persistent);
        assert_eq!(dom.private.home, "/vz/db-01.pvm");
        assert_eq!(dom.private.env_id, 12);
        assert_eq!(dom.private.cpumask.iter_set().collect::<Vec<_>>(), vec![0, 1]);
        assert!(dom.private.sdkdom.as_ref().unwrap().is_valid());
    }

    #[test]
    fn test_add_domain_unknown_uuid_is_not_found() {
        let sdk = Arc::new(MockSdk::new());
        let driver = driver(&sdk, 4);
        let uuid = Uuid::new_v4();

        let Err(err) = driver.add_domain(&uuid) else {
            panic!("expected add_domain to fail");
        };
        assert!(matches!(err, PrlError::NotFound(ref id) if *id == uuid.to_string()));
        assert!(driver.domains().is_empty());
    }

    #[test]
    fn test_add_domain_timeout_is_not_not_found() {
        let sdk = Arc::new(MockSdk::new());
        let dyn_sdk: Arc<dyn Sdk> = sdk.clone();
        let config = ConnectionConfig { job_timeout_ms: Some(10) };
        let conn = Connection::open(dyn_sdk, Arc::new(FixedHost(4)), &config).unwrap();
        let driver = ParallelsDriver::new(conn);
        sdk.set_job_delay(Duration::from_millis(100));

        let Err(err) = driver.add_domain(&Uuid::new_v4()) else {
            panic!("expected add_domain to fail");
        };
        assert_eq!(err.result_code(), Some(PRL_ERR_TIMEOUT));
    }

    #[test]
    fn test_add_domain_returns_existing_record() {
        let vm = MockVm::new("web-01");
        let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
        let driver = driver(&sdk, 4);
        drop(driver.add_domain(&vm.uuid).unwrap());

        // Served from the registry even though the dispatcher lost it.
        sdk.remove_vm(&vm.uuid);
        assert_eq!(driver.add_domain(&vm.uuid).unwrap().name(), "web-01");
    }

    #[test]
    fn test_lookup_missing_is_not_found() {
        let sdk = Arc::new(MockSdk::new());
        let driver = driver(&sdk, 4);
        assert!(matches!(
            driver.lookup_by_uuid(&Uuid::new_v4()),
            Err(PrlError::NotFound(_))
        ));
    }

    #[test]
    fn test_refresh_replaces_contents() {
        let vm = MockVm::new("web-01");
        let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
        let driver = driver(&sdk, 4);
        drop(driver.add_domain(&vm.uuid).unwrap());

        sdk.update_vm(&vm.uuid, |v| {
            v.name = "web-01-renamed".into();
            v.state = VMS_RUNNING;
            v.env_id = 3;
        });

        let mut dom = driver.lookup_by_uuid(&vm.uuid).unwrap();
        driver.refresh_domain(&mut dom).unwrap();
        assert_eq!(dom.name(), "web-01-renamed");
        assert_eq!(dom.def.id, Some(3));
        assert_eq!(dom.lifecycle.state, DomainState::Running);
        drop(dom);

        assert_eq!(driver.domains().len(), 1);
    }

    #[test]
    fn test_failed_refresh_leaves_record_untouched() {
        let vm = MockVm::new("web-01").with_memory(1024);
        let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
        let driver = driver(&sdk, 4);
        drop(driver.add_domain(&vm.uuid).unwrap());

        sdk.update_vm(&vm.uuid, |v| {
            v.ram_mib = 8192;
            v.state = 0x3000_00ff;
        });

        let mut dom = driver.lookup_by_uuid(&vm.uuid).unwrap();
        let err = driver.refresh_domain(&mut dom).unwrap_err();
        assert!(matches!(err, PrlError::UnrecognizedEnum { kind: "domain state", .. }));
        assert_eq!(dom.def.memory.max_balloon_kib, 1024 * 1024);
        assert_eq!(dom.lifecycle.state, DomainState::Shutoff);
    }

    #[test]
    fn test_refresh_of_vanished_domain_is_not_found() {
        let vm = MockVm::new("web-01");
        let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
        let driver = driver(&sdk, 4);
        drop(driver.add_domain(&vm.uuid).unwrap());
        sdk.remove_vm(&vm.uuid);

        let mut dom = driver.lookup_by_uuid(&vm.uuid).unwrap();
        assert!(matches!(driver.refresh_domain(&mut dom), Err(PrlError::NotFound(_))));
    }

    #[test]
    fn test_load_domains_is_fail_fast() {
        let good = MockVm::new("good");
        let bad = MockVm::new("bad").with_cpu_mode(9);
        let sdk = Arc::new(MockSdk::with_vms([good, bad.clone()]));
        let driver = driver(&sdk, 4);

        let err = driver.load_domains().unwrap_err();
        assert!(matches!(err, PrlError::UnrecognizedEnum { kind: "CPU mode", code: 9 }));
        assert!(driver.lookup_by_uuid(&bad.uuid).is_err());

        drop(driver);
        assert_eq!(sdk.outstanding_handles(), 0);
    }

    #[test]
    fn test_state_job_failure_aborts_load() {
        let vm = MockVm::new("web-01");
        let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
        let driver = driver(&sdk, 4);
        sdk.fail_job("vm_state", JobFailure::code(PRL_ERR_OPERATION_FAILED));

        let Err(err) = driver.add_domain(&vm.uuid) else {
            panic!("expected add_domain to fail");
        };
        assert_eq!(err.result_code(), Some(PRL_ERR_OPERATION_FAILED));
        assert!(driver.domains().is_empty());
    }

    #[test]
    fn test_close_releases_every_handle() {
        let sdk = Arc::new(MockSdk::with_vms([MockVm::new("a"), MockVm::container("b")]));
        let driver = driver(&sdk, 2);
        driver.load_domains().unwrap();
        assert!(sdk.outstanding_handles() > 1);

        driver.close();
        assert_eq!(sdk.outstanding_handles(), 0);
        assert!(!sdk.is_initialized());
        assert_eq!(sdk.invalid_frees(), 0);
    }
}
