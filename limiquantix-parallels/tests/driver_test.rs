//! Integration tests for the Parallels driver.
//!
//! These tests drive the full load/refresh path against the mock SDK and use
//! its handle accounting to check that nothing leaks.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use limiquantix_parallels::mock::{JobFailure, MockDisk, MockNet, MockVm};
use limiquantix_parallels::sdk::consts::*;
use limiquantix_parallels::{
    Connection, ConnectionConfig, DiskBus, DomainState, FixedHost, LinkState, MockSdk,
    ParallelsDriver, PrlError, Sdk, StateReason, StorageType, ROUTED_NETWORK_NAME,
};
use uuid::Uuid;

fn open(sdk: &Arc<MockSdk>, host_cpus: usize, job_timeout_ms: Option<u64>) -> ParallelsDriver {
    let dyn_sdk: Arc<dyn Sdk> = sdk.clone();
    let config = ConnectionConfig { job_timeout_ms };
    let conn = Connection::open(dyn_sdk, Arc::new(FixedHost(host_cpus)), &config)
        .expect("Failed to connect to mock SDK");
    ParallelsDriver::new(conn)
}

/// A running VM with two disks and a routed adapter.
#[test]
fn test_end_to_end_running_vm() {
    let vm = MockVm::new("app-01")
        .with_disk(MockDisk::image("/vz/app-01.pvm/harddisk.hdd", PMS_IDE_DEVICE, 0, 0))
        .with_disk(MockDisk::block("/dev/sdb", PMS_SCSI_DEVICE, 1, 1))
        .with_net(MockNet::routed(0, "vme00000001", "00:1C:42:9A:11:02"))
        .with_vnc(PRD_DISABLED, 0, "")
        .with_autostart(PAO_VM_START_ON_LOAD)
        .with_state(VMS_RUNNING, 4021);
    let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
    let driver = open(&sdk, 8, None);

    assert_eq!(driver.load_domains().unwrap(), 1);
    let dom = driver.lookup_by_uuid(&vm.uuid).unwrap();

    assert_eq!(dom.lifecycle.state, DomainState::Running);
    assert_eq!(dom.lifecycle.reason, StateReason::Booted);
    assert_eq!(dom.def.id, Some(4021));

    let disks = &dom.def.disks;
    assert_eq!(disks.len(), 2);
    assert_eq!((disks[0].target.as_str(), disks[0].bus), ("sda", DiskBus::Ide));
    assert_eq!((disks[1].target.as_str(), disks[1].bus), ("sdb", DiskBus::Scsi));
    assert_eq!(disks[0].storage, StorageType::File);
    assert_eq!(disks[1].storage, StorageType::Block);
    assert_eq!(disks[0].address.target, 0);
    assert_eq!(disks[1].address.target, 1);

    assert_eq!(dom.def.nets.len(), 1);
    assert_eq!(dom.def.nets[0].network, ROUTED_NETWORK_NAME);
    assert_eq!(dom.def.nets[0].link_state, LinkState::Up);

    assert!(dom.def.graphics.is_empty());
    assert!(dom.autostart);
}

/// A record that fails to build is never visible in the registry.
#[test]
fn test_failed_load_leaves_no_record() {
    let vm = MockVm::new("half-built")
        .with_disk(MockDisk::image("/vz/ok.hdd", PMS_SATA_DEVICE, 0, 0))
        .with_disk(MockDisk::image("/vz/bad.hdd", 0x42, 1, 1));
    let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
    let driver = open(&sdk, 4, None);

    let Err(err) = driver.add_domain(&vm.uuid) else {
        panic!("expected add_domain to fail");
    };
    assert!(matches!(err, PrlError::UnrecognizedEnum { kind: "disk bus", code: 0x42 }));
    assert!(driver.domains().is_empty());
    assert!(driver.domains().lookup_by_uuid(&vm.uuid).is_none());

    let err = driver.load_domains().unwrap_err();
    assert!(matches!(err, PrlError::UnrecognizedEnum { .. }));
    assert!(driver.domains().is_empty());

    // Only the server handle survives.
    assert_eq!(sdk.outstanding_handles(), 1);
}

/// A getter failure partway through the adapters aborts the whole load.
#[test]
fn test_getter_failure_leaves_no_record() {
    let vm = MockVm::new("flaky")
        .with_net(MockNet::bridged(0, "veth0", "00:1c:42:00:00:10", "Bridged", true));
    let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
    let driver = open(&sdk, 4, None);
    sdk.fail_call("net_virtual_network_id", PRL_ERR_NO_DATA);

    let Err(err) = driver.add_domain(&vm.uuid) else {
        panic!("expected add_domain to fail");
    };
    assert_eq!(err.result_code(), Some(PRL_ERR_NO_DATA));
    assert!(driver.domains().is_empty());
    assert_eq!(sdk.outstanding_handles(), 1);
}

/// A corrupt device count fails the load instead of taking the process down.
#[test]
fn test_huge_device_count_leaves_no_record() {
    let vm = MockVm::new("corrupt").with_net(MockNet::routed(0, "vme0", "00:1c:42:00:00:20"));
    let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
    let driver = open(&sdk, 4, None);
    sdk.report_count("vm_cfg_net_adapters_count", u32::MAX);

    let Err(err) = driver.add_domain(&vm.uuid) else {
        panic!("expected add_domain to fail");
    };
    assert!(matches!(err, PrlError::AllocationFailed(_) | PrlError::VendorCallFailed(_)));
    assert!(driver.domains().is_empty());
    assert_eq!(sdk.outstanding_handles(), 1);
}

/// A job timeout releases the job and leaves no result handle behind.
#[test]
fn test_timeout_leaks_no_handles() {
    let sdk = Arc::new(MockSdk::with_vms([MockVm::new("slow")]));
    let driver = open(&sdk, 4, Some(20));
    sdk.set_job_delay(Duration::from_millis(500));

    let err = driver.load_domains().unwrap_err();
    assert_eq!(err.result_code(), Some(PRL_ERR_TIMEOUT));
    assert!(driver.domains().is_empty());
    assert_eq!(sdk.outstanding_handles(), 1);

    sdk.clear_faults();
    driver.close();
    assert_eq!(sdk.outstanding_handles(), 0);
}

#[test]
fn test_vcpus_clamped_to_host() {
    let vm = MockVm::new("big").with_cpus(32, "");
    let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
    let driver = open(&sdk, 6, None);

    let dom = driver.add_domain(&vm.uuid).unwrap();
    assert_eq!(dom.def.vcpus, 6);
    assert_eq!(dom.def.max_vcpus, 6);
}

#[test]
fn test_empty_mask_selects_all_host_cpus() {
    let vm = MockVm::new("unpinned").with_cpus(2, "");
    let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
    let driver = open(&sdk, 12, None);

    let dom = driver.add_domain(&vm.uuid).unwrap();
    let mask = &dom.private.cpumask;
    assert_eq!(mask.len(), 12);
    assert!(mask.is_all_set());
}

#[test]
fn test_pinned_mask() {
    let vm = MockVm::new("pinned").with_cpus(2, "0-3,^1,6");
    let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
    let driver = open(&sdk, 8, None);

    let dom = driver.add_domain(&vm.uuid).unwrap();
    assert_eq!(dom.private.cpumask.iter_set().collect::<Vec<_>>(), vec![0, 2, 3, 6]);
    assert_eq!(dom.private.cpumask.to_string(), "0,2-3,6");
    assert!(dom.private.cpumask.is_set(6));
    assert!(!dom.private.cpumask.is_set(1));
    assert!(!dom.private.cpumask.is_set(64));
}

#[test]
fn test_mask_beyond_host_is_rejected() {
    let vm = MockVm::new("overpinned").with_cpus(2, "0-15");
    let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
    let driver = open(&sdk, 4, None);

    assert!(matches!(driver.add_domain(&vm.uuid), Err(PrlError::InvalidData(_))));
    assert!(driver.domains().is_empty());
}

#[test]
fn test_unknown_uuid() {
    let sdk = Arc::new(MockSdk::new());
    let driver = open(&sdk, 4, None);
    let uuid = Uuid::new_v4();

    let Err(err) = driver.add_domain(&uuid) else {
        panic!("expected add_domain to fail");
    };
    assert_eq!(err.to_string(), format!("no domain with matching uuid '{}'", uuid));
}

/// Concurrent refreshes of one record are serialized and never expose a
/// partially updated definition to readers.
#[test]
fn test_concurrent_refresh_and_lookup() {
    let vm = MockVm::new("busy").with_memory(1024).with_cpus(1, "");
    let uuid = vm.uuid;
    let other = MockVm::new("quiet");
    let sdk = Arc::new(MockSdk::with_vms([vm, other.clone()]));
    let driver = Arc::new(open(&sdk, 4, None));
    driver.load_domains().unwrap();

    let writers: Vec<_> = (0..4u32)
        .map(|i| {
            let driver = Arc::clone(&driver);
            let sdk = Arc::clone(&sdk);
            thread::spawn(move || {
                for round in 0..10u32 {
                    let mib = 1024 * (1 + i * 10 + round);
                    sdk.update_vm(&uuid, |v| {
                        v.ram_mib = mib;
                        v.cpu_count = 1 + (round % 4);
                    });
                    let mut dom = driver.lookup_by_uuid(&uuid).unwrap();
                    driver.refresh_domain(&mut dom).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let driver = Arc::clone(&driver);
            thread::spawn(move || {
                for _ in 0..50 {
                    let dom = driver.lookup_by_uuid(&uuid).unwrap();
                    assert_eq!(dom.uuid(), uuid);
                    assert_eq!(dom.def.memory.cur_balloon_kib, dom.def.memory.max_balloon_kib);
                    assert_eq!(dom.def.vcpus, dom.def.max_vcpus);
                    drop(dom);
                    assert_eq!(driver.lookup_by_uuid(&other.uuid).unwrap().name(), "quiet");
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    assert_eq!(driver.domains().len(), 2);
}

/// A refused config lookup fails the refresh without touching the record.
#[test]
fn test_refresh_after_vendor_failure_keeps_previous_state() {
    let vm = MockVm::new("stable").with_state(VMS_RUNNING, 9);
    let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
    let driver = open(&sdk, 4, None);
    driver.load_domains().unwrap();

    sdk.fail_job("vm_config", JobFailure::code(PRL_ERR_ACCESS_DENIED));
    let mut dom = driver.lookup_by_uuid(&vm.uuid).unwrap();
    assert!(driver.refresh_domain(&mut dom).is_err());
    assert_eq!(dom.lifecycle.state, DomainState::Running);
    assert_eq!(dom.def.id, Some(9));
    assert!(dom.private.sdkdom.is_some());
}

/// A record still held at close time releases its configuration handle
/// before the SDK is deinitialised.
#[test]
fn test_record_held_across_close() {
    let vm = MockVm::new("lingering");
    let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
    let driver = open(&sdk, 2, None);

    let held = driver.add_domain(&vm.uuid).unwrap();
    driver.close();
    assert!(!sdk.is_logged_in());
    assert!(sdk.is_initialized());
    assert_eq!(sdk.outstanding_handles(), 1);

    drop(held);
    assert!(!sdk.is_initialized());
    assert_eq!(sdk.outstanding_handles(), 0);
    assert_eq!(sdk.invalid_frees(), 0);
}

/// Records can be printed as JSON.
#[test]
fn test_record_serializes() {
    let vm = MockVm::new("json-01").with_state(VMS_SUSPENDED, 0);
    let sdk = Arc::new(MockSdk::with_vms([vm.clone()]));
    let driver = open(&sdk, 2, None);

    let dom = driver.add_domain(&vm.uuid).unwrap();
    let json = serde_json::to_value(&*dom).unwrap();
    assert_eq!(json["def"]["name"], "json-01");
    assert_eq!(json["lifecycle"]["state"], "shutoff");
    assert_eq!(json["lifecycle"]["reason"], "saved");
    assert!(json["private"].get("sdkdom").is_none());
}
