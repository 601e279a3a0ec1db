//! Translation of vendor classification codes.
//!
//! Every mapping is fail-closed: a code without an entry is reported as
//! [`PrlError::UnrecognizedEnum`] instead of being defaulted, so an unknown
//! vendor state can never be shown to an operator as a safe one.

use crate::error::{PrlError, Result};
use crate::sdk::consts::*;
use crate::types::{Arch, DomainState, Lifecycle, OsDef, OsType, StateReason, CONTAINER_INIT};

/// Map a vendor VM state to a lifecycle state and runtime id.
///
/// The runtime id is kept for running and transitional states and cleared for
/// stopped, suspended and unknown ones.
pub fn map_state(vendor_state: u32, env_id: u32) -> Result<(Lifecycle, Option<u32>)> {
    use DomainState::*;
    use StateReason::*;

    let (lifecycle, keeps_id) = match vendor_state {
        VMS_STOPPED | VMS_MOUNTED => (Lifecycle::new(Shutoff, StateReason::Shutdown), false),
        VMS_STARTING | VMS_COMPACTING | VMS_RESETTING | VMS_PAUSING | VMS_RECONNECTING
        | VMS_RUNNING => (Lifecycle::new(Running, Booted), true),
        VMS_PAUSED => (Lifecycle::new(Paused, User), true),
        VMS_SUSPENDED | VMS_DELETING_STATE | VMS_SUSPENDING_SYNC => {
            (Lifecycle::new(Shutoff, Saved), false)
        }
        VMS_STOPPING => (Lifecycle::new(DomainState::Shutdown, User), true),
        VMS_SNAPSHOTING => (Lifecycle::new(Paused, Snapshot), true),
        VMS_MIGRATING => (Lifecycle::new(Paused, Migration), true),
        VMS_SUSPENDING => (Lifecycle::new(Paused, Save), true),
        VMS_RESTORING | VMS_RESUMING => (Lifecycle::new(Running, Restored), true),
        VMS_CONTINUING => (Lifecycle::new(Running, Unpaused), true),
        VMS_UNKNOWN => (Lifecycle::new(NoState, Unknown), false),
        other => return Err(PrlError::unrecognized("domain state", other)),
    };

    Ok((lifecycle, keeps_id.then_some(env_id)))
}

/// Map the vendor autostart option to the autostart flag.
pub fn map_autostart(mode: u32) -> Result<bool> {
    match mode {
        PAO_VM_START_ON_LOAD => Ok(true),
        PAO_VM_START_MANUAL => Ok(false),
        other => Err(PrlError::unrecognized("autostart mode", other)),
    }
}

/// Map the vendor VM type to OS type and init path; architecture is left default.
pub fn map_domain_type(vm_type: u32) -> Result<OsDef> {
    match vm_type {
        PVT_VM => Ok(OsDef {
            os_type: OsType::Hvm,
            init: None,
            ..OsDef::default()
        }),
        PVT_CT => Ok(OsDef {
            os_type: OsType::Exe,
            init: Some(CONTAINER_INIT.to_string()),
            ..OsDef::default()
        }),
        other => Err(PrlError::unrecognized("domain type", other)),
    }
}

/// Map the vendor CPU addressing mode to an architecture.
pub fn map_cpu_mode(mode: u32) -> Result<Arch> {
    match mode {
        PCM_CPU_MODE_32 => Ok(Arch::I686),
        PCM_CPU_MODE_64 => Ok(Arch::X86_64),
        other => Err(PrlError::unrecognized("CPU mode", other)),
    }
}
