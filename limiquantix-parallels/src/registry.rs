//! Domain registry.
//!
//! The registry maps UUIDs to individually locked [`DomainObject`]s. The map
//! itself sits behind a read/write lock that is only held for structural
//! changes and lookups; record contents are guarded by each record's own
//! mutex. Records are handed out locked as [`LockedDomain`] and unlock when
//! the guard is dropped.
//!
//! Lock order is record, then map. The map lock is never held while waiting
//! for a record, except on a freshly created record no one else can see.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RawMutex, RwLock};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::cpumask::CpuMask;
use crate::handle::Handle;
use crate::types::{DomainDef, Lifecycle};

/// A record locked for the caller; dropping it unlocks the record.
pub type LockedDomain = parking_lot::ArcMutexGuard<RawMutex, DomainObject>;

/// Adapter-private fields of a record.
#[derive(Debug, Serialize)]
pub struct PrivateData {
    /// Vendor configuration handle the record was last built from.
    #[serde(skip)]
    pub sdkdom: Option<Handle>,
    pub home: String,
    pub cpumask: CpuMask,
    pub env_id: u32,
}

/// One managed domain.
#[derive(Debug, Serialize)]
pub struct DomainObject {
    uuid: Uuid,
    pub def: DomainDef,
    pub lifecycle: Lifecycle,
    pub persistent: bool,
    pub autostart: bool,
    pub private: PrivateData,
}

impl DomainObject {
    /// New record; the UUID is taken from the definition and never changes.
    pub fn new(def: DomainDef, lifecycle: Lifecycle, autostart: bool, private: PrivateData) -> Self {
        Self {
            uuid: def.uuid,
            def,
            lifecycle,
            persistent: true,
            autostart,
            private,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    /// Replace everything but the identity with the contents of `fresh`.
    ///
    /// Both records must describe the same domain.
    pub(crate) fn replace_contents(&mut self, fresh: DomainObject) {
        debug_assert_eq!(self.uuid, fresh.uuid);
        let DomainObject {
            def,
            lifecycle,
            persistent,
            autostart,
            private,
            ..
        } = fresh;
        self.def = def;
        self.lifecycle = lifecycle;
        self.persistent = persistent;
        self.autostart = autostart;
        // Dropping the old private data releases its cached config handle.
        self.private = private;
    }
}

/// Concurrently readable collection of domain records.
#[derive(Default)]
pub struct DomainRegistry {
    domains: RwLock<HashMap<Uuid, Arc<Mutex<DomainObject>>>>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.domains.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.read().is_empty()
    }

    /// UUIDs of all registered records, in no particular order.
    pub fn uuids(&self) -> Vec<Uuid> {
        self.domains.read().keys().copied().collect()
    }

    /// Find a record and lock it.
    ///
    /// Blocks while another caller holds the record.
    pub fn lookup_by_uuid(&self, uuid: &Uuid) -> Option<LockedDomain> {
        let record = self.domains.read().get(uuid).cloned()?;
        Some(record.lock_arc())
    }

    /// Find a record by domain name and lock it.
    ///
    /// Locks each candidate in turn, so the caller must not already hold a
    /// record lock.
    pub fn lookup_by_name(&self, name: &str) -> Option<LockedDomain> {
        let records: Vec<_> = self.domains.read().values().cloned().collect();
        records
            .into_iter()
            .map(|record| record.lock_arc())
            .find(|dom| dom.name() == name)
    }

    /// Register a fully built record and return it locked.
    ///
    /// If a record with the same UUID already exists its contents are
    /// replaced; its identity and lock are kept. The returned record is
    /// registered for as long as the caller holds it.
    pub fn insert(&self, dom: DomainObject) -> LockedDomain {
        let uuid = dom.uuid();
        loop {
            let mut domains = self.domains.write();
            let Some(existing) = domains.get(&uuid).cloned() else {
                let record = Arc::new(Mutex::new(dom));
                let locked = record.lock_arc();
                domains.insert(uuid, record);
                debug!(uuid = %uuid, "Registered domain");
                return locked;
            };
            drop(domains);

            let mut locked = existing.lock_arc();
            if self.holds(&uuid, &existing) {
                debug!(uuid = %uuid, "Domain already registered, replacing contents");
                locked.replace_contents(dom);
                return locked;
            }
            debug!(uuid = %uuid, "Domain removed while waiting for it, registering again");
        }
    }

    /// Remove a record. Returns whether it was present.
    ///
    /// Waits until no caller holds the record, so the caller must not hold
    /// it either.
    pub fn remove(&self, uuid: &Uuid) -> bool {
        let Some(record) = self.domains.read().get(uuid).cloned() else {
            return false;
        };
        let _locked = record.lock_arc();

        let mut domains = self.domains.write();
        if !domains.get(uuid).is_some_and(|current| Arc::ptr_eq(current, &record)) {
            return false;
        }
        domains.remove(uuid);
        debug!(uuid = %uuid, "Removed domain");
        true
    }

    fn holds(&self, uuid: &Uuid, record: &Arc<Mutex<DomainObject>>) -> bool {
        self.domains
            .read()
            .get(uuid)
            .is_some_and(|current| Arc::ptr_eq(current, record))
    }
}

impl std::fmt::Debug for DomainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainRegistry")
            .field("domains", &self.len())
            .finish()
    }
}
