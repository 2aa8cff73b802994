//! Shared inventory store.
//!
//! Tables are concurrent maps so that the merge units of a batch can upsert
//! different keys in parallel. Same-key upserts go through the map's entry
//! API and are last-writer-wins; they never duplicate rows.

mod history;
mod model;

pub use history::{SyncHistory, WalkHistory, WalkResult};
pub use model::{
    Credentials, Device, DeviceId, DiscoveryRecord, Interface, InterfaceId, MacAddress, MacId,
    MacPivot, NewDevice, WalkId,
};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::Ref;
use log::debug;

use crate::error::{MergeError, WalkError};
use crate::normalize::{InterfaceRecord, MacEntryRecord, VersionInfo};

/// In-memory store of devices, MACs, interfaces, discoveries and history.
#[derive(Debug, Default)]
pub struct Inventory {
    next_id: AtomicU64,
    devices: DashMap<DeviceId, Device>,
    macs: DashMap<String, MacAddress>,
    pivots: DashMap<(DeviceId, MacId), MacPivot>,
    interfaces: DashMap<(DeviceId, String), Interface>,
    discoveries: RwLock<Vec<DiscoveryRecord>>,
    history: SyncHistory,
}

impl Inventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ---- devices ----

    /// Add a device and return its id.
    pub fn add_device(&self, new: NewDevice) -> DeviceId {
        let id = DeviceId(self.next_id());
        let now = Utc::now();
        self.devices.insert(
            id,
            Device {
                id,
                host: new.host,
                port: new.port,
                device_type: new.device_type,
                credentials: new.credentials,
                syncing: false,
                last_sync_completed: None,
                version: VersionInfo::default(),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Read guard on a device entry; removal of the device waits for it.
    fn device_guard(&self, id: DeviceId) -> Result<Ref<'_, DeviceId, Device>, MergeError> {
        self.devices.get(&id).ok_or(MergeError::DeviceNotFound(id))
    }

    /// Snapshot of one device.
    pub fn device(&self, id: DeviceId) -> Option<Device> {
        self.devices.get(&id).map(|d| d.clone())
    }

    /// Snapshot of every device, ordered by id.
    pub fn devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.iter().map(|d| d.clone()).collect();
        devices.sort_by_key(|d| d.id);
        devices
    }

    /// Find a device by its management address.
    pub fn find_device(&self, host: &str, port: u16) -> Option<Device> {
        self.devices
            .iter()
            .find(|d| d.host == host && d.port == port)
            .map(|d| d.clone())
    }

    /// Remove a device together with its pivots, interfaces, discoveries and
    /// history.
    pub fn remove_device(&self, id: DeviceId) -> Option<Device> {
        let (_, device) = self.devices.remove(&id)?;
        self.pivots.retain(|(device_id, _), _| *device_id != id);
        self.interfaces.retain(|(device_id, _), _| *device_id != id);
        self.discoveries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|d| d.device_id != id);
        self.history.remove_device(id);
        Some(device)
    }

    /// Atomically claim the device for a walk.
    ///
    /// Returns `Ok(false)` if a walk is already running. The check and the
    /// set happen under the same shard lock, so two callers can never both
    /// see `true`.
    pub fn try_begin_sync(&self, id: DeviceId) -> Result<bool, WalkError> {
        let mut device = self
            .devices
            .get_mut(&id)
            .ok_or(WalkError::UnknownDevice(id))?;
        if device.syncing {
            return Ok(false);
        }
        device.syncing = true;
        device.updated_at = Utc::now();
        Ok(true)
    }

    /// Release the walk claim; a completed walk also stamps the sync time.
    pub fn finish_sync(&self, id: DeviceId, completed: bool) {
        if let Some(mut device) = self.devices.get_mut(&id) {
            let now = Utc::now();
            device.syncing = false;
            if completed {
                device.last_sync_completed = Some(now);
            }
            device.updated_at = now;
        }
    }

    /// Store version attributes on the device.
    pub fn apply_version(&self, id: DeviceId, version: VersionInfo) -> Result<(), MergeError> {
        let mut device = self
            .devices
            .get_mut(&id)
            .ok_or(MergeError::DeviceNotFound(id))?;
        device.version = version;
        device.updated_at = Utc::now();
        Ok(())
    }

    // ---- MAC addresses and pivots ----

    /// Get or create the global MAC row for a canonical address.
    pub fn upsert_mac(&self, address: &str) -> MacId {
        self.macs
            .entry(address.to_string())
            .or_insert_with(|| {
                debug!("new mac address {}", address);
                MacAddress {
                    id: MacId(self.next_id()),
                    address: address.to_string(),
                    created_at: Utc::now(),
                }
            })
            .id
    }

    /// Look up a MAC by canonical address.
    pub fn mac(&self, address: &str) -> Option<MacAddress> {
        self.macs.get(address).map(|m| m.clone())
    }

    /// Number of distinct MAC addresses.
    pub fn mac_count(&self) -> usize {
        self.macs.len()
    }

    /// Insert or update the (device, MAC) pivot. Returns `true` if created.
    ///
    /// The device entry stays locked for the duration, so a concurrent
    /// [`Inventory::remove_device`] either sees the pivot and sweeps it or
    /// makes this call fail.
    pub fn upsert_pivot(
        &self,
        device_id: DeviceId,
        mac_id: MacId,
        entry: &MacEntryRecord,
    ) -> Result<bool, MergeError> {
        let _device = self.device_guard(device_id)?;
        Ok(match self.pivots.entry((device_id, mac_id)) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().apply(entry);
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MacPivot::new(device_id, mac_id, entry));
                true
            }
        })
    }

    /// Set the manufacturer on an existing pivot and return the result.
    pub fn set_manufacturer(
        &self,
        device_id: DeviceId,
        mac_id: MacId,
        manufacturer: Option<String>,
        comment: Option<String>,
    ) -> Option<MacPivot> {
        let mut pivot = self.pivots.get_mut(&(device_id, mac_id))?;
        pivot.manufacturer = manufacturer;
        pivot.comment = comment;
        pivot.updated_at = Utc::now();
        Some(pivot.clone())
    }

    /// Snapshot of one pivot.
    pub fn pivot(&self, device_id: DeviceId, mac_id: MacId) -> Option<MacPivot> {
        self.pivots.get(&(device_id, mac_id)).map(|p| p.clone())
    }

    /// Every pivot of a device, ordered by MAC id.
    pub fn pivots_for(&self, device_id: DeviceId) -> Vec<MacPivot> {
        let mut pivots: Vec<MacPivot> = self
            .pivots
            .iter()
            .filter(|p| p.device_id == device_id)
            .map(|p| p.clone())
            .collect();
        pivots.sort_by_key(|p| p.mac_id);
        pivots
    }

    /// Total number of pivots across devices.
    pub fn pivot_count(&self) -> usize {
        self.pivots.len()
    }

    /// MACs whose recorded port list on this device is exactly `port`.
    pub fn macs_on_port(&self, device_id: DeviceId, port: &str) -> Vec<MacId> {
        self.pivots
            .iter()
            .filter(|p| p.device_id == device_id && p.ports.as_deref() == Some(port))
            .map(|p| p.mac_id)
            .collect()
    }

    // ---- interfaces ----

    /// Insert or update an interface keyed by (device, name).
    ///
    /// Neighbor fields, MAC links, and a description learned from the
    /// description step survive the update. Returns the id and whether the
    /// interface was created. Like [`Inventory::upsert_pivot`], the device
    /// entry is held while the interface is written.
    pub fn upsert_interface(
        &self,
        device_id: DeviceId,
        record: InterfaceRecord,
    ) -> Result<(InterfaceId, bool), MergeError> {
        let _device = self.device_guard(device_id)?;
        Ok(match self.interfaces.entry((device_id, record.interface.clone())) {
            Entry::Occupied(mut occupied) => {
                let interface = occupied.get_mut();
                let description = record.description.clone().or(interface.record.description.take());
                interface.record = InterfaceRecord {
                    description,
                    ..record
                };
                interface.updated_at = Utc::now();
                (interface.id, false)
            }
            Entry::Vacant(vacant) => {
                let now = Utc::now();
                let id = InterfaceId(self.next_id());
                vacant.insert(Interface {
                    id,
                    device_id,
                    record,
                    neighbor: Default::default(),
                    macs: BTreeSet::new(),
                    created_at: now,
                    updated_at: now,
                });
                (id, true)
            }
        })
    }

    /// Snapshot of an interface by exact full name.
    pub fn interface(&self, device_id: DeviceId, name: &str) -> Option<Interface> {
        self.interfaces
            .get(&(device_id, name.to_string()))
            .map(|i| i.clone())
    }

    /// Snapshot of an interface by full or short name.
    pub fn find_interface(&self, device_id: DeviceId, name: &str) -> Option<Interface> {
        self.interface(device_id, name).or_else(|| {
            self.interfaces
                .iter()
                .find(|i| i.device_id == device_id && i.is_named(name))
                .map(|i| i.clone())
        })
    }

    /// Mutate an interface in place by exact full name.
    pub fn update_interface<F>(&self, device_id: DeviceId, name: &str, update: F) -> bool
    where
        F: FnOnce(&mut Interface),
    {
        match self.interfaces.get_mut(&(device_id, name.to_string())) {
            Some(mut interface) => {
                update(&mut interface);
                interface.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Record that `mac_id` was seen behind the named interface.
    pub fn link_interface_mac(&self, device_id: DeviceId, name: &str, mac_id: MacId) -> bool {
        self.update_interface(device_id, name, |interface| {
            interface.macs.insert(mac_id);
        })
    }

    /// Every interface of a device, ordered by id.
    pub fn interfaces_for(&self, device_id: DeviceId) -> Vec<Interface> {
        let mut interfaces: Vec<Interface> = self
            .interfaces
            .iter()
            .filter(|i| i.device_id == device_id)
            .map(|i| i.clone())
            .collect();
        interfaces.sort_by_key(|i| i.id);
        interfaces
    }

    /// Total number of interfaces across devices.
    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    // ---- discoveries and history ----

    /// Append a discovery record, assigning its id.
    pub fn record_discovery(&self, mut record: DiscoveryRecord) -> DiscoveryRecord {
        record.id = self.next_id();
        self.discoveries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        record
    }

    /// Discoveries for one device, in the order they were recorded.
    pub fn discoveries_for(&self, device_id: DeviceId) -> Vec<DiscoveryRecord> {
        self.discoveries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.device_id == device_id)
            .cloned()
            .collect()
    }

    /// Allocate an id for a new walk.
    pub fn next_walk_id(&self) -> WalkId {
        WalkId(self.next_id())
    }

    /// The walk history recorder.
    pub fn history(&self) -> &SyncHistory {
        &self.history
    }
}
