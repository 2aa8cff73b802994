//! Merging canonical records into the inventory.
//!
//! Every function here is one merge unit: it touches a single key (or a
//! small fixed set of keys) and is safe to run concurrently with the other
//! units of its batch. All of them are idempotent.

use log::{debug, trace};

use crate::error::MergeError;
use crate::inventory::{DeviceId, DiscoveryRecord, Inventory, MacId, WalkId};
use crate::lookup::ManufacturerLookup;
use crate::normalize::{
    DescriptionRecord, InterfaceRecord, MacEntryRecord, NeighborRecord, VersionInfo,
};

/// What a merge unit did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new row was inserted.
    Created,
    /// An existing row was updated in place.
    Updated,
    /// The record matched nothing and was ignored.
    Skipped,
}

fn ensure_device(inventory: &Inventory, device_id: DeviceId) -> Result<(), MergeError> {
    inventory
        .device(device_id)
        .map(|_| ())
        .ok_or(MergeError::DeviceNotFound(device_id))
}

/// Store version attributes on the device.
pub fn merge_version(
    inventory: &Inventory,
    device_id: DeviceId,
    version: VersionInfo,
) -> Result<(), MergeError> {
    inventory.apply_version(device_id, version)
}

/// Upsert an interface and link it to the MACs already seen on its port.
pub fn merge_interface(
    inventory: &Inventory,
    device_id: DeviceId,
    record: InterfaceRecord,
) -> Result<MergeOutcome, MergeError> {
    let name = record.interface.clone();
    let short = record.interface_short.clone();
    let (_, created) = inventory.upsert_interface(device_id, record)?;

    for mac_id in inventory.macs_on_port(device_id, &short) {
        inventory.link_interface_mac(device_id, &name, mac_id);
    }

    Ok(if created {
        MergeOutcome::Created
    } else {
        MergeOutcome::Updated
    })
}

/// Upsert the MAC and its (device, MAC) pivot.
pub fn merge_mac_entry(
    inventory: &Inventory,
    device_id: DeviceId,
    entry: &MacEntryRecord,
) -> Result<(MacId, MergeOutcome), MergeError> {
    let mac_id = inventory.upsert_mac(&entry.mac_address);
    let outcome = if inventory.upsert_pivot(device_id, mac_id, entry)? {
        MergeOutcome::Created
    } else {
        MergeOutcome::Updated
    };
    trace!("mac {} on device {}: {:?}", entry.mac_address, device_id, outcome);
    Ok((mac_id, outcome))
}

/// Enrich one learned MAC: resolve its manufacturer, link it to the
/// interface named by its port, and record the observation.
pub fn enrich_mac(
    inventory: &Inventory,
    lookup: &dyn ManufacturerLookup,
    walk_id: WalkId,
    device_id: DeviceId,
    mac_id: MacId,
    address: &str,
) -> Result<DiscoveryRecord, MergeError> {
    let manufacturer = lookup.lookup(address);
    let pivot = inventory
        .set_manufacturer(device_id, mac_id, manufacturer.name, manufacturer.comment)
        .ok_or_else(|| MergeError::PivotNotFound {
            device: device_id,
            mac: address.to_string(),
        })?;

    let interface = pivot
        .ports
        .as_deref()
        .and_then(|port| inventory.find_interface(device_id, port));
    if let Some(interface) = &interface {
        inventory.link_interface_mac(device_id, interface.name(), mac_id);
    }

    Ok(inventory.record_discovery(DiscoveryRecord {
        id: 0,
        walk_id,
        mac_id,
        device_id,
        interface_id: interface.map(|i| i.id),
        // Observed when enrichment touched the pivot.
        discovered_at: pivot.updated_at,
        vlan_id: pivot.vlan_id,
        entry_type: pivot.entry_type,
        age: pivot.age,
        secure: pivot.secure,
        ntfy: pivot.ntfy,
        ports: pivot.ports,
        manufacturer: pivot.manufacturer,
    }))
}

/// Set an interface description. Unknown ports are skipped.
pub fn apply_description(
    inventory: &Inventory,
    device_id: DeviceId,
    record: DescriptionRecord,
) -> Result<MergeOutcome, MergeError> {
    ensure_device(inventory, device_id)?;

    let Some(interface) = inventory.find_interface(device_id, &record.port) else {
        debug!("no interface '{}' on device {} for description", record.port, device_id);
        return Ok(MergeOutcome::Skipped);
    };
    inventory.update_interface(device_id, interface.name(), |i| {
        i.record.description = Some(record.description);
    });
    Ok(MergeOutcome::Updated)
}

/// Attach neighbor fields to the interface named exactly by the record.
///
/// A neighbor on an interface the device did not report is dropped; no
/// interface is created for it.
pub fn apply_neighbor(
    inventory: &Inventory,
    device_id: DeviceId,
    record: NeighborRecord,
) -> Result<MergeOutcome, MergeError> {
    ensure_device(inventory, device_id)?;

    let NeighborRecord {
        local_interface,
        neighbor,
    } = record;
    if inventory.update_interface(device_id, &local_interface, |i| i.neighbor = neighbor) {
        Ok(MergeOutcome::Updated)
    } else {
        debug!(
            "dropping neighbor on unknown interface '{}' of device {}",
            local_interface, device_id
        );
        Ok(MergeOutcome::Skipped)
    }
}
