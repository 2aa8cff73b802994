//! Inventory entities.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::normalize::{InterfaceRecord, MacEntryRecord, NeighborInfo, VersionInfo};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a managed device.
    DeviceId
);
id_type!(
    /// Identifier of a globally deduplicated MAC address.
    MacId
);
id_type!(
    /// Identifier of a device interface.
    InterfaceId
);
id_type!(
    /// Identifier of one walk attempt.
    WalkId
);

/// Login credentials for a device.
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            username: self.username.clone(),
            password: SecretString::from(self.password.expose_secret().to_owned()),
        }
    }
}

/// A managed switch or router.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub host: String,
    pub port: u16,

    /// Vendor tag selecting the normalizer (e.g., "cisco_nxos").
    pub device_type: String,

    pub credentials: Credentials,

    /// Set while a walk is running; the per-device admission gate.
    pub syncing: bool,

    pub last_sync_completed: Option<DateTime<Utc>>,

    /// Attributes from the last successful version step.
    pub version: VersionInfo,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for adding a device to the inventory.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub host: String,
    pub port: u16,
    pub device_type: String,
    pub credentials: Credentials,
}

impl NewDevice {
    /// Describe a device reachable on the default SSH port.
    pub fn new(host: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            device_type: device_type.into(),
            credentials: Credentials::new("", ""),
        }
    }

    /// Set the SSH port (default: 22).
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the login credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }
}

/// A MAC address, shared by every device that learned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacAddress {
    pub id: MacId,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

/// Per-(device, MAC) attributes from the MAC table and enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacPivot {
    pub device_id: DeviceId,
    pub mac_id: MacId,
    pub vlan_id: Option<String>,
    pub entry_type: Option<String>,
    pub age: Option<String>,
    pub secure: Option<String>,
    pub ntfy: Option<String>,
    pub ports: Option<String>,
    pub manufacturer: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MacPivot {
    pub(crate) fn new(device_id: DeviceId, mac_id: MacId, entry: &MacEntryRecord) -> Self {
        let now = Utc::now();
        let mut pivot = Self {
            device_id,
            mac_id,
            vlan_id: None,
            entry_type: None,
            age: None,
            secure: None,
            ntfy: None,
            ports: None,
            manufacturer: None,
            comment: None,
            created_at: now,
            updated_at: now,
        };
        pivot.apply(entry);
        pivot
    }

    /// Overwrite the MAC-table attributes; manufacturer and comment are kept.
    pub(crate) fn apply(&mut self, entry: &MacEntryRecord) {
        self.vlan_id = entry.vlan_id.clone();
        self.entry_type = entry.entry_type.clone();
        self.age = entry.age.clone();
        self.secure = entry.secure.clone();
        self.ntfy = entry.ntfy.clone();
        self.ports = entry.ports.clone();
        self.updated_at = Utc::now();
    }
}

/// An interface on one device.
#[derive(Debug, Clone, Serialize)]
pub struct Interface {
    pub id: InterfaceId,
    pub device_id: DeviceId,
    pub record: InterfaceRecord,
    pub neighbor: NeighborInfo,

    /// MACs observed behind this interface.
    pub macs: BTreeSet<MacId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Interface {
    /// Full interface name.
    pub fn name(&self) -> &str {
        &self.record.interface
    }

    /// Whether `name` is this interface's full or short name.
    pub fn is_named(&self, name: &str) -> bool {
        self.record.interface == name || self.record.interface_short == name
    }
}

/// Immutable observation of a MAC on a device during one walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryRecord {
    pub id: u64,
    pub walk_id: WalkId,
    pub mac_id: MacId,
    pub device_id: DeviceId,
    pub interface_id: Option<InterfaceId>,
    pub discovered_at: DateTime<Utc>,
    pub vlan_id: Option<String>,
    pub entry_type: Option<String>,
    pub age: Option<String>,
    pub secure: Option<String>,
    pub ntfy: Option<String>,
    pub ports: Option<String>,
    pub manufacturer: Option<String>,
}
