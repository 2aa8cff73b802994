//! Vendor normalizer definition.

use std::fmt;

use super::Row;
use super::common;
use super::record::{
    DescriptionRecord, InterfaceRecord, MacEntryRecord, NeighborRecord, VersionInfo,
};
use crate::error::NormalizeError;

/// Maps a `show version` row.
pub type VersionFn = fn(&Row) -> Result<VersionInfo, NormalizeError>;

/// Maps a MAC-table row.
pub type MacEntryFn = fn(&Row) -> Result<MacEntryRecord, NormalizeError>;

/// Maps a `show interface` row.
pub type InterfaceFn = fn(&Row) -> Result<InterfaceRecord, NormalizeError>;

/// Maps an interface description row; `None` skips the row.
pub type DescriptionFn = fn(&Row) -> Option<DescriptionRecord>;

/// Maps a CDP neighbor row.
pub type NeighborFn = fn(&Row) -> Result<NeighborRecord, NormalizeError>;

/// Command strings issued at each walk step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkCommands {
    pub version: String,
    pub interfaces: String,
    pub mac_table: String,
    pub descriptions: String,
    pub neighbors: String,
}

impl Default for WalkCommands {
    fn default() -> Self {
        Self {
            version: "show version".to_string(),
            interfaces: "show interface".to_string(),
            mac_table: "show mac address-table".to_string(),
            descriptions: "show interface description".to_string(),
            neighbors: "show cdp neighbors detail".to_string(),
        }
    }
}

/// Everything vendor-specific about walking one kind of device: the command
/// strings and one pure mapping function per entity type.
///
/// Only the MAC-table mapping is mandatory; the others default to the shared
/// extraction in [`common`].
#[derive(Clone)]
pub struct VendorNormalizer {
    /// Device-type tag (e.g., "cisco_nxos", "cisco_ios").
    pub name: String,

    /// Commands for each walk step.
    pub commands: WalkCommands,

    version: VersionFn,
    mac_entry: MacEntryFn,
    interface: InterfaceFn,
    description: DescriptionFn,
    neighbor: NeighborFn,
}

impl VendorNormalizer {
    /// Create a normalizer with the vendor's MAC-table mapping.
    pub fn new(name: impl Into<String>, mac_entry: MacEntryFn) -> Self {
        Self {
            name: name.into(),
            commands: WalkCommands::default(),
            version: common::version,
            mac_entry,
            interface: common::interface,
            description: common::description,
            neighbor: common::neighbor,
        }
    }

    /// Set the walk commands.
    pub fn with_commands(mut self, commands: WalkCommands) -> Self {
        self.commands = commands;
        self
    }

    /// Override the version mapping.
    pub fn with_version(mut self, version: VersionFn) -> Self {
        self.version = version;
        self
    }

    /// Override the interface mapping.
    pub fn with_interface(mut self, interface: InterfaceFn) -> Self {
        self.interface = interface;
        self
    }

    /// Override the description mapping.
    pub fn with_description(mut self, description: DescriptionFn) -> Self {
        self.description = description;
        self
    }

    /// Override the neighbor mapping.
    pub fn with_neighbor(mut self, neighbor: NeighborFn) -> Self {
        self.neighbor = neighbor;
        self
    }

    pub fn version(&self, row: &Row) -> Result<VersionInfo, NormalizeError> {
        (self.version)(row)
    }

    pub fn mac_entry(&self, row: &Row) -> Result<MacEntryRecord, NormalizeError> {
        (self.mac_entry)(row)
    }

    pub fn interface(&self, row: &Row) -> Result<InterfaceRecord, NormalizeError> {
        (self.interface)(row)
    }

    pub fn description(&self, row: &Row) -> Option<DescriptionRecord> {
        (self.description)(row)
    }

    pub fn neighbor(&self, row: &Row) -> Result<NeighborRecord, NormalizeError> {
        (self.neighbor)(row)
    }
}

impl fmt::Debug for VendorNormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorNormalizer")
            .field("name", &self.name)
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}
