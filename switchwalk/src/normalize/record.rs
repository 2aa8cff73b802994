//! Canonical records produced by the normalizers.

use serde::Serialize;

/// Version and platform attributes reported by `show version`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub hostname: Option<String>,
    pub uptime: Option<String>,
    pub last_reboot_reason: Option<String>,
    pub bios: Option<String>,
    pub os: Option<String>,
    pub boot_image: Option<String>,
    pub platform: Option<String>,
    pub serial: Option<String>,
}

/// One learned MAC address from the device's MAC table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacEntryRecord {
    /// Canonical `aa:bb:cc:dd:ee:ff` form.
    pub mac_address: String,

    /// VLAN id; unset when the device reports the entry on all VLANs.
    pub vlan_id: Option<String>,

    /// Lower-case entry type (`dynamic`, `static`, `secure`, ...).
    pub entry_type: Option<String>,

    pub age: Option<String>,
    pub secure: Option<String>,
    pub ntfy: Option<String>,

    /// Comma-joined port list.
    pub ports: Option<String>,
}

/// One interface from `show interface`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceRecord {
    /// Full interface name, unique per device.
    pub interface: String,

    /// Abbreviated name as used in MAC tables and descriptions.
    pub interface_short: String,

    pub link_status: Option<String>,
    pub admin_state: Option<String>,
    pub hardware_type: Option<String>,
    pub mac_address: Option<String>,
    pub bia: Option<String>,
    pub description: Option<String>,
    pub ip_address: Option<String>,
    pub prefix_length: Option<String>,
    pub mtu: Option<String>,
    pub mode: Option<String>,
    pub duplex: Option<String>,
    pub speed: Option<String>,
    pub input_packets: Option<String>,
    pub output_packets: Option<String>,
    pub input_errors: Option<String>,
    pub output_errors: Option<String>,
    pub bandwidth: Option<String>,
    pub delay: Option<String>,
    pub encapsulation: Option<String>,
    pub last_link_flapped: Option<String>,
    pub vlan_id: Option<String>,
    pub packet_input_rate: Option<String>,
    pub packet_output_rate: Option<String>,
    pub bandwidth_input_rate: Option<String>,
    pub bandwidth_output_rate: Option<String>,
    pub media_type: Option<String>,
}

/// One row of `show interface description`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptionRecord {
    /// Interface name as printed, usually the short form.
    pub port: String,
    pub description: String,
}

/// Neighbor-discovery fields stored on an interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NeighborInfo {
    pub chassis_id: Option<String>,
    pub name: Option<String>,
    pub mgmt_address: Option<String>,
    pub platform: Option<String>,
    pub interface: Option<String>,
    pub description: Option<String>,
    pub interface_ip: Option<String>,
    pub capabilities: Option<String>,
}

impl NeighborInfo {
    /// Whether no neighbor field is set.
    pub fn is_empty(&self) -> bool {
        *self == NeighborInfo::default()
    }
}

/// One CDP neighbor, attached to the local interface it was heard on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeighborRecord {
    pub local_interface: String,
    pub neighbor: NeighborInfo,
}
