//! Typed extraction shared by every vendor.
//!
//! Interface, description and neighbor rows use the same field names across
//! the supported parsers, give or take a few aliases, so vendors only
//! override these when their shape really differs.

use super::Row;
use super::fields::{required, short_interface_name, text, text_any};
use super::record::{
    DescriptionRecord, InterfaceRecord, NeighborInfo, NeighborRecord, VersionInfo,
};
use crate::error::NormalizeError;

/// `show version` with canonical field names.
pub fn version(row: &Row) -> Result<VersionInfo, NormalizeError> {
    Ok(VersionInfo {
        hostname: text(row, "hostname"),
        uptime: text(row, "uptime"),
        last_reboot_reason: text(row, "last_reboot_reason"),
        bios: text(row, "bios"),
        os: text(row, "os"),
        boot_image: text(row, "boot_image"),
        platform: text(row, "platform"),
        serial: text(row, "serial"),
    })
}

/// `show interface`. Only the interface name is required.
pub fn interface(row: &Row) -> Result<InterfaceRecord, NormalizeError> {
    let interface = required(row, &["interface"])?;
    let interface_short =
        text(row, "interface_short").unwrap_or_else(|| short_interface_name(&interface));

    Ok(InterfaceRecord {
        interface_short,
        link_status: text(row, "link_status"),
        admin_state: text_any(row, &["admin_state", "protocol_status"]),
        hardware_type: text(row, "hardware_type"),
        mac_address: text_any(row, &["mac_address", "address"]),
        bia: text(row, "bia"),
        description: text(row, "description"),
        ip_address: text(row, "ip_address"),
        prefix_length: text(row, "prefix_length"),
        mtu: text(row, "mtu"),
        mode: text(row, "mode"),
        duplex: text(row, "duplex"),
        speed: text(row, "speed"),
        input_packets: text(row, "input_packets"),
        output_packets: text(row, "output_packets"),
        input_errors: text(row, "input_errors"),
        output_errors: text(row, "output_errors"),
        bandwidth: text(row, "bandwidth"),
        delay: text(row, "delay"),
        encapsulation: text(row, "encapsulation"),
        last_link_flapped: text(row, "last_link_flapped"),
        vlan_id: text(row, "vlan_id"),
        packet_input_rate: text(row, "packet_input_rate"),
        packet_output_rate: text(row, "packet_output_rate"),
        bandwidth_input_rate: text(row, "bandwidth_input_rate"),
        bandwidth_output_rate: text(row, "bandwidth_output_rate"),
        media_type: text(row, "media_type"),
        interface,
    })
}

/// `show interface description`. Rows without a port or description are
/// not actionable and yield `None`.
pub fn description(row: &Row) -> Option<DescriptionRecord> {
    let port = text_any(row, &["port", "interface"])?;
    let description = text_any(row, &["description", "descrip"])?;
    Some(DescriptionRecord { port, description })
}

/// `show cdp neighbors detail`.
pub fn neighbor(row: &Row) -> Result<NeighborRecord, NormalizeError> {
    let local_interface = required(row, &["local_interface", "local_port"])?;

    Ok(NeighborRecord {
        local_interface,
        neighbor: NeighborInfo {
            chassis_id: text(row, "chassis_id"),
            name: text_any(row, &["neighbor_name", "neighbor", "destination_host", "dest_host"]),
            mgmt_address: text_any(row, &["mgmt_address", "management_ip", "management_address"]),
            platform: text(row, "platform"),
            interface: text_any(row, &["neighbor_interface", "remote_port"]),
            description: text_any(row, &["neighbor_description", "software_version", "version"]),
            interface_ip: text(row, "interface_ip"),
            capabilities: text(row, "capabilities"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_interface_missing_optionals_are_absent() {
        let record = interface(&row(json!({
            "interface": "Ethernet1/1",
            "link_status": "up",
            "speed": "",
            "mtu": 9216,
        })))
        .unwrap();

        assert_eq!(record.interface, "Ethernet1/1");
        assert_eq!(record.interface_short, "Eth1/1");
        assert_eq!(record.link_status.as_deref(), Some("up"));
        assert_eq!(record.mtu.as_deref(), Some("9216"));
        assert_eq!(record.speed, None);
        assert_eq!(record.duplex, None);
    }

    #[test]
    fn test_interface_keeps_supplied_short_name() {
        let record = interface(&row(json!({
            "interface": "GigabitEthernet1/0/1",
            "interface_short": "Gi1/0/1",
            "address": "0050.56c0.0001",
        })))
        .unwrap();
        assert_eq!(record.interface_short, "Gi1/0/1");
        assert_eq!(record.mac_address.as_deref(), Some("0050.56c0.0001"));
    }

    #[test]
    fn test_interface_requires_name() {
        assert!(interface(&row(json!({"link_status": "up"}))).is_err());
    }

    #[test]
    fn test_description_skips_incomplete_rows() {
        assert!(description(&row(json!({"port": "Eth1/1"}))).is_none());
        let record = description(&row(json!({"port": "Eth1/1", "description": "uplink"}))).unwrap();
        assert_eq!(record.port, "Eth1/1");
        assert_eq!(record.description, "uplink");
    }

    #[test]
    fn test_neighbor_aliases() {
        let record = neighbor(&row(json!({
            "local_interface": "Ethernet1/49",
            "destination_host": "core-1",
            "remote_port": "Ethernet2/1",
            "management_ip": "10.0.0.1",
            "capabilities": "Router Switch",
        })))
        .unwrap();

        assert_eq!(record.local_interface, "Ethernet1/49");
        assert_eq!(record.neighbor.name.as_deref(), Some("core-1"));
        assert_eq!(record.neighbor.interface.as_deref(), Some("Ethernet2/1"));
        assert_eq!(record.neighbor.mgmt_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(record.neighbor.platform, None);
    }
}
