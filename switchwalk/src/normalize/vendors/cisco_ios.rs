//! Cisco IOS / IOS-XE normalizer.
//!
//! IOS reports MAC entries as a `destination_address` / `destination_port`
//! pair, with the port as a list and upper-case types. CPU entries carry
//! `All` in the VLAN column, which means "no VLAN".
//!
//! ```text
//!           Mac Address Table
//! -------------------------------------------
//! Vlan    Mac Address       Type        Ports
//! ----    -----------       --------    -----
//!  All    0100.0ccc.cccc    STATIC      CPU
//!   10    0050.56c0.0001    DYNAMIC     Gi1/0/1
//! ```

use crate::error::NormalizeError;
use crate::normalize::fields::{canonical_mac, required, text, text_any};
use crate::normalize::{MacEntryRecord, Row, VendorNormalizer, VersionInfo, WalkCommands};

/// Create the IOS normalizer.
pub fn normalizer() -> VendorNormalizer {
    VendorNormalizer::new("cisco_ios", mac_entry)
        .with_version(version)
        .with_commands(WalkCommands {
            interfaces: "show interfaces".to_string(),
            descriptions: "show interfaces description".to_string(),
            ..WalkCommands::default()
        })
}

fn mac_entry(row: &Row) -> Result<MacEntryRecord, NormalizeError> {
    let vlan_id = text(row, "vlan_id").filter(|vlan| !vlan.eq_ignore_ascii_case("all"));

    Ok(MacEntryRecord {
        mac_address: canonical_mac(&required(row, &["destination_address", "mac_address"])?)?,
        vlan_id,
        entry_type: text(row, "type").map(|t| t.to_ascii_lowercase()),
        age: None,
        secure: None,
        ntfy: None,
        ports: text_any(row, &["destination_port", "ports"]),
    })
}

fn version(row: &Row) -> Result<VersionInfo, NormalizeError> {
    Ok(VersionInfo {
        hostname: text(row, "hostname"),
        uptime: text(row, "uptime"),
        last_reboot_reason: text(row, "reload_reason"),
        bios: text(row, "rommon"),
        os: text(row, "version"),
        boot_image: text(row, "running_image"),
        platform: text(row, "hardware"),
        serial: text(row, "serial"),
    })
}
