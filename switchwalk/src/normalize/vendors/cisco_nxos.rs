//! Cisco NX-OS normalizer.
//!
//! NX-OS templates already use the canonical field names: the MAC table
//! reports `type` in lower case alongside explicit `age`, `secure`, `ntfy`
//! and `ports` columns.
//!
//! ```text
//!    VLAN     MAC Address      Type      age     Secure NTFY Ports
//! ---------+-----------------+--------+---------+------+----+------------------
//! *  100     0050.56c0.0001   dynamic  0         F      F    Eth1/1
//! ```

use crate::error::NormalizeError;
use crate::normalize::fields::{canonical_mac, required, text};
use crate::normalize::{MacEntryRecord, Row, VendorNormalizer, WalkCommands};

/// Create the NX-OS normalizer.
pub fn normalizer() -> VendorNormalizer {
    VendorNormalizer::new("cisco_nxos", mac_entry).with_commands(WalkCommands {
        // Port-channel members are learned again on the physical ports.
        mac_table: "show mac address-table | exclude Po".to_string(),
        ..WalkCommands::default()
    })
}

fn mac_entry(row: &Row) -> Result<MacEntryRecord, NormalizeError> {
    Ok(MacEntryRecord {
        mac_address: canonical_mac(&required(row, &["mac_address"])?)?,
        vlan_id: text(row, "vlan_id"),
        entry_type: text(row, "type"),
        age: text(row, "age"),
        secure: text(row, "secure"),
        ntfy: text(row, "ntfy"),
        ports: text(row, "ports"),
    })
}
