//! Field extraction helpers shared by all vendor normalizers.
//!
//! Parser output is loosely typed: the same field may arrive as a string,
//! a number, a list of strings, or an empty string when the template did
//! not capture it. These helpers collapse all of that into `Option<String>`
//! where "absent" always means `None`, never `""` or `0`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::Row;
use crate::error::NormalizeError;

/// Cisco dotted (`0050.56c0.0001`), colon or dash separated, or bare hex.
static MAC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[[:xdigit:]]{4}\.[[:xdigit:]]{4}\.[[:xdigit:]]{4}|[[:xdigit:]]{2}(?::[[:xdigit:]]{2}){5}|[[:xdigit:]]{2}(?:-[[:xdigit:]]{2}){5}|[[:xdigit:]]{12})$",
    )
    .unwrap()
});

/// Interface name prefixes and their abbreviations, longest first.
const INTERFACE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("hundredgigabitethernet", "Hu"),
    ("fortygigabitethernet", "Fo"),
    ("twentyfivegigabitethernet", "Twe"),
    ("tengigabitethernet", "Te"),
    ("fivegigabitethernet", "Fi"),
    ("twogigabitethernet", "Tw"),
    ("gigabitethernet", "Gi"),
    ("hundredgige", "Hu"),
    ("twentyfivegige", "Twe"),
    ("fastethernet", "Fa"),
    ("port-channel", "Po"),
    ("portchannel", "Po"),
    ("ethernet", "Eth"),
    ("loopback", "Lo"),
    ("tunnel", "Tu"),
    ("vlan", "Vl"),
];

/// Read a field as text. Lists are comma-joined; empty values are absent.
pub fn text(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(value_text)
}

/// Read the first present field among `keys`.
pub fn text_any(row: &Row, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text(row, key))
}

/// Read a field that must be present, trying aliases in order.
pub fn required(row: &Row, keys: &[&str]) -> Result<String, NormalizeError> {
    text_any(row, keys).ok_or_else(|| NormalizeError::MissingField {
        field: keys.first().copied().unwrap_or_default().to_string(),
    })
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_text).collect();
            (!parts.is_empty()).then(|| parts.join(","))
        }
        Value::Null | Value::Object(_) => None,
    }
}

/// Canonicalize a MAC address to lower-case colon notation.
///
/// Accepts Cisco dotted, colon or dash separated, and bare hex forms.
pub fn canonical_mac(value: &str) -> Result<String, NormalizeError> {
    let value = value.trim();
    if !MAC_PATTERN.is_match(value) {
        return Err(NormalizeError::InvalidMac {
            value: value.to_string(),
        });
    }

    let digits: Vec<char> = value
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let octets: Vec<String> = digits.chunks(2).map(|pair| pair.iter().collect()).collect();
    Ok(octets.join(":"))
}

/// Abbreviate an interface name (`GigabitEthernet1/0/1` → `Gi1/0/1`).
///
/// Names that are already short, or use an unknown prefix, are returned
/// unchanged.
pub fn short_interface_name(name: &str) -> String {
    let name = name.trim();
    let Some(split) = name.find(|c: char| c.is_ascii_digit()) else {
        return name.to_string();
    };
    let (prefix, rest) = name.split_at(split);
    let prefix = prefix.trim_end().to_ascii_lowercase();

    INTERFACE_ABBREVIATIONS
        .iter()
        .find(|(full, _)| *full == prefix)
        .map(|(_, short)| format!("{short}{rest}"))
        .unwrap_or_else(|| name.to_string())
}
