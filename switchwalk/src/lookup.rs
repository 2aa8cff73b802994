//! Manufacturer lookup for MAC addresses.

use std::fmt;

use log::debug;
use mac_oui::Oui;

use crate::error::{Error, Result};

/// Manufacturer resolved from a MAC prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manufacturer {
    /// Short vendor name.
    pub name: Option<String>,

    /// Longer vendor description, when the database has one.
    pub comment: Option<String>,
}

/// Resolves the manufacturer of a MAC address.
///
/// Lookups are in-process and cheap; they run inside enrichment units.
pub trait ManufacturerLookup: Send + Sync {
    fn lookup(&self, mac: &str) -> Manufacturer;
}

/// Lookup against the bundled IEEE OUI database.
pub struct OuiLookup {
    db: Oui,
}

impl OuiLookup {
    /// Load the bundled database.
    pub fn new() -> Result<Self> {
        let db = Oui::default().map_err(|e| Error::Lookup(e.to_string()))?;
        Ok(Self { db })
    }
}

impl fmt::Debug for OuiLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OuiLookup").finish_non_exhaustive()
    }
}

impl ManufacturerLookup for OuiLookup {
    fn lookup(&self, mac: &str) -> Manufacturer {
        match self.db.lookup_by_mac(mac) {
            Ok(Some(entry)) => Manufacturer {
                name: Some(entry.company_name.clone()),
                comment: None,
            },
            Ok(None) => Manufacturer::default(),
            Err(e) => {
                debug!("OUI lookup failed for {}: {}", mac, e);
                Manufacturer::default()
            }
        }
    }
}
