//! Registry of vendor normalizers keyed by device-type tag.

use indexmap::IndexMap;

use super::definition::VendorNormalizer;
use super::vendors;
use crate::error::{NormalizeError, Result};

/// Strategy table of vendor normalizers.
///
/// Supporting a new vendor means registering one more [`VendorNormalizer`];
/// nothing else in the walk branches on the vendor.
#[derive(Debug, Clone, Default)]
pub struct NormalizerRegistry {
    vendors: IndexMap<String, VendorNormalizer>,
}

impl NormalizerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            vendors: IndexMap::new(),
        }
    }

    /// Create a registry holding the built-in vendors.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for normalizer in [vendors::cisco_nxos::normalizer(), vendors::cisco_ios::normalizer()] {
            registry.vendors.insert(normalizer.name.clone(), normalizer);
        }
        registry
    }

    /// Register a vendor normalizer.
    pub fn register(&mut self, normalizer: VendorNormalizer) -> Result<()> {
        if self.vendors.contains_key(&normalizer.name) {
            return Err(NormalizeError::AlreadyRegistered {
                vendor: normalizer.name.clone(),
            }
            .into());
        }
        self.vendors.insert(normalizer.name.clone(), normalizer);
        Ok(())
    }

    /// Look up the normalizer for a device type.
    ///
    /// An unknown tag is a configuration error; there is no fallback vendor.
    pub fn get(&self, vendor: &str) -> std::result::Result<&VendorNormalizer, NormalizeError> {
        self.vendors
            .get(vendor)
            .ok_or_else(|| NormalizeError::UnsupportedVendor {
                vendor: vendor.to_string(),
            })
    }

    /// Check if a vendor is registered.
    pub fn contains(&self, vendor: &str) -> bool {
        self.vendors.contains_key(vendor)
    }

    /// Registered vendor tags, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vendors.keys().map(String::as_str)
    }
}
