//! Vendor output normalization.
//!
//! The command executor returns parser rows whose field names depend on the
//! vendor. This module maps them into one canonical schema per entity type
//! so the merge layer never looks at vendor field names.

mod common;
mod definition;
pub mod fields;
mod record;
mod registry;
pub mod vendors;

pub use definition::{
    DescriptionFn, InterfaceFn, MacEntryFn, NeighborFn, VendorNormalizer, VersionFn, WalkCommands,
};
pub use record::{
    DescriptionRecord, InterfaceRecord, MacEntryRecord, NeighborInfo, NeighborRecord, VersionInfo,
};
pub use registry::NormalizerRegistry;

/// One structured row from the command executor.
pub type Row = serde_json::Map<String, serde_json::Value>;
