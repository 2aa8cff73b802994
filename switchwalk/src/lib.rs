//! # Switchwalk
//!
//! Async inventory of network switches.
//!
//! Switchwalk logs into managed devices, runs a fixed sequence of show
//! commands through an external structured-output executor, normalizes the
//! vendor-specific rows and merges them into a shared in-memory
//! [`Inventory`]: which MAC is behind which port, which neighbor sits on
//! which interface, and a history of every walk.
//!
//! ## Features
//!
//! - Per-device walk state machine with fan-out/fan-in batches on tokio
//! - Busy rejection: a device is never walked twice at once
//! - Vendor normalizers for Cisco IOS and NX-OS, extensible at runtime
//! - Idempotent merge of MACs, pivots, interfaces and neighbors
//! - Shared interactive SSH sessions via russh, with per-device event
//!   broadcast and a line-delimited JSON terminal relay
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchwalk::{Inventory, NewDevice, OuiLookup, ProcessExecutor, WalkerBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), switchwalk::Error> {
//!     let inventory = Arc::new(Inventory::new());
//!     let device = inventory.add_device(
//!         NewDevice::new("192.168.1.1", "cisco_ios").credentials("admin", "secret"),
//!     );
//!
//!     let walker = WalkerBuilder::new(inventory.clone())
//!         .executor(ProcessExecutor::new("python3").arg("netmiko_command.py"))
//!         .lookup(OuiLookup::new()?)
//!         .build()?;
//!
//!     if let Some(outcome) = walker.walk(device).await? {
//!         println!("{:?}: {} MACs", outcome.state, inventory.pivots_for(device).len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod lookup;
pub mod merge;
pub mod normalize;
pub mod session;
pub mod transport;
pub mod walk;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use executor::{CommandExecutor, CommandRequest, ProcessExecutor};
pub use inventory::{DeviceId, Inventory, NewDevice, WalkHistory, WalkResult};
pub use lookup::{ManufacturerLookup, OuiLookup};
pub use normalize::{NormalizerRegistry, VendorNormalizer};
pub use session::{EventBus, SessionLease, SessionManager, TerminalRelay};
pub use transport::{SshConfig, SshConnector};
pub use walk::{WalkAdmission, WalkOutcome, WalkState, Walker, WalkerBuilder};
