//! Builder for creating walkers.

use std::sync::Arc;
use std::time::Duration;

use super::{BatchFailurePolicy, WalkConfig, Walker};
use crate::error::{Result, WalkError};
use crate::executor::CommandExecutor;
use crate::inventory::Inventory;
use crate::lookup::ManufacturerLookup;
use crate::normalize::{NormalizerRegistry, VendorNormalizer};

/// Builder for constructing a [`Walker`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use switchwalk::{Inventory, OuiLookup, ProcessExecutor, WalkerBuilder};
///
/// # fn example() -> Result<(), switchwalk::Error> {
/// let walker = WalkerBuilder::new(Arc::new(Inventory::new()))
///     .executor(ProcessExecutor::new("/usr/local/bin/netmiko-json"))
///     .lookup(OuiLookup::new()?)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct WalkerBuilder {
    inventory: Arc<Inventory>,
    executor: Option<Arc<dyn CommandExecutor>>,
    lookup: Option<Arc<dyn ManufacturerLookup>>,
    registry: NormalizerRegistry,
    extra_vendors: Vec<VendorNormalizer>,
    config: WalkConfig,
}

impl WalkerBuilder {
    /// Create a builder over the given inventory with the built-in vendors.
    pub fn new(inventory: Arc<Inventory>) -> Self {
        Self {
            inventory,
            executor: None,
            lookup: None,
            registry: NormalizerRegistry::builtin(),
            extra_vendors: Vec::new(),
            config: WalkConfig::default(),
        }
    }

    /// Set the command executor.
    pub fn executor(mut self, executor: impl CommandExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Set a shared command executor.
    pub fn shared_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the manufacturer lookup.
    pub fn lookup(mut self, lookup: impl ManufacturerLookup + 'static) -> Self {
        self.lookup = Some(Arc::new(lookup));
        self
    }

    /// Replace the vendor registry.
    pub fn registry(mut self, registry: NormalizerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add a vendor on top of the registry.
    pub fn vendor(mut self, normalizer: VendorNormalizer) -> Self {
        self.extra_vendors.push(normalizer);
        self
    }

    /// Set the per-command timeout (default: 60s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set what a failed batch unit does to the walk (default: continue).
    pub fn failure_policy(mut self, policy: BatchFailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Set the whole walk configuration.
    pub fn config(mut self, config: WalkConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the walker.
    pub fn build(self) -> Result<Walker> {
        let executor = self.executor.ok_or_else(|| WalkError::InvalidConfig {
            message: "Command executor is required".to_string(),
        })?;
        let lookup = self.lookup.ok_or_else(|| WalkError::InvalidConfig {
            message: "Manufacturer lookup is required".to_string(),
        })?;
        if self.config.command_timeout.is_zero() {
            return Err(WalkError::InvalidConfig {
                message: "Command timeout must be non-zero".to_string(),
            }
            .into());
        }

        let mut registry = self.registry;
        for normalizer in self.extra_vendors {
            registry.register(normalizer)?;
        }

        Ok(Walker {
            inventory: self.inventory,
            executor,
            lookup,
            registry: Arc::new(registry),
            config: self.config,
        })
    }
}
