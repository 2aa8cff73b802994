//! Device walk orchestration.
//!
//! A walk runs the steps
//!
//! ```text
//! Idle → Starting → FetchingVersion → FetchingInterfaces → FetchingMacTable
//!      → EnrichingMacs → FetchingDescriptions → FetchingNeighbors → Completed
//! ```
//!
//! in order. Each fetch step issues one command through the executor and
//! fans out one normalize-and-merge unit per returned row as a [`Batch`];
//! the next step starts only after the batch has drained. Any executor
//! failure ends the walk in `Failed`. Whatever happens, the device's
//! `syncing` flag is cleared and a [`WalkHistory`] row is written.

mod batch;
mod builder;
mod config;

pub use batch::{Batch, BatchReport, UnitFailure};
pub use builder::WalkerBuilder;
pub use config::{BatchFailurePolicy, WalkConfig};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::error::{ExecutorError, NormalizeError, Result, WalkError};
use crate::executor::{CommandExecutor, CommandRequest, ConnectionParams};
use crate::inventory::{DeviceId, Inventory, MacId, WalkHistory, WalkId, WalkResult};
use crate::lookup::ManufacturerLookup;
use crate::merge::{self, MergeOutcome};
use crate::normalize::{NormalizerRegistry, Row};

/// Position of a walk in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkState {
    Idle,
    Starting,
    FetchingVersion,
    FetchingInterfaces,
    FetchingMacTable,
    EnrichingMacs,
    FetchingDescriptions,
    FetchingNeighbors,
    Completed,
    Failed,
}

/// What one step of a walk did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub state: WalkState,

    /// Rows (or, for enrichment, MACs) handed to the step.
    pub rows: usize,

    pub succeeded: usize,
    pub failed: usize,
}

/// Final outcome of a walk.
#[derive(Debug, Clone)]
pub struct WalkOutcome {
    pub walk_id: WalkId,
    pub device_id: DeviceId,

    /// `Completed` or `Failed`.
    pub state: WalkState,

    /// The step that was running when the walk failed.
    pub failed_at: Option<WalkState>,

    /// Reports of the steps that finished, in order.
    pub steps: Vec<StepReport>,

    /// The history row written for this walk.
    pub history: WalkHistory,
}

impl WalkOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == WalkState::Completed
    }

    /// Report of a finished step.
    pub fn step(&self, state: WalkState) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.state == state)
    }
}

/// Answer to a walk request.
#[derive(Debug)]
pub enum WalkAdmission {
    /// The walk is running; the handle resolves to its outcome.
    Accepted(JoinHandle<WalkOutcome>),

    /// A walk is already running for the device. Nothing was changed.
    Busy,
}

impl WalkAdmission {
    pub fn is_busy(&self) -> bool {
        matches!(self, WalkAdmission::Busy)
    }
}

/// Runs walks against the devices of an inventory.
#[derive(Clone)]
pub struct Walker {
    inventory: Arc<Inventory>,
    executor: Arc<dyn CommandExecutor>,
    lookup: Arc<dyn ManufacturerLookup>,
    registry: Arc<NormalizerRegistry>,
    config: WalkConfig,
}

impl Walker {
    /// The inventory walks merge into.
    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }

    pub fn config(&self) -> &WalkConfig {
        &self.config
    }

    pub fn registry(&self) -> &NormalizerRegistry {
        &self.registry
    }

    /// Start a walk in the background.
    ///
    /// Returns [`WalkAdmission::Busy`] without side effects if the device is
    /// already walking. Must be called from within a tokio runtime.
    pub fn start_walk(&self, device_id: DeviceId) -> Result<WalkAdmission> {
        let Some(claim) = self.claim(device_id)? else {
            return Ok(WalkAdmission::Busy);
        };
        let walker = self.clone();
        Ok(WalkAdmission::Accepted(tokio::spawn(async move {
            walker.run(claim).await
        })))
    }

    /// Run a walk on the current task. Returns `None` if the device is
    /// already walking.
    pub async fn walk(&self, device_id: DeviceId) -> Result<Option<WalkOutcome>> {
        match self.claim(device_id)? {
            Some(claim) => Ok(Some(self.run(claim).await)),
            None => Ok(None),
        }
    }

    /// Start a walk for every device in the inventory.
    ///
    /// Walks are independent; a busy device is reported as such and does
    /// not affect the others.
    pub fn walk_all(&self) -> Vec<(DeviceId, Result<WalkAdmission>)> {
        self.inventory
            .devices()
            .into_iter()
            .map(|device| (device.id, self.start_walk(device.id)))
            .collect()
    }

    /// Idle → Starting: claim the device.
    fn claim(&self, device_id: DeviceId) -> Result<Option<SyncClaim>> {
        if !self.inventory.try_begin_sync(device_id)? {
            info!("device {} is already walking", device_id);
            return Ok(None);
        }
        Ok(Some(SyncClaim {
            inventory: self.inventory.clone(),
            walk_id: self.inventory.next_walk_id(),
            device_id,
            armed: true,
        }))
    }

    async fn run(&self, mut claim: SyncClaim) -> WalkOutcome {
        let (walk_id, device_id) = (claim.walk_id, claim.device_id);
        info!("walk {} started for device {}", walk_id, device_id);

        let mut progress = Progress {
            walk_id,
            state: WalkState::Starting,
            steps: Vec::new(),
        };
        let result = self.run_steps(walk_id, device_id, &mut progress).await;
        claim.armed = false;

        let (state, failed_at, walk_result, error_message) = match result {
            Ok(()) => (WalkState::Completed, None, WalkResult::Completed, None),
            Err(e) => {
                warn!(
                    "walk {} for device {} failed in {:?}: {}",
                    walk_id, device_id, progress.state, e
                );
                (
                    WalkState::Failed,
                    Some(progress.state),
                    WalkResult::Failed,
                    Some(e.to_string()),
                )
            }
        };

        self.inventory
            .finish_sync(device_id, walk_result == WalkResult::Completed);
        let history = self
            .inventory
            .history()
            .record(walk_id, device_id, walk_result, error_message);
        info!("walk {} for device {} ended: {:?}", walk_id, device_id, state);

        WalkOutcome {
            walk_id,
            device_id,
            state,
            failed_at,
            steps: progress.steps,
            history,
        }
    }

    async fn run_steps(
        &self,
        walk_id: WalkId,
        device_id: DeviceId,
        progress: &mut Progress,
    ) -> Result<()> {
        let device = self
            .inventory
            .device(device_id)
            .ok_or(WalkError::UnknownDevice(device_id))?;
        let vendor = Arc::new(self.registry.get(&device.device_type)?.clone());
        let commands = vendor.commands.clone();
        let params = ConnectionParams::from(&device);

        // Version: first row only, no batch.
        progress.enter(WalkState::FetchingVersion);
        let rows = self.fetch(&params, &commands.version).await?;
        let first = rows.first().ok_or_else(|| NormalizeError::EmptyResponse {
            command: commands.version.clone(),
        })?;
        merge::merge_version(&self.inventory, device_id, vendor.version(first)?)?;
        progress.record(rows.len(), 1, 0);

        progress.enter(WalkState::FetchingInterfaces);
        let rows = self.fetch(&params, &commands.interfaces).await?;
        let mut batch = self.batch(walk_id, "interfaces");
        for row in rows {
            let inventory = self.inventory.clone();
            let vendor = vendor.clone();
            batch.spawn(async move {
                let record = vendor.interface(&row)?;
                Ok(merge::merge_interface(&inventory, device_id, record)?)
            });
        }
        self.drain(batch, progress).await?;

        progress.enter(WalkState::FetchingMacTable);
        let rows = self.fetch(&params, &commands.mac_table).await?;
        let mut batch = self.batch(walk_id, "mac table");
        for row in rows {
            let inventory = self.inventory.clone();
            let vendor = vendor.clone();
            batch.spawn(async move {
                let entry = vendor.mac_entry(&row)?;
                let (mac_id, _) = merge::merge_mac_entry(&inventory, device_id, &entry)?;
                Ok((mac_id, entry.mac_address))
            });
        }
        // A MAC listed twice has one pivot; enrich it once.
        let learned: BTreeMap<MacId, String> =
            self.drain(batch, progress).await?.into_iter().collect();

        progress.enter(WalkState::EnrichingMacs);
        let mut batch = self.batch(walk_id, "enrichment");
        for (mac_id, address) in learned {
            let inventory = self.inventory.clone();
            let lookup = self.lookup.clone();
            batch.spawn(async move {
                Ok(merge::enrich_mac(
                    &inventory, &*lookup, walk_id, device_id, mac_id, &address,
                )?)
            });
        }
        self.drain(batch, progress).await?;

        progress.enter(WalkState::FetchingDescriptions);
        let rows = self.fetch(&params, &commands.descriptions).await?;
        let mut batch = self.batch(walk_id, "descriptions");
        for row in rows {
            let inventory = self.inventory.clone();
            let vendor = vendor.clone();
            batch.spawn(async move {
                match vendor.description(&row) {
                    Some(record) => Ok(merge::apply_description(&inventory, device_id, record)?),
                    None => Ok(MergeOutcome::Skipped),
                }
            });
        }
        self.drain(batch, progress).await?;

        progress.enter(WalkState::FetchingNeighbors);
        let rows = self.fetch(&params, &commands.neighbors).await?;
        let mut batch = self.batch(walk_id, "neighbors");
        for row in rows {
            let inventory = self.inventory.clone();
            let vendor = vendor.clone();
            batch.spawn(async move {
                let record = vendor.neighbor(&row)?;
                Ok(merge::apply_neighbor(&inventory, device_id, record)?)
            });
        }
        self.drain(batch, progress).await?;

        Ok(())
    }

    /// Run one command under the walk's timeout.
    async fn fetch(&self, params: &ConnectionParams, command: &str) -> Result<Vec<Row>> {
        let request = CommandRequest::new(params.clone(), command);
        let timeout = self.config.command_timeout;
        let rows = tokio::time::timeout(timeout, self.executor.execute(&request))
            .await
            .map_err(|_| ExecutorError::Timeout(timeout))??;
        debug!("'{}' on {} returned {} rows", command, params.host, rows.len());
        Ok(rows)
    }

    fn batch<T: Send + 'static>(&self, walk_id: WalkId, name: &str) -> Batch<T> {
        let batch_name = name.to_string();
        Batch::new(name).on_failure(move |failure| {
            warn!(
                "walk {}: unit {} of '{}' failed: {}",
                walk_id, failure.index, batch_name, failure.error
            );
        })
    }

    /// Join a batch, record the step, and apply the failure policy.
    async fn drain<T: Send + 'static>(
        &self,
        batch: Batch<T>,
        progress: &mut Progress,
    ) -> Result<Vec<T>> {
        let report = batch.join().await;
        progress.record(report.total, report.succeeded(), report.failed());

        if report.failed() > 0 && self.config.failure_policy == BatchFailurePolicy::Abort {
            return Err(WalkError::BatchFailed {
                batch: report.name,
                failed: report.failures.len(),
                total: report.total,
            }
            .into());
        }
        Ok(report.values)
    }
}

impl fmt::Debug for Walker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Walker")
            .field("config", &self.config)
            .field("vendors", &self.registry.names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

struct Progress {
    walk_id: WalkId,
    state: WalkState,
    steps: Vec<StepReport>,
}

impl Progress {
    fn enter(&mut self, state: WalkState) {
        debug!("walk {}: {:?} → {:?}", self.walk_id, self.state, state);
        self.state = state;
    }

    fn record(&mut self, rows: usize, succeeded: usize, failed: usize) {
        self.steps.push(StepReport {
            state: self.state,
            rows,
            succeeded,
            failed,
        });
    }
}

/// The device's `syncing` claim.
///
/// If the walk task is dropped before it finishes (aborted handle, runtime
/// shutdown) the claim still releases the device and records the walk as
/// failed.
struct SyncClaim {
    inventory: Arc<Inventory>,
    walk_id: WalkId,
    device_id: DeviceId,
    armed: bool,
}

impl Drop for SyncClaim {
    fn drop(&mut self) {
        if self.armed {
            warn!("walk {} for device {} was dropped", self.walk_id, self.device_id);
            self.inventory.finish_sync(self.device_id, false);
            self.inventory.history().record(
                self.walk_id,
                self.device_id,
                WalkResult::Failed,
                Some("walk aborted".to_string()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::inventory::NewDevice;
    use crate::testing::{ScriptedExecutor, StaticLookup, init_logging};

    fn ios_script() -> ScriptedExecutor {
        ScriptedExecutor::new()
            .rows(
                "show version",
                json!([{
                    "hostname": "access-1",
                    "version": "15.2(7)E4",
                    "rommon": "Bootstrap",
                    "running_image": "c2960x-universalk9-mz.152-7.E4.bin",
                    "hardware": ["WS-C2960X-48FPD-L"],
                    "serial": ["FOC1234X0AB"],
                    "reload_reason": "power-on",
                }]),
            )
            .rows(
                "show interfaces",
                json!([
                    {"interface": "GigabitEthernet1/0/1", "link_status": "up", "mtu": 1500},
                    {"interface": "GigabitEthernet1/0/2", "link_status": "up"},
                    {"interface": "GigabitEthernet1/0/3", "link_status": "down"},
                ]),
            )
            .rows(
                "show mac address-table",
                json!([
                    {"destination_address": "0050.56c0.0001", "type": "DYNAMIC", "vlan_id": "10", "destination_port": ["Gi1/0/1"]},
                    {"destination_address": "0050.56c0.0002", "type": "DYNAMIC", "vlan_id": "10", "destination_port": ["Gi1/0/2"]},
                    {"destination_address": "0050.56c0.0003", "type": "DYNAMIC", "vlan_id": "20", "destination_port": ["Gi1/0/3"]},
                    {"destination_address": "001b.2c3d.4e5f", "type": "STATIC", "vlan_id": "20", "destination_port": ["Gi1/0/1", "Gi1/0/2"]},
                    {"destination_address": "0100.0ccc.cccc", "type": "STATIC", "vlan_id": "All", "destination_port": ["CPU"]},
                ]),
            )
            .rows(
                "show interfaces description",
                json!([
                    {"port": "Gi1/0/1", "status": "up", "protocol": "up", "descrip": "uplink"},
                    {"port": "Gi1/0/2", "status": "up", "protocol": "up", "descrip": "printer"},
                    {"port": "Gi1/0/3", "status": "down", "protocol": "down", "descrip": ""},
                ]),
            )
            .rows(
                "show cdp neighbors detail",
                json!([
                    {
                        "destination_host": "core-1.example.net",
                        "management_ip": "10.0.0.254",
                        "platform": "cisco WS-C3850-24T",
                        "remote_port": "GigabitEthernet1/0/24",
                        "local_port": "GigabitEthernet1/0/1",
                        "capabilities": "Switch IGMP",
                    },
                    {
                        "destination_host": "ghost",
                        "local_port": "GigabitEthernet1/0/48",
                    },
                ]),
            )
    }

    fn walker(inventory: &Arc<Inventory>, executor: &ScriptedExecutor) -> Walker {
        WalkerBuilder::new(inventory.clone())
            .executor(executor.clone())
            .lookup(StaticLookup::new().with("00:50:56:c0:00:01", "VMware"))
            .build()
            .unwrap()
    }

    fn ios_device(inventory: &Inventory) -> DeviceId {
        inventory.add_device(
            NewDevice::new("10.0.0.1", "cisco_ios").credentials("admin", "secret"),
        )
    }

    async fn accepted(admission: WalkAdmission) -> WalkOutcome {
        match admission {
            WalkAdmission::Accepted(handle) => handle.await.unwrap(),
            WalkAdmission::Busy => panic!("walk was rejected as busy"),
        }
    }

    #[tokio::test]
    async fn test_full_walk_scenario() {
        init_logging();
        let inventory = Arc::new(Inventory::new());
        let device = ios_device(&inventory);
        let executor = ios_script();
        let walker = walker(&inventory, &executor);

        let outcome = accepted(walker.start_walk(device).unwrap()).await;
        assert!(outcome.is_completed(), "{:?}", outcome.history.error_message);
        assert_eq!(outcome.history.result, WalkResult::Completed);

        // Interfaces
        let interfaces = inventory.interfaces_for(device);
        assert_eq!(interfaces.len(), 3);

        // MAC pivots: 4 with a VLAN, the CPU entry without
        let pivots = inventory.pivots_for(device);
        assert_eq!(pivots.len(), 5);
        assert_eq!(pivots.iter().filter(|p| p.vlan_id.is_some()).count(), 4);
        assert_eq!(pivots.iter().filter(|p| p.vlan_id.is_none()).count(), 1);
        assert!(pivots.iter().any(|p| p.ports.as_deref() == Some("Gi1/0/1,Gi1/0/2")));

        // Neighbors: one applied, one dropped
        let with_neighbor: Vec<_> = interfaces.iter().filter(|i| !i.neighbor.is_empty()).collect();
        assert_eq!(with_neighbor.len(), 1);
        assert_eq!(with_neighbor[0].name(), "GigabitEthernet1/0/1");
        assert_eq!(
            with_neighbor[0].neighbor.name.as_deref(),
            Some("core-1.example.net")
        );
        assert!(inventory.interface(device, "GigabitEthernet1/0/48").is_none());

        // Descriptions by short name; the empty one is skipped
        let gi1 = inventory.interface(device, "GigabitEthernet1/0/1").unwrap();
        assert_eq!(gi1.record.description.as_deref(), Some("uplink"));
        let gi3 = inventory.interface(device, "GigabitEthernet1/0/3").unwrap();
        assert_eq!(gi3.record.description, None);

        // Enrichment linked the MAC on Gi1/0/1 and recorded discoveries
        let vmware = inventory.mac("00:50:56:c0:00:01").unwrap();
        assert!(gi1.macs.contains(&vmware.id));
        assert_eq!(
            inventory.pivot(device, vmware.id).unwrap().manufacturer.as_deref(),
            Some("VMware")
        );
        assert_eq!(inventory.discoveries_for(device).len(), 5);

        // Version and completion
        let stored = inventory.device(device).unwrap();
        assert!(!stored.syncing);
        assert!(stored.last_sync_completed.is_some());
        assert_eq!(stored.version.hostname.as_deref(), Some("access-1"));
        assert_eq!(stored.version.os.as_deref(), Some("15.2(7)E4"));
        assert_eq!(stored.version.platform.as_deref(), Some("WS-C2960X-48FPD-L"));

        let history = inventory.history().for_device(device);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].result, WalkResult::Completed);

        assert_eq!(
            outcome.step(WalkState::FetchingMacTable),
            Some(&StepReport {
                state: WalkState::FetchingMacTable,
                rows: 5,
                succeeded: 5,
                failed: 0,
            })
        );
        assert_eq!(outcome.step(WalkState::EnrichingMacs).unwrap().rows, 5);
    }

    #[tokio::test]
    async fn test_rewalk_is_idempotent() {
        let inventory = Arc::new(Inventory::new());
        let device = ios_device(&inventory);
        let executor = ios_script();
        let walker = walker(&inventory, &executor);

        assert!(walker.walk(device).await.unwrap().unwrap().is_completed());
        let counts = (
            inventory.mac_count(),
            inventory.interface_count(),
            inventory.pivot_count(),
        );

        assert!(walker.walk(device).await.unwrap().unwrap().is_completed());
        assert_eq!(
            (
                inventory.mac_count(),
                inventory.interface_count(),
                inventory.pivot_count(),
            ),
            counts
        );
        assert_eq!(counts, (5, 3, 5));

        // Description learned in the first walk survives the interface re-merge.
        let gi2 = inventory.interface(device, "GigabitEthernet1/0/2").unwrap();
        assert_eq!(gi2.record.description.as_deref(), Some("printer"));
        assert_eq!(inventory.history().for_device(device).len(), 2);
    }

    #[tokio::test]
    async fn test_busy_device_is_rejected_without_changes() {
        let inventory = Arc::new(Inventory::new());
        let device = ios_device(&inventory);
        let executor = ios_script();
        let walker = walker(&inventory, &executor);

        assert!(inventory.try_begin_sync(device).unwrap());
        let before = inventory.device(device).unwrap();

        let admission = walker.start_walk(device).unwrap();
        assert!(admission.is_busy());
        assert!(walker.walk(device).await.unwrap().is_none());

        let after = inventory.device(device).unwrap();
        assert!(after.syncing);
        assert_eq!(after.updated_at, before.updated_at);
        assert!(executor.calls().is_empty());
        assert!(inventory.history().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_start_admits_one() {
        let inventory = Arc::new(Inventory::new());
        let device = ios_device(&inventory);
        let executor = ios_script().delay("show version", Duration::from_millis(50));
        let walker = walker(&inventory, &executor);

        let first = walker.start_walk(device).unwrap();
        let second = walker.start_walk(device).unwrap();
        assert!(!first.is_busy());
        assert!(second.is_busy());

        assert!(accepted(first).await.is_completed());
        assert_eq!(inventory.history().len(), 1);
        assert!(!inventory.device(device).unwrap().syncing);
    }

    #[tokio::test]
    async fn test_mac_table_timeout_fails_walk() {
        let inventory = Arc::new(Inventory::new());
        let device = ios_device(&inventory);
        let executor = ios_script().hang("show mac address-table");
        let walker = WalkerBuilder::new(inventory.clone())
            .executor(executor.clone())
            .lookup(StaticLookup::new())
            .command_timeout(Duration::from_millis(50))
            .build()
            .unwrap();

        let outcome = walker.walk(device).await.unwrap().unwrap();
        assert_eq!(outcome.state, WalkState::Failed);
        assert_eq!(outcome.failed_at, Some(WalkState::FetchingMacTable));

        let history = inventory.history().for_device(device);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].result, WalkResult::Failed);
        assert!(history[0].error_message.as_deref().unwrap().contains("timed out"));

        let stored = inventory.device(device).unwrap();
        assert!(!stored.syncing);
        assert!(stored.last_sync_completed.is_none());

        let calls = executor.calls();
        assert!(!calls.iter().any(|c| c == "show interfaces description"));
        assert!(!calls.iter().any(|c| c == "show cdp neighbors detail"));

        // Steps before the failure stay committed.
        assert_eq!(inventory.interface_count(), 3);
        assert_eq!(inventory.pivot_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_vendor_fails_without_io() {
        let inventory = Arc::new(Inventory::new());
        let device = inventory.add_device(NewDevice::new("10.0.0.9", "hp_procurve"));
        let executor = ios_script();
        let walker = walker(&inventory, &executor);

        let outcome = walker.walk(device).await.unwrap().unwrap();
        assert_eq!(outcome.state, WalkState::Failed);
        assert_eq!(outcome.failed_at, Some(WalkState::Starting));
        assert!(
            outcome
                .history
                .error_message
                .as_deref()
                .unwrap()
                .contains("Unsupported vendor 'hp_procurve'")
        );
        assert!(executor.calls().is_empty());
        assert_eq!(inventory.interface_count(), 0);
        assert_eq!(inventory.pivot_count(), 0);
        assert!(!inventory.device(device).unwrap().syncing);
    }

    #[tokio::test]
    async fn test_unknown_device_is_an_error() {
        let inventory = Arc::new(Inventory::new());
        let walker = walker(&inventory, &ios_script());
        assert!(matches!(
            walker.start_walk(DeviceId(404)),
            Err(crate::Error::Walk(WalkError::UnknownDevice(DeviceId(404))))
        ));
        assert!(inventory.history().is_empty());
    }

    #[tokio::test]
    async fn test_remote_error_fails_walk() {
        let inventory = Arc::new(Inventory::new());
        let device = ios_device(&inventory);
        let executor = ios_script().fail("show version", "Authentication failed.");
        let walker = walker(&inventory, &executor);

        let outcome = walker.walk(device).await.unwrap().unwrap();
        assert_eq!(outcome.failed_at, Some(WalkState::FetchingVersion));
        assert!(
            outcome
                .history
                .error_message
                .as_deref()
                .unwrap()
                .contains("Authentication failed.")
        );
        assert_eq!(executor.calls(), vec!["show version".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_version_fails_walk() {
        let inventory = Arc::new(Inventory::new());
        let device = ios_device(&inventory);
        let executor = ios_script().rows("show version", json!([]));
        let walker = walker(&inventory, &executor);

        let outcome = walker.walk(device).await.unwrap().unwrap();
        assert_eq!(outcome.failed_at, Some(WalkState::FetchingVersion));
        assert!(outcome.history.error_message.unwrap().contains("Empty response"));
    }

    #[tokio::test]
    async fn test_failure_policy() {
        let bad_mac_table = json!([
            {"destination_address": "0050.56c0.0001", "type": "DYNAMIC", "vlan_id": "10", "destination_port": ["Gi1/0/1"]},
            {"destination_address": "not-a-mac", "type": "DYNAMIC", "vlan_id": "10", "destination_port": ["Gi1/0/2"]},
        ]);

        // Continue: the bad row is isolated.
        let inventory = Arc::new(Inventory::new());
        let device = ios_device(&inventory);
        let executor = ios_script().rows("show mac address-table", bad_mac_table.clone());
        let outcome = walker(&inventory, &executor).walk(device).await.unwrap().unwrap();
        assert!(outcome.is_completed());
        let step = outcome.step(WalkState::FetchingMacTable).unwrap();
        assert_eq!((step.succeeded, step.failed), (1, 1));
        assert_eq!(inventory.pivot_count(), 1);

        // Abort: the walk fails after the batch drains.
        let inventory = Arc::new(Inventory::new());
        let device = ios_device(&inventory);
        let executor = ios_script().rows("show mac address-table", bad_mac_table);
        let walker = WalkerBuilder::new(inventory.clone())
            .executor(executor.clone())
            .lookup(StaticLookup::new())
            .failure_policy(BatchFailurePolicy::Abort)
            .build()
            .unwrap();
        let outcome = walker.walk(device).await.unwrap().unwrap();
        assert_eq!(outcome.failed_at, Some(WalkState::FetchingMacTable));
        assert_eq!(inventory.pivot_count(), 1);
        assert!(!executor.calls().iter().any(|c| c == "show interfaces description"));
    }

    #[tokio::test]
    async fn test_walk_all() {
        let inventory = Arc::new(Inventory::new());
        let a = ios_device(&inventory);
        let b = inventory.add_device(NewDevice::new("10.0.0.2", "cisco_ios").port(2222));
        inventory.try_begin_sync(b).unwrap();
        let walker = walker(&inventory, &ios_script());

        let mut results = walker.walk_all();
        assert_eq!(results.len(), 2);

        let (id_b, admission_b) = results.pop().unwrap();
        assert_eq!(id_b, b);
        assert!(admission_b.unwrap().is_busy());

        let (id_a, admission_a) = results.pop().unwrap();
        assert_eq!(id_a, a);
        assert!(accepted(admission_a.unwrap()).await.is_completed());
    }

    #[tokio::test]
    async fn test_aborted_walk_releases_device() {
        let inventory = Arc::new(Inventory::new());
        let device = ios_device(&inventory);
        let executor = ios_script().hang("show version");
        let walker = walker(&inventory, &executor);

        let WalkAdmission::Accepted(handle) = walker.start_walk(device).unwrap() else {
            panic!("walk was rejected as busy");
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        assert!(!inventory.device(device).unwrap().syncing);
        let history = inventory.history().for_device(device);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].result, WalkResult::Failed);
    }
}
