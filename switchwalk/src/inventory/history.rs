//! Append-only walk history.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::{DeviceId, WalkId};

/// Final result of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkResult {
    Completed,
    Failed,
}

/// One record per walk attempt. Never modified after it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkHistory {
    pub id: u64,
    pub walk_id: WalkId,
    pub device_id: DeviceId,
    pub result: WalkResult,
    pub error_message: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Records the outcome of every walk.
#[derive(Debug, Default)]
pub struct SyncHistory {
    next_id: AtomicU64,
    records: RwLock<Vec<WalkHistory>>,
}

impl SyncHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the outcome of a walk.
    pub fn record(
        &self,
        walk_id: WalkId,
        device_id: DeviceId,
        result: WalkResult,
        error_message: Option<String>,
    ) -> WalkHistory {
        let entry = WalkHistory {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            walk_id,
            device_id,
            result,
            error_message,
            completed_at: Utc::now(),
        };
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        entry
    }

    /// History for one device, newest first.
    pub fn for_device(&self, device_id: DeviceId) -> Vec<WalkHistory> {
        let mut entries: Vec<WalkHistory> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|h| h.device_id == device_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(b.id.cmp(&a.id)));
        entries
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cascade of a device removal.
    pub(crate) fn remove_device(&self, device_id: DeviceId) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|h| h.device_id != device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_newest_first() {
        let history = SyncHistory::new();
        history.record(WalkId(1), DeviceId(1), WalkResult::Completed, None);
        history.record(WalkId(2), DeviceId(2), WalkResult::Completed, None);
        history.record(
            WalkId(3),
            DeviceId(1),
            WalkResult::Failed,
            Some("Command timed out after 60s".to_string()),
        );

        let entries = history.for_device(DeviceId(1));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].walk_id, WalkId(3));
        assert_eq!(entries[0].result, WalkResult::Failed);
        assert_eq!(entries[1].walk_id, WalkId(1));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_remove_device_cascades() {
        let history = SyncHistory::new();
        history.record(WalkId(1), DeviceId(1), WalkResult::Completed, None);
        history.record(WalkId(2), DeviceId(2), WalkResult::Completed, None);
        history.remove_device(DeviceId(1));
        assert!(history.for_device(DeviceId(1)).is_empty());
        assert_eq!(history.len(), 1);
    }
}
