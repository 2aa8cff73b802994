//! Per-device terminal event broadcast.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::trace;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::inventory::DeviceId;

/// Kind of terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalEventKind {
    Connected,
    Command,
    Output,
    Error,
    Disconnected,
}

/// One event on a device's terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalEvent {
    pub device_id: DeviceId,
    #[serde(rename = "type")]
    pub kind: TerminalEventKind,
    pub data: String,
    pub timestamp: DateTime<Utc>,
}

impl TerminalEvent {
    pub fn new(device_id: DeviceId, kind: TerminalEventKind, data: impl Into<String>) -> Self {
        Self {
            device_id,
            kind,
            data: data.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Topic-per-device broadcast of terminal events.
///
/// Every subscriber of a device receives every event published for it after
/// subscribing. Publishing to a device nobody listens to is not an error.
#[derive(Debug)]
pub struct EventBus {
    capacity: usize,
    topics: DashMap<DeviceId, broadcast::Sender<TerminalEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Default number of events a slow subscriber may fall behind by.
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: DashMap::new(),
        }
    }

    fn sender(&self, device_id: DeviceId) -> broadcast::Sender<TerminalEvent> {
        self.topics
            .entry(device_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to a device's events.
    pub fn subscribe(&self, device_id: DeviceId) -> broadcast::Receiver<TerminalEvent> {
        self.sender(device_id).subscribe()
    }

    /// Publish an event; returns the number of subscribers reached.
    pub fn publish(&self, event: TerminalEvent) -> usize {
        trace!("device {} event {:?}", event.device_id, event.kind);
        self.sender(event.device_id).send(event).unwrap_or(0)
    }

    /// Shorthand for [`EventBus::publish`].
    pub fn emit(&self, device_id: DeviceId, kind: TerminalEventKind, data: impl Into<String>) -> usize {
        self.publish(TerminalEvent::new(device_id, kind, data))
    }

    /// Number of live subscribers for a device.
    pub fn subscriber_count(&self, device_id: DeviceId) -> usize {
        self.topics
            .get(&device_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = EventBus::default();
        let mut a = bus.subscribe(DeviceId(1));
        let mut b = bus.subscribe(DeviceId(1));
        let mut other = bus.subscribe(DeviceId(2));

        assert_eq!(bus.emit(DeviceId(1), TerminalEventKind::Output, "sw1#"), 2);

        assert_eq!(a.recv().await.unwrap().data, "sw1#");
        assert_eq!(b.recv().await.unwrap().kind, TerminalEventKind::Output);
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.emit(DeviceId(1), TerminalEventKind::Command, "show clock"), 0);
        assert_eq!(bus.subscriber_count(DeviceId(1)), 0);
    }

    #[test]
    fn test_event_serializes_type() {
        let event = TerminalEvent::new(DeviceId(3), TerminalEventKind::Error, "boom");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["device_id"], 3);
    }
}
