//! Interactive sessions.
//!
//! The [`SessionManager`] keeps at most one remote shell per device. Callers
//! hold a [`SessionLease`] on it; the shell stays up until the last lease is
//! closed, [`SessionManager::shutdown`] is called, or the shell fails. Every
//! command, output chunk, error and state change is published on the
//! device's [`EventBus`] topic.

mod events;
pub mod protocol;
mod relay;
mod remote;

pub use events::{EventBus, TerminalEvent, TerminalEventKind};
pub use protocol::{ClientMessage, ServerMessage};
pub use relay::TerminalRelay;
pub use remote::{
    ExecOutput, PtyChannel, PtyInput, PtyOutput, RemoteShell, ShellConnector, TerminalSize,
    Utf8Decoder,
};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc};

use crate::error::{Result, SessionError};
use crate::inventory::{DeviceId, Inventory};

/// Session manager settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound on [`SessionManager::execute`].
    pub exec_timeout: Duration,

    /// PTY size used when a client does not ask for one.
    pub terminal_size: TerminalSize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exec_timeout: Duration::from_secs(60),
            terminal_size: TerminalSize::default(),
        }
    }
}

/// One observer's claim on a device's shared session.
///
/// Leases are not closed on drop; pass them to [`SessionManager::close`].
#[derive(Debug, PartialEq, Eq)]
pub struct SessionLease {
    id: u64,
    device_id: DeviceId,
    generation: u64,
}

impl SessionLease {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }
}

/// A live remote shell shared by every lease of a device.
pub struct Session {
    device_id: DeviceId,
    shell: Arc<dyn RemoteShell>,
    terminal: Mutex<Option<mpsc::UnboundedSender<PtyInput>>>,
    opened_at: DateTime<Utc>,
}

impl Session {
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    async fn terminate(&self) {
        if let Some(input) = self.terminal.lock().await.take() {
            let _ = input.send(PtyInput::Close);
        }
        if let Err(e) = self.shell.close().await {
            warn!("closing session for device {} failed: {}", self.device_id, e);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device_id", &self.device_id)
            .field("opened_at", &self.opened_at)
            .finish_non_exhaustive()
    }
}

/// Keyed entry of the session table. Entries are never removed; an idle
/// device simply has no session.
#[derive(Default)]
struct Slot {
    session: Option<Arc<Session>>,
    leases: usize,

    /// Bumped on every teardown so stale leases cannot touch a newer session.
    generation: u64,
}

struct Shared {
    slots: DashMap<DeviceId, Arc<Mutex<Slot>>>,
    events: Arc<EventBus>,
}

impl Shared {
    fn slot(&self, device_id: DeviceId) -> Arc<Mutex<Slot>> {
        self.slots.entry(device_id).or_default().clone()
    }

    /// Tear the session down for every lease, if `generation` is current.
    async fn teardown(&self, device_id: DeviceId, generation: u64) -> bool {
        let slot = self.slot(device_id);
        let session = {
            let mut slot = slot.lock().await;
            if slot.generation != generation {
                return false;
            }
            let Some(session) = slot.session.take() else {
                return false;
            };
            slot.leases = 0;
            slot.generation += 1;
            session
        };

        session.terminate().await;
        info!("session for device {} closed", device_id);
        self.events
            .emit(device_id, TerminalEventKind::Disconnected, "Disconnected");
        true
    }
}

/// Registry of live remote shells keyed by device.
pub struct SessionManager {
    inventory: Arc<Inventory>,
    connector: Arc<dyn ShellConnector>,
    config: SessionConfig,
    shared: Arc<Shared>,
    next_lease: AtomicU64,
}

impl SessionManager {
    pub fn new(
        inventory: Arc<Inventory>,
        connector: Arc<dyn ShellConnector>,
        events: Arc<EventBus>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inventory,
            connector,
            config,
            shared: Arc::new(Shared {
                slots: DashMap::new(),
                events,
            }),
            next_lease: AtomicU64::new(0),
        }
    }

    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.shared.events
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open (or join) the device's session.
    ///
    /// The first lease establishes the connection; later leases reuse it.
    /// Concurrent opens for one device are serialized so only one connection
    /// is ever made.
    pub async fn open(&self, device_id: DeviceId) -> Result<SessionLease> {
        let device = self
            .inventory
            .device(device_id)
            .ok_or(SessionError::DeviceNotFound(device_id))?;

        let slot = self.shared.slot(device_id);
        let mut slot = slot.lock().await;

        if slot.session.is_none() {
            debug!("connecting session to {}:{}", device.host, device.port);
            let shell = match self.connector.connect(&device).await {
                Ok(shell) => shell,
                Err(e) => {
                    self.shared
                        .events
                        .emit(device_id, TerminalEventKind::Error, e.to_string());
                    return Err(e);
                }
            };
            slot.session = Some(Arc::new(Session {
                device_id,
                shell,
                terminal: Mutex::new(None),
                opened_at: Utc::now(),
            }));
            info!("session for device {} opened", device_id);
            self.shared.events.emit(
                device_id,
                TerminalEventKind::Connected,
                format!("Connected to {}:{}", device.host, device.port),
            );
        }

        slot.leases += 1;
        Ok(SessionLease {
            id: self.next_lease.fetch_add(1, Ordering::Relaxed) + 1,
            device_id,
            generation: slot.generation,
        })
    }

    /// Session behind a lease.
    async fn session(&self, lease: &SessionLease) -> Result<Arc<Session>> {
        let slot = self.shared.slot(lease.device_id);
        let slot = slot.lock().await;
        match &slot.session {
            Some(session) if slot.generation == lease.generation => Ok(session.clone()),
            _ => Err(SessionError::NotOpen(lease.device_id).into()),
        }
    }

    /// Run a command on the session and capture its output.
    ///
    /// A failure or timeout is broadcast and tears the session down.
    pub async fn execute(&self, lease: &SessionLease, command: &str) -> Result<ExecOutput> {
        let session = self.session(lease).await?;
        let events = &self.shared.events;
        let device_id = lease.device_id;
        events.emit(device_id, TerminalEventKind::Command, command);

        let timeout = self.config.exec_timeout;
        let result = match tokio::time::timeout(timeout, session.shell.exec(command)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout(timeout).into()),
        };

        match result {
            Ok(output) => {
                if !output.stdout.is_empty() {
                    events.emit(device_id, TerminalEventKind::Output, output.stdout.clone());
                }
                if !output.stderr.is_empty() {
                    events.emit(device_id, TerminalEventKind::Error, output.stderr.clone());
                }
                Ok(output)
            }
            Err(e) => {
                warn!("command '{}' on device {} failed: {}", command, device_id, e);
                events.emit(device_id, TerminalEventKind::Error, e.to_string());
                self.shared.teardown(device_id, lease.generation).await;
                Err(e)
            }
        }
    }

    /// Open the shared raw terminal. A second attach joins the existing one.
    pub async fn attach_terminal(&self, lease: &SessionLease, size: TerminalSize) -> Result<()> {
        let session = self.session(lease).await?;
        let mut terminal = session.terminal.lock().await;
        if terminal.is_some() {
            return Ok(());
        }

        let PtyChannel { input, mut output } = session.shell.open_pty(size).await?;
        *terminal = Some(input);

        let shared = self.shared.clone();
        let device_id = lease.device_id;
        let generation = lease.generation;
        tokio::spawn(async move {
            let mut decoder = Utf8Decoder::new();
            let emit_text = |text: String| {
                if !text.is_empty() {
                    shared.events.emit(device_id, TerminalEventKind::Output, text);
                }
            };
            loop {
                match output.recv().await {
                    Some(PtyOutput::Data(data)) => emit_text(decoder.decode(&data)),
                    Some(PtyOutput::Error(message)) => {
                        emit_text(decoder.finish());
                        shared
                            .events
                            .emit(device_id, TerminalEventKind::Error, message);
                        break;
                    }
                    Some(PtyOutput::Closed) | None => {
                        emit_text(decoder.finish());
                        break;
                    }
                }
            }
            shared.teardown(device_id, generation).await;
        });
        Ok(())
    }

    async fn send_terminal(&self, lease: &SessionLease, input: PtyInput) -> Result<()> {
        let session = self.session(lease).await?;
        let terminal = session.terminal.lock().await;
        let sender = terminal
            .as_ref()
            .ok_or(SessionError::NoTerminal(lease.device_id))?;
        sender.send(input).map_err(|_| SessionError::Closed)?;
        Ok(())
    }

    /// Forward keystrokes to the terminal.
    pub async fn send_input(&self, lease: &SessionLease, data: impl Into<Bytes>) -> Result<()> {
        self.send_terminal(lease, PtyInput::Data(data.into())).await
    }

    /// Forward a window-size change to the terminal.
    pub async fn resize(&self, lease: &SessionLease, size: TerminalSize) -> Result<()> {
        self.send_terminal(lease, PtyInput::Resize(size)).await
    }

    /// Release a lease. The last lease of a session tears it down.
    ///
    /// Closing a lease whose session is already gone is a no-op.
    pub async fn close(&self, lease: SessionLease) -> Result<()> {
        let slot = self.shared.slot(lease.device_id);
        let last = {
            let mut slot = slot.lock().await;
            if slot.generation != lease.generation || slot.session.is_none() {
                return Ok(());
            }
            slot.leases = slot.leases.saturating_sub(1);
            debug!(
                "lease {} on device {} closed, {} left",
                lease.id, lease.device_id, slot.leases
            );
            slot.leases == 0
        };

        if last {
            self.shared.teardown(lease.device_id, lease.generation).await;
        }
        Ok(())
    }

    /// Force-close the device's session for every lease.
    pub async fn shutdown(&self, device_id: DeviceId) -> bool {
        let generation = self.shared.slot(device_id).lock().await.generation;
        self.shared.teardown(device_id, generation).await
    }

    /// Whether the device currently has a session.
    pub async fn is_open(&self, device_id: DeviceId) -> bool {
        self.shared.slot(device_id).lock().await.session.is_some()
    }

    /// Number of leases held on the device's session.
    pub async fn lease_count(&self, device_id: DeviceId) -> usize {
        self.shared.slot(device_id).lock().await.leases
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("devices", &self.shared.slots.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, TransportError};
    use crate::inventory::NewDevice;
    use crate::testing::FakeConnector;

    fn setup(connector: &FakeConnector) -> (SessionManager, DeviceId) {
        let inventory = Arc::new(Inventory::new());
        let device = inventory.add_device(
            NewDevice::new("10.0.0.1", "cisco_ios").credentials("admin", "secret"),
        );
        let manager = SessionManager::new(
            inventory,
            Arc::new(connector.clone()),
            Arc::new(EventBus::default()),
            SessionConfig {
                exec_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        );
        (manager, device)
    }

    async fn next_kind(
        events: &mut tokio::sync::broadcast::Receiver<TerminalEvent>,
    ) -> TerminalEventKind {
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap()
            .kind
    }

    #[tokio::test]
    async fn test_two_opens_share_one_connection() {
        let connector = FakeConnector::new();
        let (manager, device) = setup(&connector);
        let manager = Arc::new(manager);

        let (a, b) = tokio::join!(manager.open(device), manager.open(device));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.id(), b.id());
        assert_eq!(connector.connects(), 1);
        assert_eq!(manager.lease_count(device).await, 2);
    }

    #[tokio::test]
    async fn test_closing_one_lease_keeps_session() {
        let connector = FakeConnector::new();
        let (manager, device) = setup(&connector);
        let mut events = manager.events().subscribe(device);

        let a = manager.open(device).await.unwrap();
        let b = manager.open(device).await.unwrap();
        assert_eq!(next_kind(&mut events).await, TerminalEventKind::Connected);

        manager.close(a).await.unwrap();
        assert!(manager.is_open(device).await);
        assert_eq!(connector.closes(), 0);

        let output = manager.execute(&b, "show clock").await.unwrap();
        assert_eq!(output.stdout, "show clock\n");

        manager.close(b).await.unwrap();
        assert!(!manager.is_open(device).await);
        assert_eq!(connector.closes(), 1);

        assert_eq!(next_kind(&mut events).await, TerminalEventKind::Command);
        assert_eq!(next_kind(&mut events).await, TerminalEventKind::Output);
        assert_eq!(next_kind(&mut events).await, TerminalEventKind::Disconnected);
    }

    #[tokio::test]
    async fn test_execute_broadcasts_to_all_observers() {
        let connector = FakeConnector::new();
        let (manager, device) = setup(&connector);
        let lease = manager.open(device).await.unwrap();

        let mut first = manager.events().subscribe(device);
        let mut second = manager.events().subscribe(device);
        manager.execute(&lease, "show version").await.unwrap();

        for events in [&mut first, &mut second] {
            let command = events.recv().await.unwrap();
            assert_eq!(command.kind, TerminalEventKind::Command);
            assert_eq!(command.data, "show version");
            let output = events.recv().await.unwrap();
            assert_eq!(output.kind, TerminalEventKind::Output);
        }
    }

    #[tokio::test]
    async fn test_stderr_is_broadcast_as_error() {
        let connector = FakeConnector::new();
        let (manager, device) = setup(&connector);
        let lease = manager.open(device).await.unwrap();
        let mut events = manager.events().subscribe(device);

        let output = manager.execute(&lease, "stderr").await.unwrap();
        assert_eq!(output.stderr, "% Invalid input\n");
        assert_eq!(next_kind(&mut events).await, TerminalEventKind::Command);
        assert_eq!(next_kind(&mut events).await, TerminalEventKind::Error);
        assert!(manager.is_open(device).await);
    }

    #[tokio::test]
    async fn test_exec_failure_tears_down_for_everyone() {
        let connector = FakeConnector::new();
        let (manager, device) = setup(&connector);
        let a = manager.open(device).await.unwrap();
        let b = manager.open(device).await.unwrap();
        let mut events = manager.events().subscribe(device);

        assert!(manager.execute(&a, "fail").await.is_err());
        assert_eq!(next_kind(&mut events).await, TerminalEventKind::Command);
        assert_eq!(next_kind(&mut events).await, TerminalEventKind::Error);
        assert_eq!(next_kind(&mut events).await, TerminalEventKind::Disconnected);

        assert!(!manager.is_open(device).await);
        assert!(matches!(
            manager.execute(&b, "show clock").await,
            Err(Error::Session(SessionError::NotOpen(_)))
        ));

        // Stale lease does not disturb a new session.
        let c = manager.open(device).await.unwrap();
        manager.close(b).await.unwrap();
        assert!(manager.is_open(device).await);
        assert_eq!(manager.lease_count(device).await, 1);
        assert_eq!(connector.connects(), 2);
        manager.close(c).await.unwrap();
    }

    #[tokio::test]
    async fn test_exec_timeout() {
        let connector = FakeConnector::new();
        let (manager, device) = setup(&connector);
        let lease = manager.open(device).await.unwrap();

        let err = manager.execute(&lease, "hang").await.unwrap_err();
        assert!(err.is_timeout());
        assert!(!manager.is_open(device).await);
    }

    #[tokio::test]
    async fn test_shutdown_forces_close() {
        let connector = FakeConnector::new();
        let (manager, device) = setup(&connector);
        let _a = manager.open(device).await.unwrap();
        let _b = manager.open(device).await.unwrap();

        assert!(manager.shutdown(device).await);
        assert!(!manager.is_open(device).await);
        assert!(!manager.shutdown(device).await);
    }

    #[tokio::test]
    async fn test_connect_failure_is_broadcast() {
        let connector = FakeConnector::failing();
        let (manager, device) = setup(&connector);
        let mut events = manager.events().subscribe(device);

        let err = manager.open(device).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::AuthenticationFailed { .. })
        ));
        assert_eq!(next_kind(&mut events).await, TerminalEventKind::Error);
        assert!(!manager.is_open(device).await);
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let connector = FakeConnector::new();
        let (manager, _) = setup(&connector);
        assert!(matches!(
            manager.open(DeviceId(404)).await,
            Err(Error::Session(SessionError::DeviceNotFound(DeviceId(404))))
        ));
    }

    #[tokio::test]
    async fn test_terminal_echo_and_resize() {
        let connector = FakeConnector::new();
        let (manager, device) = setup(&connector);
        let lease = manager.open(device).await.unwrap();
        let mut events = manager.events().subscribe(device);

        assert!(matches!(
            manager.send_input(&lease, "x").await,
            Err(Error::Session(SessionError::NoTerminal(_)))
        ));

        manager.attach_terminal(&lease, TerminalSize::default()).await.unwrap();
        manager.attach_terminal(&lease, TerminalSize::default()).await.unwrap();
        assert_eq!(connector.ptys(), 1);

        manager.send_input(&lease, "show clock\r").await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, TerminalEventKind::Output);
        assert_eq!(event.data, "show clock\r");

        manager
            .resize(&lease, TerminalSize { cols: 132, rows: 50 })
            .await
            .unwrap();
        assert_eq!(events.recv().await.unwrap().data, "resized 132x50");

        // The remote ending the shell tears the session down.
        manager.send_input(&lease, "exit\r").await.unwrap();
        loop {
            if next_kind(&mut events).await == TerminalEventKind::Disconnected {
                break;
            }
        }
        assert!(!manager.is_open(device).await);
    }

    #[tokio::test]
    async fn test_terminal_output_keeps_split_characters() {
        let connector = FakeConnector::new();
        let (manager, device) = setup(&connector);
        let lease = manager.open(device).await.unwrap();
        let mut events = manager.events().subscribe(device);
        manager.attach_terminal(&lease, TerminalSize::default()).await.unwrap();

        manager.send_input(&lease, &[0xC3u8][..]).await.unwrap();
        manager.send_input(&lease, &[0xA9u8][..]).await.unwrap();
        manager.send_input(&lease, "!").await.unwrap();

        let mut text = String::new();
        while text.chars().count() < 2 {
            let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.kind, TerminalEventKind::Output);
            text.push_str(&event.data);
        }
        assert_eq!(text, "é!");
        assert!(!text.contains(char::REPLACEMENT_CHARACTER));
    }
}
