//! Terminal relay: serves the interactive protocol to remote clients.
//!
//! Each client connection gets its own relay task. Clients attached to the
//! same device share that device's session through the [`SessionManager`],
//! so a device never has more than one remote shell however many clients
//! watch it.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use secrecy::ExposeSecret;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};

use super::events::{TerminalEvent, TerminalEventKind};
use super::protocol::{ClientMessage, ServerMessage};
use super::remote::TerminalSize;
use super::{SessionLease, SessionManager};
use crate::error::{Result, SessionError, TransportError};

/// Longest accepted client line.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Serves [`ClientMessage`]s and answers with [`ServerMessage`]s.
#[derive(Debug, Clone)]
pub struct TerminalRelay {
    manager: Arc<SessionManager>,
}

impl TerminalRelay {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    /// Accept clients forever, one task per connection.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(
            "terminal relay listening on {}",
            listener.local_addr().map_err(TransportError::Io)?
        );
        loop {
            let (stream, peer) = listener.accept().await.map_err(TransportError::Io)?;
            debug!("relay client {} connected", peer);
            let relay = self.clone();
            tokio::spawn(async move {
                if let Err(e) = relay.handle_stream(stream).await {
                    warn!("relay client {} failed: {}", peer, e);
                }
                debug!("relay client {} gone", peer);
            });
        }
    }

    /// Serve one client over newline-delimited JSON.
    pub async fn handle_stream(&self, stream: TcpStream) -> Result<()> {
        let framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let (mut sink, mut lines) = framed.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(256);

        let errors = outbound_tx.clone();
        let reader = async move {
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("relay read failed: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ClientMessage>(&line) {
                    Ok(message) => {
                        if inbound_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let reply = ServerMessage::error(format!("Invalid message: {}", e));
                        if errors.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
            }
        };

        let writer = async move {
            while let Some(message) = outbound_rx.recv().await {
                let line = match serde_json::to_string(&message) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("relay could not encode {:?}: {}", message, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(line).await {
                    warn!("relay write failed: {}", e);
                    break;
                }
            }
        };

        let (_, _, handled) = tokio::join!(reader, writer, self.handle_client(inbound_rx, outbound_tx));
        handled
    }

    /// Drive one client: apply its messages and forward its device's events.
    ///
    /// Returns when the client's inbound channel closes or its outbound
    /// channel is dropped. The client's lease is released on return.
    pub async fn handle_client(
        &self,
        mut inbound: mpsc::Receiver<ClientMessage>,
        outbound: mpsc::Sender<ServerMessage>,
    ) -> Result<()> {
        let mut lease: Option<SessionLease> = None;
        let mut events: Option<broadcast::Receiver<TerminalEvent>> = None;

        loop {
            tokio::select! {
                message = inbound.recv() => {
                    let Some(message) = message else { break };
                    let reply = self.on_message(message, &mut lease, &mut events).await;
                    if let Some(reply) = reply {
                        if outbound.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                event = next_event(&mut events) => match event {
                    Ok(event) => {
                        let Some(message) = relay_event(&event) else { continue };
                        let disconnected = message == ServerMessage::Disconnected;
                        if outbound.send(message).await.is_err() {
                            break;
                        }
                        if disconnected {
                            lease = None;
                            events = None;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("relay client fell behind by {} events", skipped);
                    }
                    Err(RecvError::Closed) => events = None,
                },
            }
        }

        if let Some(lease) = lease.take() {
            self.manager.close(lease).await?;
        }
        Ok(())
    }

    async fn on_message(
        &self,
        message: ClientMessage,
        lease: &mut Option<SessionLease>,
        events: &mut Option<broadcast::Receiver<TerminalEvent>>,
    ) -> Option<ServerMessage> {
        match message {
            ClientMessage::Connect {
                host,
                port,
                username,
                password,
            } => {
                if lease.is_some() {
                    return Some(ServerMessage::error("Already connected"));
                }
                match self.connect(host, port, &username, &password).await {
                    Ok((opened, receiver)) => {
                        *lease = Some(opened);
                        *events = Some(receiver);
                        Some(ServerMessage::Connected)
                    }
                    Err(e) => Some(ServerMessage::error(e.to_string())),
                }
            }
            ClientMessage::Data { data } => {
                let Some(lease) = lease.as_ref() else {
                    return Some(ServerMessage::error("Not connected"));
                };
                self.manager
                    .send_input(lease, data.into_bytes())
                    .await
                    .err()
                    .map(|e| ServerMessage::error(e.to_string()))
            }
            ClientMessage::Resize { cols, rows } => {
                let Some(lease) = lease.as_ref() else {
                    return Some(ServerMessage::error("Not connected"));
                };
                self.manager
                    .resize(lease, TerminalSize { cols, rows })
                    .await
                    .err()
                    .map(|e| ServerMessage::error(e.to_string()))
            }
        }
    }

    /// Resolve the target device, check the client's credentials against it,
    /// and join its session with a terminal attached.
    async fn connect(
        &self,
        host: String,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<(SessionLease, broadcast::Receiver<TerminalEvent>)> {
        let device = self
            .manager
            .inventory()
            .find_device(&host, port)
            .ok_or(SessionError::UnknownDevice { host, port })?;

        if device.credentials.username != username
            || device.credentials.password.expose_secret() != password
        {
            return Err(TransportError::AuthenticationFailed {
                user: username.to_string(),
            }
            .into());
        }

        // Subscribe first so no output is missed between attach and forward.
        let receiver = self.manager.events().subscribe(device.id);
        let lease = self.manager.open(device.id).await?;
        let size = self.manager.config().terminal_size;
        if let Err(e) = self.manager.attach_terminal(&lease, size).await {
            self.manager.close(lease).await?;
            return Err(e);
        }
        info!("relay client attached to device {}", device.id);
        Ok((lease, receiver))
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<TerminalEvent>>,
) -> std::result::Result<TerminalEvent, RecvError> {
    match events {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// Protocol message for a bus event, if clients see it.
fn relay_event(event: &TerminalEvent) -> Option<ServerMessage> {
    match event.kind {
        TerminalEventKind::Output => Some(ServerMessage::Data {
            data: event.data.clone(),
        }),
        TerminalEventKind::Error => Some(ServerMessage::error(event.data.clone())),
        TerminalEventKind::Disconnected => Some(ServerMessage::Disconnected),
        TerminalEventKind::Connected | TerminalEventKind::Command => None,
    }
}
