//! Remote shell abstraction used by the session manager.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::inventory::Device;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u32,
    pub rows: u32,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Captured result of one non-interactive command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,

    /// Exit status, if the remote reported one.
    pub exit_status: Option<u32>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_status.unwrap_or(0) == 0
    }
}

/// Input to a raw PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyInput {
    /// Keystrokes, forwarded unmodified.
    Data(Bytes),
    Resize(TerminalSize),
    Close,
}

/// Output of a raw PTY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtyOutput {
    Data(Bytes),
    Error(String),

    /// The remote side ended the shell. Nothing follows.
    Closed,
}

/// Both ends of a raw PTY channel.
#[derive(Debug)]
pub struct PtyChannel {
    pub input: mpsc::UnboundedSender<PtyInput>,
    pub output: mpsc::Receiver<PtyOutput>,
}

/// An authenticated connection to one device.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run one command and capture its output.
    async fn exec(&self, command: &str) -> Result<ExecOutput>;

    /// Open an interactive shell with a PTY of the given size.
    async fn open_pty(&self, size: TerminalSize) -> Result<PtyChannel>;

    /// Terminate the connection.
    async fn close(&self) -> Result<()>;
}

/// Opens remote shells to inventory devices.
#[async_trait]
pub trait ShellConnector: Send + Sync {
    async fn connect(&self, device: &Device) -> Result<Arc<dyn RemoteShell>>;
}

/// Turns PTY output chunks into text without splitting characters.
///
/// A multi-byte sequence cut at a chunk boundary is held back until the
/// rest arrives. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, keeping any trailing incomplete sequence.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut text = String::with_capacity(self.pending.len());
        let mut rest = &self.pending[..];
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let keep = rest.len();
        let consumed = self.pending.len() - keep;
        self.pending.drain(..consumed);
        text
    }

    /// Flush whatever is still held back once the stream has ended.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}
