//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{ExecutorError, Result, SessionError, TransportError};
use crate::executor::{CommandExecutor, CommandRequest};
use crate::inventory::Device;
use crate::lookup::{Manufacturer, ManufacturerLookup};
use crate::normalize::Row;
use crate::session::{
    ExecOutput, PtyChannel, PtyInput, PtyOutput, RemoteShell, ShellConnector, TerminalSize,
};

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone)]
enum Reply {
    Rows(Vec<Row>),
    Fail(String),
    Hang,
}

#[derive(Default)]
struct Script {
    replies: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
    calls: Vec<String>,
}

/// Executor answering from a command → reply table.
///
/// Clones share the table and the call log. Unscripted commands fail as
/// unstructured output.
#[derive(Clone, Default)]
pub(crate) struct ScriptedExecutor {
    script: Arc<Mutex<Script>>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with the rows of a JSON array.
    pub(crate) fn rows(self, command: &str, rows: Value) -> Self {
        let rows = rows
            .as_array()
            .expect("rows must be a JSON array")
            .iter()
            .map(|row| row.as_object().cloned().expect("row must be an object"))
            .collect();
        self.reply(command, Reply::Rows(rows))
    }

    /// Answer `command` with a remote error.
    pub(crate) fn fail(self, command: &str, message: &str) -> Self {
        self.reply(command, Reply::Fail(message.to_string()))
    }

    /// Never answer `command`.
    pub(crate) fn hang(self, command: &str) -> Self {
        self.reply(command, Reply::Hang)
    }

    /// Wait before answering `command`.
    pub(crate) fn delay(self, command: &str, delay: Duration) -> Self {
        self.script
            .lock()
            .unwrap()
            .delays
            .insert(command.to_string(), delay);
        self
    }

    fn reply(self, command: &str, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .insert(command.to_string(), reply);
        self
    }

    /// Commands executed so far, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, request: &CommandRequest) -> std::result::Result<Vec<Row>, ExecutorError> {
        let (reply, delay) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(request.command.clone());
            (
                script.replies.get(&request.command).cloned(),
                script.delays.get(&request.command).copied(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Fail(message)) => Err(ExecutorError::Remote { message }),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ExecutorError::Timeout(Duration::from_secs(3600)))
            }
            None => Err(ExecutorError::Unstructured {
                command: request.command.clone(),
            }),
        }
    }
}

/// Manufacturer lookup from a fixed table.
#[derive(Default)]
pub(crate) struct StaticLookup {
    names: HashMap<String, String>,
}

impl StaticLookup {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, mac: &str, name: &str) -> Self {
        self.names.insert(mac.to_string(), name.to_string());
        self
    }
}

impl ManufacturerLookup for StaticLookup {
    fn lookup(&self, mac: &str) -> Manufacturer {
        Manufacturer {
            name: self.names.get(mac).cloned(),
            comment: None,
        }
    }
}

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    closes: AtomicUsize,
    ptys: AtomicUsize,
}

/// Connector to in-process echo shells.
///
/// `exec` echoes the command on stdout, except `fail` (errors), `hang`
/// (never returns) and `stderr` (writes to stderr). The PTY echoes input,
/// answers a resize with `resized COLSxROWS`, and ends on `exit\r`.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    counters: Arc<Counters>,
    failing: bool,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A connector whose logins are refused.
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn ptys(&self) -> usize {
        self.counters.ptys.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShellConnector for FakeConnector {
    async fn connect(&self, device: &Device) -> Result<Arc<dyn RemoteShell>> {
        if self.failing {
            return Err(TransportError::AuthenticationFailed {
                user: device.credentials.username.clone(),
            }
            .into());
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeShell {
            counters: self.counters.clone(),
        }))
    }
}

struct FakeShell {
    counters: Arc<Counters>,
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn exec(&self, command: &str) -> Result<ExecOutput> {
        match command {
            "fail" => Err(SessionError::Closed.into()),
            "hang" => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SessionError::Closed.into())
            }
            "stderr" => Ok(ExecOutput {
                stdout: String::new(),
                stderr: "% Invalid input\n".to_string(),
                exit_status: Some(1),
            }),
            _ => Ok(ExecOutput {
                stdout: format!("{}\n", command),
                stderr: String::new(),
                exit_status: Some(0),
            }),
        }
    }

    async fn open_pty(&self, _size: TerminalSize) -> Result<PtyChannel> {
        self.counters.ptys.fetch_add(1, Ordering::SeqCst);
        let (input, mut input_rx) = mpsc::unbounded_channel();
        let (output_tx, output) = mpsc::channel(16);

        tokio::spawn(async move {
            while let Some(input) = input_rx.recv().await {
                let reply = match input {
                    PtyInput::Data(data) if &data[..] == b"exit\r" => PtyOutput::Closed,
                    PtyInput::Data(data) => PtyOutput::Data(data),
                    PtyInput::Resize(size) => {
                        PtyOutput::Data(Bytes::from(format!("resized {}x{}", size.cols, size.rows)))
                    }
                    PtyInput::Close => PtyOutput::Closed,
                };
                let closed = reply == PtyOutput::Closed;
                if output_tx.send(reply).await.is_err() || closed {
                    break;
                }
            }
        });

        Ok(PtyChannel { input, output })
    }

    async fn close(&self) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
