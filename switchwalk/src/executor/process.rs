//! Command executor backed by an external parser process.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace, warn};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{CommandExecutor, CommandRequest};
use crate::error::ExecutorError;
use crate::normalize::Row;

/// Default bound on a single command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs a parser program once per command.
///
/// The request is written to the program's stdin as JSON:
///
/// ```json
/// {"device": {"device_type": "cisco_ios", "host": "10.0.0.1",
///             "username": "admin", "password": "...", "port": 22},
///  "command": "show version", "use_textfsm": true}
/// ```
///
/// and the program answers on stdout with a JSON array of rows, or an
/// object carrying an `error` key.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessExecutor {
    /// Create an executor for `program` with the default timeout.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append an argument passed before the request.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the per-command timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command_timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, request: &CommandRequest) -> Result<Vec<Row>, ExecutorError> {
        let payload = serde_json::to_vec(&WireRequest::from(request))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        trace!(
            "executor exited with {} ({} bytes stdout)",
            output.status,
            output.stdout.len()
        );

        if !output.status.success() {
            // A parser that reports a device error may also exit non-zero.
            if let Err(err @ ExecutorError::Remote { .. }) =
                decode_response(&request.command, &output.stdout)
            {
                return Err(err);
            }
            let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                "executor failed for '{}' on {}: {}",
                request.command, request.device.host, message
            );
            return Err(ExecutorError::ProcessFailed {
                status: output.status.to_string(),
                message,
            });
        }

        decode_response(&request.command, &output.stdout)
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, request: &CommandRequest) -> Result<Vec<Row>, ExecutorError> {
        debug!("executing '{}' on {}", request.command, request.device.host);
        // Dropping the run future kills the child.
        tokio::time::timeout(self.timeout, self.run(request))
            .await
            .map_err(|_| ExecutorError::Timeout(self.timeout))?
    }
}

#[derive(Serialize)]
struct WireDevice<'a> {
    device_type: &'a str,
    host: &'a str,
    username: &'a str,
    password: &'a str,
    port: u16,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    device: WireDevice<'a>,
    command: &'a str,
    use_textfsm: bool,
}

impl<'a> From<&'a CommandRequest> for WireRequest<'a> {
    fn from(request: &'a CommandRequest) -> Self {
        Self {
            device: WireDevice {
                device_type: &request.device.device_type,
                host: &request.device.host,
                username: &request.device.username,
                password: request.device.password.expose_secret(),
                port: request.device.port,
            },
            command: &request.command,
            use_textfsm: request.use_textfsm,
        }
    }
}

/// Decode the executor's stdout into rows.
pub(crate) fn decode_response(command: &str, stdout: &[u8]) -> Result<Vec<Row>, ExecutorError> {
    let unstructured = || ExecutorError::Unstructured {
        command: command.to_string(),
    };

    match serde_json::from_slice::<Value>(stdout)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                _ => Err(unstructured()),
            })
            .collect(),
        Value::Object(mut object) => match object.remove("error") {
            Some(Value::String(message)) => Err(ExecutorError::Remote { message }),
            Some(other) => Err(ExecutorError::Remote {
                message: other.to_string(),
            }),
            None => Ok(vec![object]),
        },
        _ => Err(unstructured()),
    }
}
