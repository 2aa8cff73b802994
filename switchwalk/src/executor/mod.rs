//! Structured command execution.
//!
//! The walker never parses device text itself. It hands a command and the
//! device's connection parameters to a [`CommandExecutor`], which logs in,
//! runs the command, and returns parser rows.

mod process;

pub use process::ProcessExecutor;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::ExecutorError;
use crate::inventory::{Credentials, Device};
use crate::normalize::Row;

/// Connection parameters for one device.
#[derive(Debug)]
pub struct ConnectionParams {
    pub device_type: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl Clone for ConnectionParams {
    fn clone(&self) -> Self {
        Self {
            device_type: self.device_type.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: SecretString::from(self.password.expose_secret().to_owned()),
        }
    }
}

impl From<&Device> for ConnectionParams {
    fn from(device: &Device) -> Self {
        let Credentials { username, password } = device.credentials.clone();
        Self {
            device_type: device.device_type.clone(),
            host: device.host.clone(),
            port: device.port,
            username,
            password,
        }
    }
}

/// A single command to run on a device.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub device: ConnectionParams,
    pub command: String,

    /// Ask the executor to parse the output into rows.
    pub use_textfsm: bool,
}

impl CommandRequest {
    /// Create a structured request.
    pub fn new(device: ConnectionParams, command: impl Into<String>) -> Self {
        Self {
            device,
            command: command.into(),
            use_textfsm: true,
        }
    }
}

/// Runs commands on devices and returns structured rows.
///
/// Anything other than a list of rows is an error: a failed or timed-out
/// process, undecodable output, an error reported by the device, or text
/// that no parser template matched.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, request: &CommandRequest) -> Result<Vec<Row>, ExecutorError>;
}
