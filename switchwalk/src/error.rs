//! Error types for switchwalk.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::inventory::DeviceId;

/// Main error type for switchwalk operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Command executor errors
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Vendor output normalization errors
    #[error("Normalize error: {0}")]
    Normalize(#[from] NormalizeError),

    /// Store merge errors
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    /// Walk orchestration errors
    #[error("Walk error: {0}")]
    Walk(#[from] WalkError),

    /// Interactive session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Manufacturer database could not be loaded
    #[error("Manufacturer lookup error: {0}")]
    Lookup(String),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),
}

impl Error {
    /// Whether this error is a timeout of a remote operation.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::Timeout(_))
                | Error::Executor(ExecutorError::Timeout(_))
                | Error::Session(SessionError::Timeout(_))
        )
    }

    /// Whether this error comes from configuration rather than the device.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::Normalize(NormalizeError::UnsupportedVendor { .. })
                | Error::Walk(WalkError::InvalidConfig { .. })
        )
    }
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Private key could not be loaded
    #[error("Key error: {0}")]
    Key(String),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host key did not match the one in known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host not present in known_hosts under strict verification
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// Reading or writing known_hosts failed
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from the structured command executor.
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// The executor process could not be started
    #[error("Failed to start executor '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Executor I/O failed after start
    #[error("Executor I/O error: {0}")]
    Io(#[from] io::Error),

    /// Command did not finish within the bound
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// Executor exited unsuccessfully
    #[error("Executor exited with status {status}: {message}")]
    ProcessFailed { status: String, message: String },

    /// The device or parser reported an error
    #[error("Remote error: {message}")]
    Remote { message: String },

    /// Output was not valid JSON
    #[error("Failed to decode executor response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Output was not structured rows (no parser template matched)
    #[error("Unstructured response for '{command}'")]
    Unstructured { command: String },
}

/// Errors mapping vendor rows into the canonical schema.
#[derive(Error, Debug)]
pub enum NormalizeError {
    /// No normalizer registered for the device type
    #[error("Unsupported vendor '{vendor}'")]
    UnsupportedVendor { vendor: String },

    /// Vendor already present in the registry
    #[error("Vendor '{vendor}' already registered")]
    AlreadyRegistered { vendor: String },

    /// Required field absent from the row
    #[error("Missing required field '{field}'")]
    MissingField { field: String },

    /// MAC value could not be parsed
    #[error("Invalid MAC address '{value}'")]
    InvalidMac { value: String },

    /// Response carried no rows where one is required
    #[error("Empty response for '{command}'")]
    EmptyResponse { command: String },
}

/// Errors merging canonical rows into the inventory.
#[derive(Error, Debug)]
pub enum MergeError {
    /// Device no longer exists
    #[error("Device {0} not found")]
    DeviceNotFound(DeviceId),

    /// MAC pivot no longer exists
    #[error("No MAC pivot for {mac} on device {device}")]
    PivotNotFound { device: DeviceId, mac: String },
}

/// Walk orchestration errors.
#[derive(Error, Debug)]
pub enum WalkError {
    /// Device is not in the inventory
    #[error("Device {0} not found")]
    UnknownDevice(DeviceId),

    /// Walker builder was missing a collaborator
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A batch unit panicked
    #[error("Unit {index} of batch '{batch}' panicked: {message}")]
    UnitPanicked {
        batch: String,
        index: usize,
        message: String,
    },

    /// A batch unit was cancelled before it finished
    #[error("Unit {index} of batch '{batch}' was lost: {message}")]
    UnitLost {
        batch: String,
        index: usize,
        message: String,
    },

    /// A batch finished with failures under the abort policy
    #[error("Batch '{batch}' had {failed} of {total} units fail")]
    BatchFailed {
        batch: String,
        failed: usize,
        total: usize,
    },
}

/// Interactive session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No open session for the device
    #[error("No open session for device {0}")]
    NotOpen(DeviceId),

    /// Device is not in the inventory
    #[error("Device {0} not found")]
    DeviceNotFound(DeviceId),

    /// No inventory device matches the connection target
    #[error("Unknown device {host}:{port}")]
    UnknownDevice { host: String, port: u16 },

    /// Terminal not attached on the session
    #[error("No terminal attached for device {0}")]
    NoTerminal(DeviceId),

    /// Remote channel closed
    #[error("Channel closed")]
    Closed,

    /// Command did not finish within the bound
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type alias using switchwalk's Error.
pub type Result<T> = std::result::Result<T, Error>;
