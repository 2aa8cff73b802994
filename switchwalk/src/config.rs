//! File and environment configuration for the `switchwalk` binary.
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! `SWITCHWALK_` environment variables (nested keys separated by `__`,
//! e.g. `SWITCHWALK_WALK__COMMAND_TIMEOUT_SECS=90`).
//!
//! ```toml
//! [executor]
//! program = "/opt/switchwalk/.venv/bin/python"
//! args = ["/opt/switchwalk/netmiko_command.py"]
//!
//! [walk]
//! failure_policy = "abort"
//!
//! [[devices]]
//! host = "10.0.0.1"
//! device_type = "cisco_ios"
//! username = "netops"
//! password = "secret"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::executor::ProcessExecutor;
use crate::inventory::{Inventory, NewDevice};
use crate::session::{EventBus, SessionConfig, SessionManager, TerminalSize};
use crate::transport::{HostKeyVerification, SshConnector};
use crate::walk::{BatchFailurePolicy, WalkConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub executor: ExecutorSettings,
    pub walk: WalkSettings,
    pub session: SessionSettings,
    pub relay: RelaySettings,
    pub devices: Vec<DeviceConfig>,
}

/// External command executor process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["netmiko_command.py".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkSettings {
    /// Bounds each walk step and the executor process it runs.
    pub command_timeout_secs: u64,
    pub failure_policy: BatchFailurePolicy,
}

impl Default for WalkSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: 60,
            failure_policy: BatchFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub exec_timeout_secs: u64,
    pub connect_timeout_secs: u64,

    /// Per-device broadcast buffer; slow observers lose the oldest events.
    pub event_capacity: usize,

    pub terminal: TerminalSize,
    pub host_key_verification: HostKeyVerification,
    pub known_hosts_path: Option<PathBuf>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            exec_timeout_secs: 60,
            connect_timeout_secs: 30,
            event_capacity: EventBus::DEFAULT_CAPACITY,
            terminal: TerminalSize::default(),
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub listen: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

/// A device seeded into the inventory at startup.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub device_type: String,
    pub username: String,
    pub password: String,
}

fn default_port() -> u16 {
    22
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("device_type", &self.device_type)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl From<&DeviceConfig> for NewDevice {
    fn from(device: &DeviceConfig) -> Self {
        NewDevice::new(&device.host, &device.device_type)
            .port(device.port)
            .credentials(&device.username, &device.password)
    }
}

impl AppConfig {
    /// Defaults, overridden by `path` (if it exists), then the environment.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SWITCHWALK_").split("__"))
    }

    /// Load configuration from a TOML file and the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// Parse configuration from a TOML string, without environment overrides.
    pub fn from_toml(toml: &str) -> Result<Self> {
        Ok(Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(toml))
            .extract()?)
    }

    pub fn walk_config(&self) -> WalkConfig {
        WalkConfig {
            command_timeout: Duration::from_secs(self.walk.command_timeout_secs),
            failure_policy: self.walk.failure_policy,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            exec_timeout: Duration::from_secs(self.session.exec_timeout_secs),
            terminal_size: self.session.terminal,
        }
    }

    /// The executor process, killed after `walk.command_timeout_secs`.
    pub fn executor(&self) -> ProcessExecutor {
        ProcessExecutor::new(&self.executor.program)
            .args(self.executor.args.iter().cloned())
            .timeout(Duration::from_secs(self.walk.command_timeout_secs))
    }

    pub fn connector(&self) -> SshConnector {
        let connector = SshConnector::new()
            .timeout(Duration::from_secs(self.session.connect_timeout_secs))
            .host_key_verification(self.session.host_key_verification.clone());
        match &self.session.known_hosts_path {
            Some(path) => connector.known_hosts_path(path),
            None => connector,
        }
    }

    /// An inventory holding every configured device.
    pub fn inventory(&self) -> Inventory {
        let inventory = Inventory::new();
        for device in &self.devices {
            inventory.add_device(device.into());
        }
        inventory
    }

    /// A session manager over SSH with this configuration's settings.
    pub fn session_manager(&self, inventory: Arc<Inventory>) -> SessionManager {
        SessionManager::new(
            inventory,
            Arc::new(self.connector()),
            Arc::new(EventBus::new(self.session.event_capacity)),
            self.session_config(),
        )
    }
}
