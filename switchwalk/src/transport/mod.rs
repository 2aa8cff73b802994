//! SSH transport layer wrapping russh.
//!
//! Provides connection setup, authentication and host-key checking for the
//! interactive session manager. [`SshConnector`] is the production
//! [`ShellConnector`](crate::session::ShellConnector).

pub mod config;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
pub use ssh::{SshConnector, SshTransport};
