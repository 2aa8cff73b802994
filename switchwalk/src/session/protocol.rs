//! Messages of the interactive terminal protocol.
//!
//! Each message is one JSON object tagged by `type`:
//!
//! ```text
//! → {"type": "connect", "host": "10.0.0.1", "port": 22, "username": "admin", "password": "..."}
//! ← {"type": "connected"}
//! → {"type": "data", "data": "show clock\r"}
//! ← {"type": "data", "data": "12:00:00.000 UTC Mon Jan 1 2024\r\nsw1#"}
//! → {"type": "resize", "cols": 132, "rows": 50}
//! ← {"type": "error", "message": "..."}
//! ← {"type": "disconnected"}
//! ```

use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    22
}

/// Message from a terminal client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Connect {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
        username: String,
        password: String,
    },
    Data {
        data: String,
    },
    Resize {
        cols: u32,
        rows: u32,
    },
}

impl std::fmt::Debug for ClientMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientMessage::Connect {
                host,
                port,
                username,
                ..
            } => f
                .debug_struct("Connect")
                .field("host", host)
                .field("port", port)
                .field("username", username)
                .finish_non_exhaustive(),
            ClientMessage::Data { data } => f.debug_struct("Data").field("data", data).finish(),
            ClientMessage::Resize { cols, rows } => f
                .debug_struct("Resize")
                .field("cols", cols)
                .field("rows", rows)
                .finish(),
        }
    }
}

/// Message to a terminal client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Connected,
    Data { data: String },
    Error { message: String },
    Disconnected,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
