//! IPC wire types for the JSON Lines protocol over the daemon's Unix socket.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::bridge::Event;
use crate::control::ControlError;
use crate::manager::ConnectionSnapshot;

/// IPC protocol version. Included in every message for forward/backward
/// compatibility.
pub const IPC_VERSION: u32 = 1;

/// Commands understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpcCommandKind {
    ConnectDirect,
    ConnectStructured,
    ConnectLegacy,
    Disconnect,
    SendMessage,
    Status,
    Subscribe,
}

impl IpcCommandKind {
    pub const ALL: [IpcCommandKind; 7] = [
        IpcCommandKind::ConnectDirect,
        IpcCommandKind::ConnectStructured,
        IpcCommandKind::ConnectLegacy,
        IpcCommandKind::Disconnect,
        IpcCommandKind::SendMessage,
        IpcCommandKind::Status,
        IpcCommandKind::Subscribe,
    ];

    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            IpcCommandKind::ConnectDirect => "connectDirect",
            IpcCommandKind::ConnectStructured => "connectStructured",
            IpcCommandKind::ConnectLegacy => "connectLegacy",
            IpcCommandKind::Disconnect => "disconnect",
            IpcCommandKind::SendMessage => "sendMessage",
            IpcCommandKind::Status => "status",
            IpcCommandKind::Subscribe => "subscribe",
        }
    }
}

impl fmt::Display for IpcCommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for IpcCommandKind {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IpcCommandKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// Incoming command from a client to the daemon.
///
/// Every message is a single JSON line:
/// `{"version": 1, "cmd": "connectDirect", "params": {"url": "wss://..."}}\n`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IpcCommand {
    /// Protocol version (must be [`IPC_VERSION`]).
    pub version: u32,
    /// Command name, see [`IpcCommandKind`].
    pub cmd: String,
    /// Command parameters. Missing means empty.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl IpcCommand {
    pub fn new(kind: IpcCommandKind) -> Self {
        Self {
            version: IPC_VERSION,
            cmd: kind.to_string(),
            params: Map::new(),
        }
    }

    /// Adds a parameter and returns self for chaining.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Serializes to a JSON line (with trailing newline).
    pub fn to_json_line(&self) -> String {
        let json = serde_json::to_string(self).expect("failed to serialize IpcCommand");
        format!("{}\n", json)
    }
}

/// Response envelope from daemon to client.
///
/// Sent as a single JSON line: `{"version": 1, "ok": true, ...}\n`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IpcResponse {
    /// Protocol version.
    pub version: u32,
    /// Whether the command succeeded.
    pub ok: bool,
    /// Error message when `ok` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable error code when `ok` is false (e.g. `INVALID_ARGUMENT`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Command-specific payload (varies by command).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl IpcResponse {
    /// Creates a success response with optional data payload.
    pub fn success(data: Option<Value>) -> Self {
        Self {
            version: IPC_VERSION,
            ok: true,
            error: None,
            code: None,
            data,
        }
    }

    /// Creates an error response with the given code and message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            version: IPC_VERSION,
            ok: false,
            error: Some(message.into()),
            code: Some(code.into()),
            data: None,
        }
    }

    /// Serializes to a JSON line (with trailing newline).
    pub fn to_json_line(&self) -> String {
        let json = serde_json::to_string(self).expect("failed to serialize IpcResponse");
        format!("{}\n", json)
    }
}

impl From<&ControlError> for IpcResponse {
    fn from(err: &ControlError) -> Self {
        IpcResponse::error(err.code(), err.to_string())
    }
}

impl From<Result<Value, ControlError>> for IpcResponse {
    fn from(result: Result<Value, ControlError>) -> Self {
        match result {
            Ok(data) => IpcResponse::success(Some(data)),
            Err(e) => IpcResponse::from(&e),
        }
    }
}

/// Payload of the `status` command.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    pub uptime_seconds: u64,
    /// Open client connections on the daemon socket, this one included.
    pub clients: usize,
    /// Whether a subscriber currently receives events.
    pub subscribed: bool,
    pub socket_path: String,
    pub connection: ConnectionSnapshot,
}

/// Event pushed from daemon to a subscriber.
///
/// Sent as a single JSON line on the subscribe stream.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IpcNotification {
    /// Protocol version.
    pub version: u32,
    /// Notification type: "status" or "message".
    #[serde(rename = "type")]
    pub notification_type: String,
    /// Connection state (for "status" notifications).
    #[serde(
        rename = "isConnected",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_connected: Option<bool>,
    /// Received frame (for "message" notifications).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IpcNotification {
    pub fn status(is_connected: bool) -> Self {
        Self {
            version: IPC_VERSION,
            notification_type: "status".to_string(),
            is_connected: Some(is_connected),
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            version: IPC_VERSION,
            notification_type: "message".to_string(),
            is_connected: None,
            message: Some(message.into()),
        }
    }

    /// Serializes to a JSON line (with trailing newline).
    pub fn to_json_line(&self) -> String {
        let json = serde_json::to_string(self).expect("failed to serialize IpcNotification");
        format!("{}\n", json)
    }
}

impl From<&Event> for IpcNotification {
    fn from(event: &Event) -> Self {
        match event {
            Event::ConnectionStatusChanged { is_connected } => IpcNotification::status(*is_connected),
            Event::MessageReceived { message } => IpcNotification::message(message.clone()),
        }
    }
}
