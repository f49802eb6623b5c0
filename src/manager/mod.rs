//! Connection manager.
//!
//! One tokio task owns the [`ConnectionState`](state::ConnectionState) and is
//! the only place it is ever mutated. Control calls, socket callbacks and
//! retry timers all reach it as messages, so transitions are serialized
//! without a lock. Asynchronous results carry the generation they were issued
//! under and are discarded once the generation has moved on.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──opened──▶ Open ──disconnect──▶ Closing ──▶ Idle
//!                       ▲    │                │
//!                       │    └──failed──┐     └──closed/failed──┐
//!                       │               ▼                       ▼
//!                       └──retry due── Reconnecting ◀───────────┘
//! ```

mod state;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::bridge::EventBridge;
use crate::reconnect::ReconnectPolicy;
use crate::target::{ConnectionConfig, TargetBuilder};
use crate::transport::{SocketClient, TransportError};

use state::Worker;

/// Close code used for every manager-initiated close.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Lifecycle phase of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Connecting,
    Open,
    Closing,
    Reconnecting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Connecting => "connecting",
            Phase::Open => "open",
            Phase::Closing => "closing",
            Phase::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Read-only view of the manager, as reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub phase: Phase,
    pub generation: u64,
    /// Rendered URL of the active target.
    pub target: Option<String>,
    /// Automatic attempts since the last successful open or explicit connect.
    pub reconnect_attempts: u32,
}

impl ConnectionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Open
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// `send` was called while the connection is not open.
    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The manager task has exited.
    #[error("connection manager has stopped")]
    Stopped,
}

/// Knobs fixed at spawn time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagerConfig {
    pub policy: ReconnectPolicy,
    pub builder: TargetBuilder,
}

type Reply<T> = oneshot::Sender<T>;

pub(crate) enum Request {
    Connect {
        config: ConnectionConfig,
        reply: Reply<Result<(), ManagerError>>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Send {
        text: String,
        reply: Reply<Result<(), ManagerError>>,
    },
    Snapshot {
        reply: Reply<ConnectionSnapshot>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Cloneable handle to the manager task.
///
/// The task tears the connection down once every handle is dropped or
/// [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct ConnectionManager {
    requests: mpsc::UnboundedSender<Request>,
}

impl ConnectionManager {
    /// Spawns the manager task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(
        client: Arc<dyn SocketClient>,
        bridge: EventBridge,
        config: ManagerConfig,
    ) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let worker = Worker::new(client, bridge, config, events_tx);
        tokio::spawn(worker.run(requests_rx, events_rx));
        Self {
            requests: requests_tx,
        }
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .map_err(|_| ManagerError::Stopped)?;
        rx.await.map_err(|_| ManagerError::Stopped)
    }

    /// Starts a new logical connection, replacing any current one.
    ///
    /// `Ok` means the attempt was started, not that the socket is open. An
    /// error means the transport refused to start; a retry is still scheduled.
    pub async fn connect(&self, config: ConnectionConfig) -> Result<(), ManagerError> {
        self.call(|reply| Request::Connect { config, reply }).await?
    }

    /// Closes the connection and cancels pending retries. Idempotent.
    pub async fn disconnect(&self) -> Result<(), ManagerError> {
        self.call(|reply| Request::Disconnect { reply }).await
    }

    /// Queues `text` on the open socket.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), ManagerError> {
        let text = text.into();
        self.call(|reply| Request::Send { text, reply }).await?
    }

    pub async fn snapshot(&self) -> Result<ConnectionSnapshot, ManagerError> {
        self.call(|reply| Request::Snapshot { reply }).await
    }

    /// Tears the connection down and stops the task.
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        self.call(|reply| Request::Shutdown { reply }).await
    }

    pub fn is_running(&self) -> bool {
        !self.requests.is_closed()
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("running", &self.is_running())
            .finish()
    }
}
