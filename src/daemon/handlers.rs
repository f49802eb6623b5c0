//! Command handlers for the daemon socket protocol.
//!
//! Each `handle_*` function processes a single JSON IPC command received from
//! a client connection and returns a JSON Lines response string (or streams
//! events for `subscribe`).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::bridge::{Event, EventBridge};
use crate::control::ControlSurface;
use crate::ipc::{DaemonStatus, IpcCommand, IpcCommandKind, IpcNotification, IpcResponse, IPC_VERSION};

/// Shared daemon state passed to each client handler.
#[derive(Clone)]
pub(super) struct DaemonState {
    pub(super) control: ControlSurface,
    pub(super) bridge: EventBridge,
    pub(super) start_time: Instant,
    pub(super) active_connections: Arc<AtomicUsize>,
    pub(super) socket_path: String,
}

/// Handles every command except `subscribe`.
pub(super) async fn handle_command(cmd: &IpcCommand, state: &DaemonState) -> String {
    if cmd.version != IPC_VERSION {
        return IpcResponse::error(
            "UNSUPPORTED_VERSION",
            format!(
                "protocol version {} not supported (expected {})",
                cmd.version, IPC_VERSION
            ),
        )
        .to_json_line();
    }

    if cmd.cmd == IpcCommandKind::Status.as_str() {
        return handle_status_command(state).await;
    }

    let result = state.control.dispatch(&cmd.cmd, &cmd.params).await;
    if let Err(e) = &result {
        tracing::debug!(cmd = %cmd.cmd, code = e.code(), error = %e, "command failed");
    }
    IpcResponse::from(result).to_json_line()
}

/// Handles the `status` command.
///
/// Returns daemon health plus the connection snapshot.
pub(super) async fn handle_status_command(state: &DaemonState) -> String {
    let connection = match state.control.status().await {
        Ok(snapshot) => snapshot,
        Err(e) => return IpcResponse::from(&e).to_json_line(),
    };

    let status = DaemonStatus {
        uptime_seconds: state.start_time.elapsed().as_secs(),
        clients: state.active_connections.load(Ordering::Relaxed),
        subscribed: state.bridge.has_listener(),
        socket_path: state.socket_path.clone(),
        connection,
    };

    IpcResponse::success(Some(
        serde_json::to_value(&status).expect("failed to serialize DaemonStatus"),
    ))
    .to_json_line()
}

/// Handles the `subscribe` command.
///
/// Installs this client as the bridge's listener and streams one
/// `IpcNotification` per event. Returns when the client disconnects or a newer
/// subscriber replaces this one.
pub(super) async fn handle_subscribe_command<R, W>(
    bridge: &EventBridge,
    reader: &mut R,
    writer: &mut W,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let id = bridge.register(Arc::new(tx));
    tracing::debug!(listener = %id, "client subscribed");

    let ok_msg = IpcResponse::success(Some(serde_json::json!({ "subscribed": true })));
    if write_or_disconnect(writer, &ok_msg.to_json_line()).await {
        bridge.unregister(id);
        return Ok(());
    }

    let mut discard = String::new();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    let notification = IpcNotification::from(&event);
                    if write_or_disconnect(writer, &notification.to_json_line()).await {
                        break;
                    }
                }
                None => {
                    tracing::debug!(listener = %id, "subscriber replaced");
                    break;
                }
            },
            read = reader.read_line(&mut discard) => match read {
                Ok(0) | Err(_) => {
                    tracing::debug!(listener = %id, "subscriber disconnected");
                    break;
                }
                Ok(_) => discard.clear(),
            },
        }
    }

    bridge.unregister(id);
    Ok(())
}

/// Writes a message to the client. Returns `true` if the client disconnected.
async fn write_or_disconnect<W: AsyncWrite + Unpin>(writer: &mut W, message: &str) -> bool {
    if let Err(e) = writer.write_all(message.as_bytes()).await {
        tracing::debug!("Subscriber disconnected (write failed): {}", e);
        return true;
    }
    if let Err(e) = writer.flush().await {
        tracing::debug!("Subscriber disconnected (flush failed): {}", e);
        return true;
    }
    false
}
