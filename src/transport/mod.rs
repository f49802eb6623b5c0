//! Socket transport seam.
//!
//! The manager never touches a WebSocket directly. It asks a [`SocketClient`]
//! to open a target and receives the socket's lifecycle through an
//! [`EventSink`] stamped with the generation that was current when the open
//! was requested. Frames, handshakes and TLS belong to the implementation.

mod ws;

#[cfg(test)]
pub(crate) mod mock;

pub use ws::WsClient;

use tokio::sync::mpsc;

use crate::target::ConnectionTarget;

/// Lifecycle notification from a live socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Handshake completed.
    Opened,
    /// Text frame received.
    Text(String),
    /// Binary frame received.
    Binary(Vec<u8>),
    /// Closed by either side.
    Closed { code: Option<u16>, reason: String },
    /// Handshake or I/O failure. The socket is gone afterwards.
    Failed(String),
}

/// A [`SocketEvent`] tagged with the generation of the socket that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: SocketEvent,
}

/// Where a socket reports its events.
///
/// Cheap to clone. Emitting after the receiver is gone is silently ignored.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: SocketEvent) {
        let _ = self.tx.send(TaggedEvent {
            generation: self.generation,
            event,
        });
    }

    pub fn opened(&self) {
        self.emit(SocketEvent::Opened);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.emit(SocketEvent::Failed(reason.into()));
    }
}

/// Errors reported synchronously by the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The target could not be turned into a handshake request.
    #[error("invalid request for {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    /// The socket task has already finished.
    #[error("socket is closed")]
    Closed,

    /// No async runtime is available to drive the socket.
    #[error("transport runtime unavailable: {0}")]
    Runtime(String),
}

/// A live socket owned by the manager.
pub trait SocketHandle: Send {
    /// Queues a text frame.
    fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Starts a close handshake. The final [`SocketEvent::Closed`] may or may
    /// not arrive; callers that stop caring bump their generation instead of
    /// waiting for it.
    fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Opens sockets.
pub trait SocketClient: Send + Sync {
    /// Begins opening `target`. Returns once the attempt has started; the
    /// outcome is reported through `events`.
    fn open(
        &self,
        target: &ConnectionTarget,
        events: EventSink,
    ) -> Result<Box<dyn SocketHandle>, TransportError>;
}
