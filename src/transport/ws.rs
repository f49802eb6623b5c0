//! WebSocket transport backed by `tokio-tungstenite`.
//!
//! Each [`WsClient::open`] spawns one task that performs the handshake and then
//! multiplexes inbound frames with outbound commands from the [`WsHandle`].

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::{EventSink, SocketClient, SocketEvent, SocketHandle, TransportError};
use crate::target::ConnectionTarget;

/// Handshakes that take longer than this are reported as failures.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens real WebSocket connections on the current tokio runtime.
#[derive(Debug, Clone)]
pub struct WsClient {
    connect_timeout: Duration,
}

impl WsClient {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketClient for WsClient {
    fn open(
        &self,
        target: &ConnectionTarget,
        events: EventSink,
    ) -> Result<Box<dyn SocketHandle>, TransportError> {
        let request = handshake_request(target)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::Runtime(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tracing::debug!(
            url = %target.url(),
            headers = target.headers().len(),
            generation = events.generation(),
            "opening websocket"
        );
        runtime.spawn(run_socket(request, events, outbound_rx, self.connect_timeout));

        Ok(Box::new(WsHandle {
            outbound: outbound_tx,
        }))
    }
}

/// Builds the handshake request for `target`, attaching its headers.
fn handshake_request(target: &ConnectionTarget) -> Result<Request, TransportError> {
    let invalid = |reason: String| TransportError::InvalidRequest {
        url: target.url().to_string(),
        reason,
    };

    let mut request = target
        .url()
        .into_client_request()
        .map_err(|e| invalid(e.to_string()))?;

    for (key, value) in target.headers() {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| invalid(format!("header {:?}: {}", key, e)))?;
        let value =
            HeaderValue::from_str(value).map_err(|e| invalid(format!("header {:?}: {}", key, e)))?;
        request.headers_mut().insert(name, value);
    }

    Ok(request)
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

struct WsHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SocketHandle for WsHandle {
    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(text.to_string()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .map_err(|_| TransportError::Closed)
    }
}

async fn run_socket(
    request: Request,
    events: EventSink,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    connect_timeout: Duration,
) {
    let connecting = tokio::time::timeout(
        connect_timeout,
        tokio_tungstenite::connect_async(request),
    );
    tokio::pin!(connecting);

    let stream = loop {
        tokio::select! {
            result = &mut connecting => match result {
                Ok(Ok((stream, _response))) => break stream,
                Ok(Err(e)) => {
                    events.failed(e.to_string());
                    return;
                }
                Err(_) => {
                    events.failed(format!(
                        "handshake timed out after {}",
                        humantime::format_duration(connect_timeout)
                    ));
                    return;
                }
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(_)) => {
                    tracing::debug!("dropping frame queued before the handshake finished");
                }
                Some(Outbound::Close { .. }) | None => {
                    tracing::debug!(generation = events.generation(), "open abandoned");
                    return;
                }
            },
        }
    };

    events.opened();
    let (mut sink, mut stream) = stream.split();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    events.emit(SocketEvent::Text(text.as_str().to_string()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    events.emit(SocketEvent::Binary(bytes.to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_string()),
                        None => (None, String::new()),
                    };
                    // Flushes the queued close reply so the peer sees a
                    // finished handshake.
                    let _ = sink.close().await;
                    events.emit(SocketEvent::Closed { code, reason });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    events.failed(e.to_string());
                    return;
                }
                None => {
                    events.emit(SocketEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                    return;
                }
            },
            command = outbound.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        events.failed(e.to_string());
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        tracing::debug!(error = %e, "close frame not delivered");
                    }
                    events.emit(SocketEvent::Closed {
                        code: Some(code),
                        reason,
                    });
                    return;
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    tracing::debug!(generation = events.generation(), "socket handle dropped");
                    return;
                }
            },
        }
    }
}
