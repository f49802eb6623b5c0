use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::{ConnectionSnapshot, ManagerConfig, ManagerError, Phase, Request, NORMAL_CLOSURE};
use crate::bridge::{Event, EventBridge};
use crate::reconnect::{ReconnectPolicy, RetryTicket};
use crate::target::{ConnectionConfig, ConnectionTarget, TargetBuilder};
use crate::transport::{EventSink, SocketClient, SocketEvent, SocketHandle, TaggedEvent};

/// Everything the manager knows about the connection. Owned by [`Worker`].
pub(super) struct ConnectionState {
    pub(super) phase: Phase,
    pub(super) active_target: Option<ConnectionTarget>,
    pub(super) generation: u64,
    pub(super) live_socket: Option<Box<dyn SocketHandle>>,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            active_target: None,
            generation: 0,
            live_socket: None,
        }
    }
}

pub(super) struct Worker {
    state: ConnectionState,
    client: Arc<dyn SocketClient>,
    bridge: EventBridge,
    policy: ReconnectPolicy,
    builder: TargetBuilder,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    retry: Option<RetryTicket>,
    reconnect_attempts: u32,
}

impl Worker {
    pub(super) fn new(
        client: Arc<dyn SocketClient>,
        bridge: EventBridge,
        config: ManagerConfig,
        events_tx: mpsc::UnboundedSender<TaggedEvent>,
    ) -> Self {
        Self {
            state: ConnectionState::new(),
            client,
            bridge,
            policy: config.policy,
            builder: config.builder,
            events_tx,
            retry: None,
            reconnect_attempts: 0,
        }
    }

    /// Drains, in priority order, a due retry, socket events and requests.
    pub(super) async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut events: mpsc::UnboundedReceiver<TaggedEvent>,
    ) {
        debug!("connection manager started");
        loop {
            let retry_due = self.retry.map(|t| t.due).unwrap_or_else(Instant::now);
            tokio::select! {
                biased;
                _ = sleep_until(retry_due), if self.retry.is_some() => {
                    if let Some(ticket) = self.retry.take() {
                        self.fire_retry(ticket);
                    }
                }
                Some(tagged) = events.recv() => self.on_socket_event(tagged),
                request = requests.recv() => match request {
                    Some(Request::Shutdown { reply }) => {
                        self.teardown("shutdown");
                        let _ = reply.send(());
                        break;
                    }
                    Some(request) => self.handle(request),
                    None => {
                        self.teardown("all handles dropped");
                        break;
                    }
                },
            }
        }
        debug!("connection manager stopped");
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Connect { config, reply } => {
                let _ = reply.send(self.connect(config));
            }
            Request::Disconnect { reply } => {
                self.disconnect("client disconnect");
                let _ = reply.send(());
            }
            Request::Send { text, reply } => {
                let _ = reply.send(self.send(&text));
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Request::Shutdown { reply } => {
                self.teardown("shutdown");
                let _ = reply.send(());
            }
        }
    }

    fn connect(&mut self, config: ConnectionConfig) -> Result<(), ManagerError> {
        if self.state.phase != Phase::Idle {
            debug!(phase = %self.state.phase, "replacing active connection");
            self.disconnect("replaced by new connect");
        }

        self.state.generation += 1;
        let target = self.builder.build(&config);
        info!(
            kind = config.kind(),
            url = %target,
            generation = self.state.generation,
            "connecting"
        );
        self.state.active_target = Some(target);
        self.reconnect_attempts = 0;
        self.open_active()
    }

    /// Opens the active target under the current generation.
    fn open_active(&mut self) -> Result<(), ManagerError> {
        let Some(target) = self.state.active_target.as_ref() else {
            return Ok(());
        };

        self.state.phase = Phase::Connecting;
        let sink = EventSink::new(self.state.generation, self.events_tx.clone());
        match self.client.open(target, sink) {
            Ok(socket) => {
                self.state.live_socket = Some(socket);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, url = %target, "could not start connection attempt");
                self.connection_lost(&e.to_string());
                Err(ManagerError::Transport(e))
            }
        }
    }

    fn fire_retry(&mut self, ticket: RetryTicket) {
        if !ticket.is_current(self.state.generation) || self.state.phase != Phase::Reconnecting {
            debug!(
                ticket = ticket.generation,
                current = self.state.generation,
                "stale retry ignored"
            );
            return;
        }

        self.state.generation += 1;
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        info!(
            attempt = self.reconnect_attempts,
            generation = self.state.generation,
            "reconnecting"
        );
        // A synchronous failure has already scheduled the next ticket.
        let _ = self.open_active();
    }

    fn disconnect(&mut self, reason: &str) {
        let previous = self.state.phase;
        self.retry = None;
        self.state.generation += 1;

        if let Some(mut socket) = self.state.live_socket.take() {
            self.state.phase = Phase::Closing;
            if let Err(e) = socket.close(NORMAL_CLOSURE, reason) {
                warn!(error = %e, "close failed, forcing idle");
            }
        }

        self.state.phase = Phase::Idle;
        self.state.active_target = None;
        self.reconnect_attempts = 0;

        if previous != Phase::Idle {
            info!(%reason, "disconnected");
            self.bridge.publish(Event::status(false));
        }
    }

    fn teardown(&mut self, reason: &str) {
        debug!(%reason, "tearing down connection manager");
        self.disconnect(reason);
    }

    fn send(&self, text: &str) -> Result<(), ManagerError> {
        match (self.state.phase, self.state.live_socket.as_ref()) {
            (Phase::Open, Some(socket)) => socket.send_text(text).map_err(|e| {
                warn!(error = %e, "send failed");
                ManagerError::Transport(e)
            }),
            (phase, _) => {
                warn!(%phase, "send rejected, not connected");
                Err(ManagerError::NotConnected)
            }
        }
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            phase: self.state.phase,
            generation: self.state.generation,
            target: self.state.active_target.as_ref().map(|t| t.url().to_string()),
            reconnect_attempts: self.reconnect_attempts,
        }
    }

    fn on_socket_event(&mut self, tagged: TaggedEvent) {
        if tagged.generation != self.state.generation {
            debug!(
                event = ?tagged.event,
                generation = tagged.generation,
                current = self.state.generation,
                "stale socket event dropped"
            );
            return;
        }

        match tagged.event {
            SocketEvent::Opened => {
                if self.state.phase != Phase::Connecting {
                    debug!(phase = %self.state.phase, "unexpected open ignored");
                    return;
                }
                self.state.phase = Phase::Open;
                self.reconnect_attempts = 0;
                info!(generation = self.state.generation, "connection open");
                self.bridge.publish(Event::status(true));
            }
            SocketEvent::Text(text) => self.bridge.publish(Event::message(text)),
            SocketEvent::Binary(bytes) => self.bridge.publish(Event::message(hex::encode(bytes))),
            SocketEvent::Closed { code, reason } => {
                let reason = match code {
                    Some(code) => format!("closed by peer ({}): {}", code, reason),
                    None => format!("closed: {}", reason),
                };
                self.connection_lost(&reason);
            }
            SocketEvent::Failed(reason) => self.connection_lost(&reason),
        }
    }

    /// Unexpected loss of the current socket: go to Reconnecting and schedule
    /// a retry of the same target.
    fn connection_lost(&mut self, reason: &str) {
        match self.state.phase {
            Phase::Connecting | Phase::Open => {}
            phase => {
                debug!(%phase, %reason, "loss ignored");
                return;
            }
        }

        self.state.live_socket = None;
        self.state.phase = Phase::Reconnecting;
        let ticket = self.policy.on_failure(self.state.generation);
        self.retry = Some(ticket);
        warn!(
            %reason,
            retry_in = %humantime::format_duration(self.policy.delay()),
            "connection lost"
        );
        self.bridge.publish(Event::status(false));
    }
}
