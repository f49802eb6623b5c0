//! In-memory [`SocketClient`] for unit tests.
//!
//! Records every open, send and close. Tests drive the socket lifecycle by
//! emitting events through the sink captured at open time.

use std::sync::{Arc, Mutex};

use super::{EventSink, SocketClient, SocketEvent, SocketHandle, TransportError};
use crate::target::ConnectionTarget;

#[derive(Debug, Clone)]
pub struct OpenCall {
    pub target: ConnectionTarget,
    pub sink: EventSink,
}

impl OpenCall {
    pub fn emit(&self, event: SocketEvent) {
        self.sink.emit(event);
    }
}

#[derive(Default)]
struct Recorded {
    opens: Vec<OpenCall>,
    sent: Vec<String>,
    closes: Vec<(u64, u16)>,
    fail_next_open: bool,
}

#[derive(Clone, Default)]
pub struct MockClient {
    inner: Arc<Mutex<Recorded>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opens(&self) -> Vec<OpenCall> {
        self.inner.lock().unwrap().opens.clone()
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().unwrap().opens.len()
    }

    pub fn last_open(&self) -> OpenCall {
        self.opens().pop().expect("no socket was opened")
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// `(generation, code)` of every close request.
    pub fn closes(&self) -> Vec<(u64, u16)> {
        self.inner.lock().unwrap().closes.clone()
    }

    pub fn fail_next_open(&self) {
        self.inner.lock().unwrap().fail_next_open = true;
    }
}

impl SocketClient for MockClient {
    fn open(
        &self,
        target: &ConnectionTarget,
        events: EventSink,
    ) -> Result<Box<dyn SocketHandle>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        let generation = events.generation();
        inner.opens.push(OpenCall {
            target: target.clone(),
            sink: events,
        });
        if std::mem::take(&mut inner.fail_next_open) {
            return Err(TransportError::InvalidRequest {
                url: target.url().to_string(),
                reason: "mock refused".to_string(),
            });
        }
        Ok(Box::new(MockHandle {
            generation,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MockHandle {
    generation: u64,
    inner: Arc<Mutex<Recorded>>,
}

impl SocketHandle for MockHandle {
    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.inner.lock().unwrap().sent.push(text.to_string());
        Ok(())
    }

    fn close(&mut self, code: u16, _reason: &str) -> Result<(), TransportError> {
        self.inner
            .lock()
            .unwrap()
            .closes
            .push((self.generation, code));
        Ok(())
    }
}
