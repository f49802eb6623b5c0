use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::bridge::Event;
use crate::target::StructuredConfig;
use crate::transport::mock::MockClient;
use crate::transport::SocketEvent;

struct Harness {
    manager: ConnectionManager,
    client: MockClient,
    events: Arc<Mutex<Vec<Event>>>,
}

impl Harness {
    fn new() -> Self {
        let client = MockClient::new();
        let bridge = EventBridge::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        bridge.register(Arc::new(move |e: &Event| seen.lock().unwrap().push(e.clone())));
        let manager = ConnectionManager::spawn(
            Arc::new(client.clone()),
            bridge,
            ManagerConfig::default(),
        );
        Self {
            manager,
            client,
            events,
        }
    }

    /// Round-trips through the manager task so every event emitted before
    /// this call has been applied.
    async fn settle(&self) -> ConnectionSnapshot {
        self.manager.snapshot().await.expect("manager running")
    }

    fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    async fn open_direct(&self, url: &str) {
        self.manager
            .connect(ConnectionConfig::Direct {
                url: url.to_string(),
            })
            .await
            .expect("connect");
        self.client.last_open().emit(SocketEvent::Opened);
        self.settle().await;
    }
}

#[tokio::test]
async fn connect_then_open_reports_connected() {
    let h = Harness::new();
    h.manager
        .connect(ConnectionConfig::Direct {
            url: "wss://a/ws".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(h.settle().await.phase, Phase::Connecting);

    h.client.last_open().emit(SocketEvent::Opened);
    let snapshot = h.settle().await;
    assert_eq!(snapshot.phase, Phase::Open);
    assert_eq!(snapshot.target.as_deref(), Some("wss://a/ws"));
    assert_eq!(h.take_events(), vec![Event::status(true)]);
}

#[tokio::test]
async fn connect_while_open_disconnects_first() {
    let h = Harness::new();
    h.open_direct("wss://a/ws").await;
    h.take_events();

    h.open_direct("wss://b/ws").await;

    assert_eq!(h.take_events(), vec![Event::status(false), Event::status(true)]);
    assert_eq!(h.client.closes().len(), 1);
    assert_eq!(h.client.closes()[0].1, NORMAL_CLOSURE);
    assert_eq!(h.settle().await.target.as_deref(), Some("wss://b/ws"));
}

#[tokio::test(start_paused = true)]
async fn stale_failure_does_not_touch_new_connection() {
    let h = Harness::new();
    h.manager
        .connect(ConnectionConfig::Direct {
            url: "wss://a/ws".to_string(),
        })
        .await
        .unwrap();
    let first = h.client.last_open();
    h.manager
        .connect(ConnectionConfig::Direct {
            url: "wss://b/ws".to_string(),
        })
        .await
        .unwrap();
    h.take_events();

    first.emit(SocketEvent::Failed("late".to_string()));
    let snapshot = h.settle().await;
    assert_eq!(snapshot.phase, Phase::Connecting);
    assert!(h.take_events().is_empty());

    tokio::time::sleep(Duration::from_millis(6000)).await;
    h.settle().await;
    assert_eq!(h.client.open_count(), 2, "no retry from a stale failure");
}

#[tokio::test(start_paused = true)]
async fn retry_fires_once_after_five_seconds() {
    let h = Harness::new();
    h.open_direct("wss://a/ws").await;
    h.take_events();

    h.client
        .last_open()
        .emit(SocketEvent::Failed("reset".to_string()));
    assert_eq!(h.settle().await.phase, Phase::Reconnecting);
    assert_eq!(h.take_events(), vec![Event::status(false)]);

    tokio::time::sleep(Duration::from_millis(4999)).await;
    h.settle().await;
    assert_eq!(h.client.open_count(), 1);

    tokio::time::sleep(Duration::from_millis(1)).await;
    let snapshot = h.settle().await;
    assert_eq!(h.client.open_count(), 2);
    assert_eq!(snapshot.phase, Phase::Connecting);
    assert_eq!(snapshot.reconnect_attempts, 1);

    tokio::time::sleep(Duration::from_millis(20_000)).await;
    h.settle().await;
    assert_eq!(h.client.open_count(), 2, "only one attempt per failure");
}

#[tokio::test(start_paused = true)]
async fn server_close_reconnects_to_same_target() {
    let h = Harness::new();
    h.open_direct("wss://a/ws").await;
    h.client.last_open().emit(SocketEvent::Closed {
        code: Some(1001),
        reason: "going away".to_string(),
    });
    assert_eq!(h.settle().await.phase, Phase::Reconnecting);

    tokio::time::sleep(Duration::from_millis(5000)).await;
    h.settle().await;
    h.client.last_open().emit(SocketEvent::Opened);
    let snapshot = h.settle().await;

    assert_eq!(snapshot.phase, Phase::Open);
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert_eq!(h.client.last_open().target.url(), "wss://a/ws");
    assert_eq!(
        h.take_events(),
        vec![Event::status(true), Event::status(false), Event::status(true)]
    );
}

#[tokio::test(start_paused = true)]
async fn retry_reattaches_headers() {
    let h = Harness::new();
    let config = StructuredConfig::new("h", 443).header("Authorization", "Bearer t");
    h.manager
        .connect(ConnectionConfig::Structured(config))
        .await
        .unwrap();
    h.client
        .last_open()
        .emit(SocketEvent::Failed("refused".to_string()));
    h.settle().await;

    tokio::time::sleep(Duration::from_millis(5000)).await;
    h.settle().await;

    let opens = h.client.opens();
    assert_eq!(opens.len(), 2);
    assert_eq!(opens[0].target, opens[1].target);
    assert_eq!(
        opens[1].target.headers().get("Authorization").map(String::as_str),
        Some("Bearer t")
    );
    assert!(opens[1].sink.generation() > opens[0].sink.generation());
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_retry() {
    let h = Harness::new();
    h.open_direct("wss://a/ws").await;
    h.client
        .last_open()
        .emit(SocketEvent::Failed("reset".to_string()));
    h.settle().await;

    h.manager.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10_000)).await;
    let snapshot = h.settle().await;

    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.target, None);
    assert_eq!(h.client.open_count(), 1);
}

#[tokio::test]
async fn disconnect_while_idle_is_silent() {
    let h = Harness::new();
    h.manager.disconnect().await.unwrap();
    h.manager.disconnect().await.unwrap();
    assert_eq!(h.settle().await.phase, Phase::Idle);
    assert!(h.take_events().is_empty());
    assert!(h.client.closes().is_empty());
}

#[tokio::test]
async fn disconnect_closes_with_normal_code() {
    let h = Harness::new();
    h.open_direct("wss://a/ws").await;
    h.take_events();

    h.manager.disconnect().await.unwrap();
    assert_eq!(h.settle().await.phase, Phase::Idle);
    assert_eq!(h.take_events(), vec![Event::status(false)]);
    assert_eq!(h.client.closes(), vec![(1, NORMAL_CLOSURE)]);

    // The late close callback belongs to an old generation.
    h.client.last_open().emit(SocketEvent::Closed {
        code: Some(NORMAL_CLOSURE),
        reason: String::new(),
    });
    assert_eq!(h.settle().await.phase, Phase::Idle);
    assert!(h.take_events().is_empty());
}

#[tokio::test]
async fn send_while_idle_fails_without_events() {
    let h = Harness::new();
    let result = h.manager.send("hello").await;
    assert!(matches!(result, Err(ManagerError::NotConnected)));
    assert!(h.client.sent().is_empty());
    assert!(h.take_events().is_empty());
}

#[tokio::test]
async fn send_while_open_reaches_socket() {
    let h = Harness::new();
    h.open_direct("wss://a/ws").await;
    h.manager.send("hello").await.unwrap();
    assert_eq!(h.client.sent(), vec!["hello".to_string()]);
}

#[tokio::test]
async fn inbound_frames_are_forwarded() {
    let h = Harness::new();
    h.open_direct("wss://a/ws").await;
    h.take_events();

    let open = h.client.last_open();
    open.emit(SocketEvent::Text("hi".to_string()));
    open.emit(SocketEvent::Binary(vec![0x00, 0xab, 0xff]));
    h.settle().await;

    assert_eq!(
        h.take_events(),
        vec![Event::message("hi"), Event::message("00abff")]
    );
}

#[tokio::test(start_paused = true)]
async fn synchronous_open_failure_errors_and_still_retries() {
    let h = Harness::new();
    h.client.fail_next_open();
    let result = h
        .manager
        .connect(ConnectionConfig::Direct {
            url: "wss://a/ws".to_string(),
        })
        .await;
    assert!(matches!(result, Err(ManagerError::Transport(_))));
    assert_eq!(h.settle().await.phase, Phase::Reconnecting);

    tokio::time::sleep(Duration::from_millis(5000)).await;
    h.settle().await;
    assert_eq!(h.client.open_count(), 2);
}

#[tokio::test]
async fn shutdown_stops_the_task() {
    let h = Harness::new();
    h.open_direct("wss://a/ws").await;
    h.take_events();

    h.manager.shutdown().await.unwrap();
    assert_eq!(h.take_events(), vec![Event::status(false)]);
    assert!(matches!(
        h.manager.snapshot().await,
        Err(ManagerError::Stopped)
    ));
    assert!(matches!(
        h.manager.send("x").await,
        Err(ManagerError::Stopped)
    ));
}

#[tokio::test]
async fn generation_increases_on_every_connect() {
    let h = Harness::new();
    let g0 = h.settle().await.generation;
    h.open_direct("wss://a/ws").await;
    let g1 = h.settle().await.generation;
    h.open_direct("wss://a/ws").await;
    let g2 = h.settle().await.generation;
    assert!(g0 < g1 && g1 < g2);
}
