//! In-process item server for socket integration tests.
//!
//! [`StubServer`] hands out transports through its [`Connector`] impl and
//! answers every protocol message the way the real server does: it sends
//! back its whole item list, minus the last item for
//! `bounding_box_changed`, narrowed to the items whose `data` matches the
//! message's filter. Open and reply signals are reported synchronously, so
//! a test only has to let the driver run to observe them.

#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use geofeed_socket::{
    Connector, EventReceiver, ReconnectingSocket, SignalSink, SocketEvent, SocketOptions,
    Transport,
};
use geofeed_types::{Item, MessageKind, ProtocolMessage};
use parking_lot::Mutex;
use serde_json::json;

/// Address the stub answers to.
pub const URL: &str = "ws://localhost/socket";

/// The three items every reply is built from.
pub fn items() -> Vec<Item> {
    [(3.97, 43.58, 34), (4.02, 43.63, 48), (3.88, 43.55, 34)]
        .into_iter()
        .map(|(lon, lat, linked_item)| {
            serde_json::from_value(json!({
                "geojson": {"coordinates": [lon, lat]},
                "data": {"linked_item": linked_item},
            }))
            .unwrap()
        })
        .collect()
}

struct Connection {
    sink: SignalSink,
    open: Arc<AtomicBool>,
}

#[derive(Default)]
struct ServerState {
    unreachable: bool,
    items: Vec<Item>,
    received: Vec<ProtocolMessage>,
    connections: Vec<Connection>,
    history: Vec<SignalSink>,
    attempts: usize,
    client_closes: usize,
}

/// Shared handle to the stub server.
#[derive(Clone, Default)]
pub struct StubServer {
    state: Arc<Mutex<ServerState>>,
}

impl StubServer {
    /// A reachable server holding [`items`].
    pub fn new() -> Self {
        let server = Self::default();
        server.state.lock().items = items();
        server
    }

    /// A server nobody can connect to.
    pub fn unreachable() -> Self {
        let server = Self::new();
        server.set_reachable(false);
        server
    }

    /// Toggle whether new connection attempts succeed.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unreachable = !reachable;
    }

    /// Build a socket connected through this server.
    pub fn socket(&self, options: SocketOptions) -> ReconnectingSocket {
        ReconnectingSocket::new(URL, options, Arc::new(self.clone()))
    }

    /// Every protocol message received so far.
    pub fn received(&self) -> Vec<ProtocolMessage> {
        self.state.lock().received.clone()
    }

    /// Event kinds of every protocol message received so far.
    pub fn received_kinds(&self) -> Vec<MessageKind> {
        self.received().into_iter().map(|m| m.event).collect()
    }

    /// Connection attempts, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Transports the client closed itself.
    pub fn client_closes(&self) -> usize {
        self.state.lock().client_closes
    }

    /// Close every open connection from the server side.
    pub fn drop_connections(&self) {
        let mut state = self.state.lock();
        for connection in &state.connections {
            if connection.open.swap(false, Ordering::SeqCst) {
                connection.sink.closed();
            }
        }
        state.connections.retain(|c| c.open.load(Ordering::SeqCst));
    }

    /// Push a raw frame through the sink of the `nth` successful connection,
    /// whether or not it is still open.
    pub fn push_through(&self, nth: usize, text: &str) {
        self.state.lock().history_sink(nth).message(text);
    }
}

impl ServerState {
    fn history_sink(&self, nth: usize) -> SignalSink {
        self.history.get(nth).cloned().expect("no such connection")
    }
}

impl Connector for StubServer {
    fn open(&self, _address: &str, sink: SignalSink) -> Box<dyn Transport> {
        let mut state = self.state.lock();
        state.attempts += 1;
        let open = Arc::new(AtomicBool::new(false));
        if state.unreachable {
            sink.error("connection refused");
        } else {
            open.store(true, Ordering::SeqCst);
            state.history.push(sink.clone());
            state.connections.push(Connection {
                sink: sink.clone(),
                open: Arc::clone(&open),
            });
            sink.opened();
        }
        Box::new(StubTransport {
            server: self.clone(),
            sink,
            open,
        })
    }
}

struct StubTransport {
    server: StubServer,
    sink: SignalSink,
    open: Arc<AtomicBool>,
}

impl Transport for StubTransport {
    fn send(&mut self, text: String) {
        if !self.is_open() {
            return;
        }
        let message = ProtocolMessage::from_json(&text).expect("client sent a malformed message");
        let reply: Vec<Item> = {
            let mut state = self.server.state.lock();
            state.received.push(message.clone());
            let mut items = state.items.clone();
            if message.event == MessageKind::BoundingBoxChanged {
                items.pop();
            }
            if let Some(filter) = &message.filter {
                items.retain(|item| item.matches(filter));
            }
            items
        };
        self.sink.message(serde_json::to_string(&reply).unwrap());
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.server.state.lock().client_closes += 1;
        }
    }
}

/// Wait for the next event, failing the test if none comes.
pub async fn next_event(events: &mut EventReceiver) -> SocketEvent {
    tokio::time::timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("timed out waiting for a socket event")
        .expect("event bus closed")
}

/// Wait for the next event and assert it is `opened`.
pub async fn expect_opened(events: &mut EventReceiver) {
    assert_eq!(next_event(events).await, SocketEvent::Opened);
}

/// Collect exactly `count` items.
pub async fn next_items(events: &mut EventReceiver, count: usize) -> Vec<Item> {
    let mut items = Vec::with_capacity(count);
    while items.len() < count {
        match next_event(events).await {
            SocketEvent::NewItem(item) => items.push(item),
            other => panic!("expected an item, got {other:?}"),
        }
    }
    items
}

/// Let the driver drain everything already queued.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

/// Assert no event is queued after the driver settles.
pub async fn assert_quiet(events: &mut EventReceiver) {
    settle().await;
    assert_eq!(events.try_recv(), None);
}
