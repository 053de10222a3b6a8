//! Socket events and listener fan-out.
//!
//! Listeners are either callbacks invoked on the driver task or channels
//! drained by the subscriber. Emission works on a snapshot of the registry,
//! so a callback may register or remove listeners (or call back into the
//! socket) without deadlocking. Listeners see events in registration order.

use core::fmt;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::Arc;

use futures::Stream;
use geofeed_types::Item;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::ConnectionError;

/// Something the socket wants its listeners to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A transport opened.
    Opened,
    /// The client closed the socket.
    Closed,
    /// Reconnection gave up.
    Error(ConnectionError),
    /// One item pushed by the server.
    NewItem(Item),
}

impl SocketEvent {
    /// The kind of this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Opened => EventKind::Opened,
            Self::Closed => EventKind::Closed,
            Self::Error(_) => EventKind::Error,
            Self::NewItem(_) => EventKind::NewItem,
        }
    }
}

/// Event kinds, named as they appear in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `opened`
    Opened,
    /// `closed`
    Closed,
    /// `error`
    Error,
    /// `new_items`
    NewItem,
}

impl EventKind {
    /// Log name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Closed => "closed",
            Self::Error => "error",
            Self::NewItem => "new_items",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned by [`EventBus::on`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&SocketEvent) + Send + Sync>;

#[derive(Clone)]
enum Sink {
    Callback(Callback),
    Channel(mpsc::UnboundedSender<SocketEvent>),
}

impl Sink {
    /// Deliver one event. Returns `false` when the sink is gone for good.
    fn deliver(&self, event: &SocketEvent) -> bool {
        match self {
            Self::Callback(callback) => {
                callback(event);
                true
            }
            Self::Channel(tx) => tx.send(event.clone()).is_ok(),
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(ListenerId, Sink)>,
}

impl Registry {
    fn insert(&mut self, sink: Sink) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.listeners.push((id, sink));
        id
    }
}

/// Ordered set of listeners shared by every clone of a socket handle.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It runs on the socket's driver task, so it must
    /// not block.
    pub fn on<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.registry
            .lock()
            .insert(Sink::Callback(Arc::new(callback)))
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|(listener, _)| *listener != id);
        registry.listeners.len() != before
    }

    /// Register a channel listener and return its receiving end.
    ///
    /// The listener is dropped automatically once the receiver is dropped.
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.registry.lock().insert(Sink::Channel(tx));
        EventReceiver { id, rx }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    /// Deliver `event` to every listener registered at the time of the call.
    pub fn emit(&self, event: &SocketEvent) {
        let snapshot = self.registry.lock().listeners.clone();
        let mut gone = Vec::new();
        for (id, sink) in &snapshot {
            if !sink.deliver(event) {
                gone.push(*id);
            }
        }
        trace!(
            event = %event.kind(),
            listeners = snapshot.len(),
            pruned = gone.len(),
            "Event emitted"
        );
        if !gone.is_empty() {
            self.registry
                .lock()
                .listeners
                .retain(|(id, _)| !gone.contains(id));
        }
    }
}

/// Receiving end of a channel listener.
///
/// Implements [`Stream`]; the stream ends when the socket and every handle
/// to it are gone.
#[derive(Debug)]
pub struct EventReceiver {
    id: ListenerId,
    rx: mpsc::UnboundedReceiver<SocketEvent>,
}

impl EventReceiver {
    /// The listener id backing this receiver.
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<SocketEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventReceiver {
    type Item = SocketEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
