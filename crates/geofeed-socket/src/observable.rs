//! Items as an asynchronous stream.
//!
//! [`ObservableSocket`] keeps one live sequence per connection cycle. Every
//! `opened` starts a new sequence and completes the streams handed out for
//! the previous one; `closed` completes the current sequence and a terminal
//! `error` is delivered as `Err` before it completes.

use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::Arc;

use futures::Stream;
use geofeed_types::Item;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ConnectionError;
use crate::event::{ListenerId, SocketEvent};
use crate::socket::ItemSocket;

type Observer = mpsc::UnboundedSender<Result<Item, ConnectionError>>;

/// One connection cycle's worth of observers.
#[derive(Debug, Default)]
struct Subject {
    observers: Vec<Observer>,
    terminated: bool,
}

impl Subject {
    fn reset(&mut self) {
        debug!(completed = self.observers.len(), "Item sequence reset");
        self.observers.clear();
        self.terminated = false;
    }

    fn next(&mut self, item: &Item) {
        self.observers.retain(|observer| observer.send(Ok(item.clone())).is_ok());
    }

    fn fail(&mut self, err: &ConnectionError) {
        for observer in self.observers.drain(..) {
            let _ = observer.send(Err(err.clone()));
        }
        self.terminated = true;
    }

    fn complete(&mut self) {
        self.observers.clear();
        self.terminated = true;
    }

    fn observe(&mut self) -> ItemStream {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.terminated {
            self.observers.push(tx);
        }
        ItemStream { rx }
    }
}

/// A socket whose items are consumed as streams.
pub struct ObservableSocket<S: ItemSocket> {
    socket: S,
    subject: Arc<Mutex<Subject>>,
    listener: ListenerId,
}

impl<S: ItemSocket> core::fmt::Debug for ObservableSocket<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObservableSocket")
            .field("subject", &*self.subject.lock())
            .finish_non_exhaustive()
    }
}

impl<S: ItemSocket> ObservableSocket<S> {
    /// Wrap a socket. Register this wrapper before other `opened` listeners
    /// that subscribe to [`items`](Self::items), so the reset runs first.
    pub fn new(socket: S) -> Self {
        let subject = Arc::new(Mutex::new(Subject::default()));
        let events = Arc::clone(&subject);
        let listener = socket.on(move |event| {
            let mut subject = events.lock();
            match event {
                SocketEvent::Opened => subject.reset(),
                SocketEvent::NewItem(item) => subject.next(item),
                SocketEvent::Error(err) => subject.fail(err),
                SocketEvent::Closed => subject.complete(),
            }
        });
        Self {
            socket,
            subject,
            listener,
        }
    }

    /// Items of the current connection cycle.
    ///
    /// The stream ends at the next reset or close. On a terminated sequence
    /// the stream is already complete.
    pub fn items(&self) -> ItemStream {
        self.subject.lock().observe()
    }

    /// The wrapped socket.
    pub const fn socket(&self) -> &S {
        &self.socket
    }
}

impl<S: ItemSocket> Drop for ObservableSocket<S> {
    fn drop(&mut self) {
        self.socket.off(self.listener);
    }
}

/// Stream of items for one connection cycle.
#[derive(Debug)]
pub struct ItemStream {
    rx: mpsc::UnboundedReceiver<Result<Item, ConnectionError>>,
}

impl ItemStream {
    /// Wait for the next item.
    pub async fn recv(&mut self) -> Option<Result<Item, ConnectionError>> {
        self.rx.recv().await
    }
}

impl Stream for ItemStream {
    type Item = Result<Item, ConnectionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
