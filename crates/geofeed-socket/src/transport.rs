//! The seam between the reconnect driver and a concrete wire transport.
//!
//! A [`Connector`] opens one [`Transport`] per connection attempt and hands
//! it a [`SignalSink`]. The transport reports lifecycle and inbound frames
//! through the sink; each report is tagged with the attempt's
//! [`TransportId`], which lets the driver discard late reports from a
//! transport it has already replaced.

use core::fmt;

use tokio::sync::mpsc;

/// Identity of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u64);

impl TransportId {
    /// Placeholder id preceding the first real attempt.
    pub(crate) const UNSET: Self = Self(0);

    /// The id that follows this one.
    pub(crate) const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a transport can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// The connection is established.
    Opened,
    /// One inbound text frame.
    Message(String),
    /// The connection failed or broke.
    Error(String),
    /// The remote side closed the connection.
    Closed,
}

pub(crate) type SignalTx = mpsc::UnboundedSender<(TransportId, TransportSignal)>;
pub(crate) type SignalRx = mpsc::UnboundedReceiver<(TransportId, TransportSignal)>;

/// Reporting handle given to a transport when it is opened.
#[derive(Debug, Clone)]
pub struct SignalSink {
    id: TransportId,
    tx: SignalTx,
}

impl SignalSink {
    pub(crate) const fn new(id: TransportId, tx: SignalTx) -> Self {
        Self { id, tx }
    }

    /// The connection attempt this sink reports for.
    pub const fn id(&self) -> TransportId {
        self.id
    }

    /// Report that the connection is established.
    pub fn opened(&self) {
        self.signal(TransportSignal::Opened);
    }

    /// Report one inbound text frame.
    pub fn message(&self, text: impl Into<String>) {
        self.signal(TransportSignal::Message(text.into()));
    }

    /// Report a failure.
    pub fn error(&self, reason: impl Into<String>) {
        self.signal(TransportSignal::Error(reason.into()));
    }

    /// Report that the remote side closed the connection.
    pub fn closed(&self) {
        self.signal(TransportSignal::Closed);
    }

    /// Whether the driver is still listening.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    fn signal(&self, signal: TransportSignal) {
        // A closed channel means the socket is gone; nothing left to tell.
        let _ = self.tx.send((self.id, signal));
    }
}

/// One live (or opening) connection.
pub trait Transport: Send {
    /// Queue a text frame. Frames sent before the transport opened, or after
    /// it closed, may be dropped.
    fn send(&mut self, text: String);

    /// Whether the connection is currently open.
    fn is_open(&self) -> bool;

    /// Close the connection. Must not report [`TransportSignal::Closed`]
    /// for a close the client requested.
    fn close(&mut self);
}

/// Factory for transports.
pub trait Connector: Send + Sync {
    /// Start opening a connection to `address`.
    ///
    /// Returns immediately; the outcome arrives through `sink`.
    fn open(&self, address: &str, sink: SignalSink) -> Box<dyn Transport>;
}
