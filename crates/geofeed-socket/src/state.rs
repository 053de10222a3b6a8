//! Connection state and subscription intent.
//!
//! [`ConnectionStatus`] is owned by the socket driver and only changes
//! through its internal transitions. [`SubscriptionIntent`] is what the
//! client asked for; it is changed only by explicit client requests and is
//! read (never modified) by the reconnect machinery when it replays the
//! subscription on a fresh transport.

use core::fmt;

use geofeed_types::{BoundingBox, Filter, MessageKind, ProtocolMessage};

/// Lifecycle of the underlying transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// A transport is being opened, or a reconnect attempt is scheduled.
    Connecting,
    /// The transport is open.
    Open,
    /// A client-initiated close is in progress.
    Closing,
    /// Closed by the client or after retries were exhausted.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Snapshot of the connection lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open.
    pub retries_done: u32,
    /// Whether `abort()` has been called since the last `connect()`.
    pub aborted: bool,
}

impl ConnectionStatus {
    /// Whether the transport is currently open.
    pub const fn is_open(&self) -> bool {
        matches!(self.state, ConnectionState::Open)
    }
}

/// The durable, client-requested subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionIntent {
    /// Viewport to stream items for.
    pub bounding_box: Option<BoundingBox>,
    /// Content filter carried on every message.
    pub filter: Option<Filter>,
    /// Whether the client asked to receive a stream at all.
    pub listening: bool,
}

impl SubscriptionIntent {
    /// Intent seeded with an initial filter and nothing else.
    pub const fn with_filter(filter: Option<Filter>) -> Self {
        Self {
            bounding_box: None,
            filter,
            listening: false,
        }
    }

    /// The message that re-establishes this intent on a fresh transport.
    ///
    /// A bounding box replays as `bounding_box_initialized`, a plain listen
    /// as `ready`; an intent that never asked for a stream replays nothing.
    pub const fn replay_kind(&self) -> Option<MessageKind> {
        if !self.listening {
            return None;
        }
        if self.bounding_box.is_some() {
            Some(MessageKind::BoundingBoxInitialized)
        } else {
            Some(MessageKind::Ready)
        }
    }

    /// Build a protocol message of `kind` carrying the current box and filter.
    pub fn message(&self, kind: MessageKind, type_tag: &str) -> ProtocolMessage {
        ProtocolMessage::new(kind, type_tag)
            .with_bounding_box(self.bounding_box)
            .with_filter(self.filter.clone())
    }

    /// Apply a plain listen request. Returns the message to send, or `None`
    /// when already listening.
    pub(crate) const fn request_listen(&mut self) -> Option<MessageKind> {
        if self.listening {
            return None;
        }
        self.listening = true;
        Some(MessageKind::Ready)
    }

    /// Apply a bounding box request (`kind` is the initialized or changed
    /// message). Returns `None` when already listening to the same box.
    pub(crate) fn request_bounding_box(
        &mut self,
        bounding_box: BoundingBox,
        kind: MessageKind,
    ) -> Option<MessageKind> {
        if self.listening && self.bounding_box == Some(bounding_box) {
            return None;
        }
        self.bounding_box = Some(bounding_box);
        self.listening = true;
        Some(kind)
    }

    /// Apply a filter change. Returns `None` when the filter is unchanged.
    pub(crate) fn request_filter(&mut self, filter: Option<Filter>) -> Option<MessageKind> {
        if self.filter == filter {
            return None;
        }
        self.filter = filter;
        Some(MessageKind::FilterChanged)
    }
}
