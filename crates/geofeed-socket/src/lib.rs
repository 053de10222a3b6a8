//! Reconnecting subscription socket for geospatial item streams.
//!
//! A client subscribes to the items inside a map viewport, optionally
//! narrowed by a content filter. The transport may drop at any time; the
//! socket reconnects on a fixed delay and replays the last requested
//! subscription so the stream resumes as if nothing happened.
//!
//! # Architecture
//!
//! ```text
//! ReconnectingSocket (handle, Clone)
//!     |
//!     +-- commands ------> Driver task (select! loop)
//!     |                       |-- Transport (one live at a time, via Connector)
//!     |                       |-- retry timer
//!     |                       +-- EventBus --> listeners / EventReceiver
//!     |
//!     +-- SubscriptionIntent (shared, written by the handle only)
//!
//! ViewportBinding<S>   map widget  -> initialize/set bounding box
//! ObservableSocket<S>  new_item    -> ItemStream per connection cycle
//! ```
//!
//! # Modules
//!
//! - [`config`] -- Socket options, retry policy, and the frozen endpoint
//! - [`error`] -- [`ConnectionError`] and [`SocketError`]
//! - [`event`] -- Socket events and the ordered listener bus
//! - [`observable`] -- Per-cycle item streams
//! - [`socket`] -- The reconnecting socket and the [`ItemSocket`] trait
//! - [`state`] -- Connection status and subscription intent
//! - [`transport`] -- The connector/transport seam
//! - [`viewport`] -- Map widget binding
//! - [`ws`] -- WebSocket transport over `tokio-tungstenite`

pub mod config;
pub mod error;
pub mod event;
pub mod observable;
pub mod socket;
pub mod state;
pub mod transport;
pub mod viewport;
pub mod ws;

// Re-export primary types for convenience.
pub use config::{Endpoint, INFINITE_RETRIES, RetryPolicy, SocketOptions};
pub use error::{ConnectionError, SocketError};
pub use event::{EventBus, EventKind, EventReceiver, ListenerId, SocketEvent};
pub use observable::{ItemStream, ObservableSocket};
pub use socket::{ItemSocket, ReconnectingSocket};
pub use state::{ConnectionState, ConnectionStatus, SubscriptionIntent};
pub use transport::{Connector, SignalSink, Transport, TransportId, TransportSignal};
pub use viewport::{LngLat, MapWidget, ViewportBinding, ViewportBounds, ViewportCallback};
pub use ws::{DEFAULT_CONNECT_TIMEOUT, WsConnector};
