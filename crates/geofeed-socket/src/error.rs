//! Error types for the reconnecting socket.
//!
//! Two failure channels exist and they never mix:
//!
//! - [`SocketError`] is returned synchronously to the caller of a socket
//!   operation (invalid bounding box, socket already shut down).
//! - [`ConnectionError`] is delivered asynchronously, exactly once per
//!   exhausted-retry episode, through the `error` event.

use geofeed_types::BadFormat;

/// Reconnection gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("connection to url {address} was impossible after {retries} retries.")]
pub struct ConnectionError {
    /// The address that could not be reached.
    pub address: String,
    /// Number of reconnect attempts made before giving up.
    pub retries: u32,
}

/// Errors returned by socket operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SocketError {
    /// The bounding box failed validation; stored state is untouched.
    #[error(transparent)]
    BadFormat(#[from] BadFormat),

    /// The socket's driver task has stopped and can no longer take commands.
    #[error("socket driver has terminated")]
    Terminated,
}
