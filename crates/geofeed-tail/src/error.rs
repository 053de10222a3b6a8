//! Error types for the `geofeed-tail` binary.
//!
//! [`TailError`] wraps every failure `main` can propagate with `?`.

use geofeed_socket::{ConnectionError, SocketError};

use crate::config::ConfigError;

/// Top-level error for the tail binary.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// The socket rejected an operation.
    #[error("socket error: {source}")]
    Socket {
        /// The underlying socket error.
        #[from]
        source: SocketError,
    },

    /// The socket gave up reconnecting.
    #[error("{source}")]
    Connection {
        /// The terminal connection error.
        #[from]
        source: ConnectionError,
    },

    /// Writing an item to stdout failed.
    #[error("output error: {source}")]
    Output {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Installing the Ctrl-C handler failed.
    #[error("signal error: {message}")]
    Signal {
        /// Description of the failure.
        message: String,
    },
}
