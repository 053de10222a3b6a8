//! Command-line client that tails a geofeed item socket.
//!
//! Connects to the configured server, subscribes once the connection is
//! open, and prints every received item as one JSON object per line on
//! stdout. Logs go to stderr so the output can be piped.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing, stderr)
//! 2. Load configuration (`GEOFEED_CONFIG` file plus `GEOFEED_*` overrides)
//! 3. Create the reconnecting WebSocket client and connect
//! 4. Subscribe on the first `opened` (bounding box if configured, else listen)
//! 5. Print items until the socket gives up, closes, or Ctrl-C is pressed

mod config;
mod error;

use std::io::Write;

use geofeed_socket::{ReconnectingSocket, SocketEvent};
use geofeed_types::Item;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::TailConfig;
use crate::error::TailError;

/// Application entry point for the tail client.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, stdout fails, or the
/// socket exhausts its reconnect attempts.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    info!("geofeed-tail starting");

    // 2. Load configuration.
    let config = TailConfig::load()?;
    info!(
        address = config.address,
        type_tag = config.socket.type_tag,
        max_retries = config.socket.max_retries,
        retry_interval_ms = config.socket.retry_interval_ms,
        bounding_box = ?config.bounding_box,
        "Configuration loaded"
    );

    // 3-5. Connect, subscribe and print.
    let printed = run(&config).await?;
    info!(printed, "geofeed-tail stopped");
    Ok(())
}

/// Drive the socket until it closes, gives up, or the user interrupts.
///
/// Returns the number of items printed.
async fn run(config: &TailConfig) -> Result<u64, TailError> {
    let socket = ReconnectingSocket::websocket(config.address.clone(), config.socket.clone());
    let mut events = socket.subscribe();
    socket.connect()?;

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let stdout = std::io::stdout();
    let mut subscribed = false;
    let mut printed: u64 = 0;

    loop {
        tokio::select! {
            result = &mut interrupt => {
                result.map_err(|e| TailError::Signal {
                    message: format!("failed to listen for Ctrl-C: {e}"),
                })?;
                info!("Interrupted, closing the socket");
                socket.close()?;
                return Ok(printed);
            }
            event = events.recv() => {
                let Some(event) = event else {
                    return Ok(printed);
                };
                match event {
                    SocketEvent::Opened => {
                        if !subscribed {
                            subscribe(&socket, config)?;
                            subscribed = true;
                        }
                    }
                    SocketEvent::NewItem(item) => {
                        print_item(&mut stdout.lock(), &item)?;
                        printed = printed.saturating_add(1);
                    }
                    SocketEvent::Closed => {
                        warn!("Socket closed");
                        return Ok(printed);
                    }
                    SocketEvent::Error(err) => return Err(err.into()),
                }
            }
        }
    }
}

/// Declare the configured subscription.
fn subscribe(socket: &ReconnectingSocket, config: &TailConfig) -> Result<(), TailError> {
    if let Some(bounding_box) = config.bounding_box {
        info!(%bounding_box, "Subscribing to bounding box");
        socket.initialize_bounding_box(bounding_box)?;
    } else {
        info!("Subscribing to every item");
        socket.listen()?;
    }
    Ok(())
}

/// Write one item as a JSON line.
fn print_item<W: Write>(out: &mut W, item: &Item) -> Result<(), TailError> {
    serde_json::to_writer(&mut *out, item).map_err(std::io::Error::from)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
