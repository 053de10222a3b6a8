//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each connection attempt runs in its own task: connect, report, then pump
//! outbound frames and inbound frames until either side closes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::transport::{Connector, SignalSink, Transport};

/// How long the TCP connect plus WebSocket handshake may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket transports. Requires a running Tokio runtime.
///
/// A handshake that does not finish within the connect timeout is reported
/// as a transport error, so it feeds the retry policy like a refusal.
#[derive(Debug, Clone, Copy)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl WsConnector {
    /// A connector using [`DEFAULT_CONNECT_TIMEOUT`].
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// The handshake timeout in use.
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Connector for WsConnector {
    fn open(&self, address: &str, sink: SignalSink) -> Box<dyn Transport> {
        let url = websocket_url(address);
        let (outbound, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        tokio::spawn(run_connection(
            url,
            self.connect_timeout,
            rx,
            sink,
            Arc::clone(&open),
        ));
        Box::new(WsTransport { outbound, open })
    }
}

/// Prefix `ws://` when the address carries no scheme.
pub fn websocket_url(address: &str) -> String {
    if address.starts_with("ws://") || address.starts_with("wss://") {
        address.to_owned()
    } else {
        format!("ws://{address}")
    }
}

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

struct WsTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
}

impl Transport for WsTransport {
    fn send(&mut self, text: String) {
        if self.outbound.send(Outbound::Text(text)).is_err() {
            debug!("Dropping frame for finished connection");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::Release);
        let _ = self.outbound.send(Outbound::Close);
    }
}

async fn run_connection(
    url: String,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    sink: SignalSink,
    open: Arc<AtomicBool>,
) {
    let transport = sink.id();
    let stream = match timeout(connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(err)) => {
            debug!(%transport, url = %url, error = %err, "WebSocket connect failed");
            sink.error(err.to_string());
            return;
        }
        Err(elapsed) => {
            warn!(
                %transport,
                url = %url,
                timeout_ms = u64::try_from(connect_timeout.as_millis()).unwrap_or(u64::MAX),
                "WebSocket handshake timed out"
            );
            sink.error(elapsed.to_string());
            return;
        }
    };

    // A close requested during the handshake is queued and handled by the
    // first loop iteration.
    open.store(true, Ordering::Release);
    info!(%transport, url = %url, "WebSocket connected");
    sink.opened();

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = write.send(Message::Text(text)).await {
                        open.store(false, Ordering::Release);
                        warn!(%transport, error = %err, "WebSocket send failed");
                        sink.error(err.to_string());
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    open.store(false, Ordering::Release);
                    if let Err(err) = write.send(Message::Close(None)).await {
                        debug!(%transport, error = %err, "Close frame not delivered");
                    }
                    debug!(%transport, "WebSocket closed by client");
                    return;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => sink.message(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => sink.message(text),
                    Err(_) => debug!(%transport, "Dropping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    open.store(false, Ordering::Release);
                    info!(%transport, "WebSocket closed by server");
                    sink.closed();
                    return;
                }
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(err) = write.send(Message::Pong(payload)).await {
                        debug!(%transport, error = %err, "Pong not delivered");
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    open.store(false, Ordering::Release);
                    warn!(%transport, error = %err, "WebSocket receive failed");
                    sink.error(err.to_string());
                    return;
                }
            },
        }
    }
}
