//! The reconnecting subscription socket.
//!
//! [`ReconnectingSocket`] is a cheap, cloneable handle. All connection state
//! is owned by a driver task spawned at construction; the handle talks to it
//! through a command channel and observes it through a `watch` channel.
//! `close()` is the one status write made by the handle: it marks an open
//! socket as closing before queueing the command, so `is_opened()` turns
//! false as soon as `close()` returns.
//! Commands, transport signals, and the retry timer are serialized through
//! one `select!` loop, so only one transport is ever live and no two state
//! transitions interleave.
//!
//! The subscription intent is the exception: it is changed synchronously by
//! the handle (validation and no-op detection happen before an operation
//! returns) and only read by the driver.

use std::sync::Arc;

use geofeed_types::{
    BoundingBox, Filter, InboundPayload, MessageKind, ProtocolMessage, check, normalize_filter,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::config::{Endpoint, SocketOptions};
use crate::error::{ConnectionError, SocketError};
use crate::event::{EventBus, EventReceiver, ListenerId, SocketEvent};
use crate::state::{ConnectionState, ConnectionStatus, SubscriptionIntent};
use crate::transport::{
    Connector, SignalRx, SignalSink, SignalTx, Transport, TransportId, TransportSignal,
};
use crate::ws::WsConnector;

/// The operations wrappers need from a socket.
pub trait ItemSocket: Clone + Send + Sync + 'static {
    /// Open the transport (no-op when one is live or opening).
    fn connect(&self) -> Result<(), SocketError>;

    /// Close the transport for good (until the next `connect`).
    fn close(&self) -> Result<(), SocketError>;

    /// Forbid further reconnect attempts.
    fn abort(&self) -> Result<(), SocketError>;

    /// Register an event callback.
    fn on<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static;

    /// Remove an event callback.
    fn off(&self, id: ListenerId) -> bool;

    /// Validate a raw box and start listening inside it.
    fn initialize_bounding_box(&self, raw: Value) -> Result<BoundingBox, SocketError>;

    /// Validate a raw box and move the subscription to it.
    fn set_bounding_box(&self, raw: Value) -> Result<BoundingBox, SocketError>;
}

/// Handle to a reconnecting subscription socket.
#[derive(Clone)]
pub struct ReconnectingSocket {
    shared: Arc<Shared>,
}

struct Shared {
    endpoint: Endpoint,
    commands: mpsc::UnboundedSender<Command>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    intent: Arc<Mutex<IntentCell>>,
    events: EventBus,
}

/// Intent plus a revision counter bumped on every effective change.
#[derive(Debug, Default)]
struct IntentCell {
    intent: SubscriptionIntent,
    revision: u64,
}

impl IntentCell {
    fn bump(&mut self) -> u64 {
        self.revision = self.revision.wrapping_add(1);
        self.revision
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Close,
    Abort,
    /// Send a message for the intent change identified by `revision`.
    Send { kind: MessageKind, revision: u64 },
}

impl core::fmt::Debug for ReconnectingSocket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReconnectingSocket")
            .field("endpoint", &self.shared.endpoint)
            .field("status", &*self.shared.status.borrow())
            .finish_non_exhaustive()
    }
}

impl ReconnectingSocket {
    /// Create a socket that opens transports through `connector`.
    ///
    /// Nothing is opened until [`connect`](Self::connect). Must be called
    /// from within a Tokio runtime.
    pub fn new(
        address: impl Into<String>,
        options: SocketOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let endpoint = Endpoint::new(address, &options);
        let intent = Arc::new(Mutex::new(IntentCell {
            intent: SubscriptionIntent::with_filter(options.filter.and_then(normalize_filter)),
            revision: 0,
        }));
        let events = EventBus::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(ConnectionStatus::default());
        let status = Arc::new(status_tx);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            endpoint: endpoint.clone(),
            connector,
            events: events.clone(),
            intent: Arc::clone(&intent),
            status_tx: Arc::clone(&status),
            status: ConnectionStatus::default(),
            transport: None,
            current: TransportId::UNSET,
            signal_tx,
            retry_at: None,
            replayed: 0,
        };
        tokio::spawn(driver.run(commands_rx, signal_rx));

        Self {
            shared: Arc::new(Shared {
                endpoint,
                commands: commands_tx,
                status,
                intent,
                events,
            }),
        }
    }

    /// Create a socket over WebSocket transports.
    pub fn websocket(address: impl Into<String>, options: SocketOptions) -> Self {
        Self::new(address, options, Arc::new(WsConnector::new()))
    }

    /// Open the transport. Clears a previous `abort()`.
    pub fn connect(&self) -> Result<(), SocketError> {
        self.command(Command::Connect)
    }

    /// Close the transport and stop reconnecting. Emits `closed`.
    ///
    /// An open socket reports `is_opened() == false` from the moment this
    /// returns; the driver finishes the teardown afterwards.
    pub fn close(&self) -> Result<(), SocketError> {
        self.shared.status.send_if_modified(|status| {
            if status.is_open() {
                status.state = ConnectionState::Closing;
                true
            } else {
                false
            }
        });
        self.command(Command::Close)
    }

    /// Forbid further reconnect attempts. The next retry decision emits the
    /// terminal `error` instead of reconnecting.
    pub fn abort(&self) -> Result<(), SocketError> {
        self.command(Command::Abort)
    }

    /// Start streaming without a viewport.
    pub fn listen(&self) -> Result<(), SocketError> {
        self.update_intent(SubscriptionIntent::request_listen)
    }

    /// Validate `raw` and start streaming inside it.
    ///
    /// On a validation failure nothing is stored or sent.
    pub fn initialize_bounding_box(
        &self,
        raw: impl Into<Value>,
    ) -> Result<BoundingBox, SocketError> {
        let bounding_box = check(&raw.into())?;
        self.update_intent(|intent| {
            intent.request_bounding_box(bounding_box, MessageKind::BoundingBoxInitialized)
        })?;
        Ok(bounding_box)
    }

    /// Validate `raw` and move the subscription to it.
    ///
    /// On a validation failure nothing is stored or sent.
    pub fn set_bounding_box(&self, raw: impl Into<Value>) -> Result<BoundingBox, SocketError> {
        let bounding_box = check(&raw.into())?;
        self.update_intent(|intent| {
            intent.request_bounding_box(bounding_box, MessageKind::BoundingBoxChanged)
        })?;
        Ok(bounding_box)
    }

    /// Replace the content filter. An empty filter clears it.
    pub fn change_filter(&self, filter: Filter) -> Result<(), SocketError> {
        let filter = normalize_filter(filter);
        self.update_intent(|intent| intent.request_filter(filter))
    }

    /// Remove the content filter.
    pub fn clear_filter(&self) -> Result<(), SocketError> {
        self.update_intent(|intent| intent.request_filter(None))
    }

    /// Whether the transport is currently open.
    pub fn is_opened(&self) -> bool {
        self.shared.status.borrow().is_open()
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    /// A receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Current subscription intent.
    pub fn intent(&self) -> SubscriptionIntent {
        self.shared.intent.lock().intent.clone()
    }

    /// The frozen connection target.
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Register an event callback. It runs on the driver task.
    pub fn on<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        self.shared.events.on(callback)
    }

    /// Remove an event callback.
    pub fn off(&self, id: ListenerId) -> bool {
        self.shared.events.off(id)
    }

    /// Receive events through a channel.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.events.subscribe()
    }

    /// The event bus shared by every clone of this handle.
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    fn update_intent<F>(&self, apply: F) -> Result<(), SocketError>
    where
        F: FnOnce(&mut SubscriptionIntent) -> Option<MessageKind>,
    {
        let change = {
            let mut cell = self.shared.intent.lock();
            apply(&mut cell.intent).map(|kind| (kind, cell.bump()))
        };
        match change {
            Some((kind, revision)) => self.command(Command::Send { kind, revision }),
            None => {
                debug!(
                    address = self.shared.endpoint.address(),
                    "Subscription unchanged, nothing to send"
                );
                Ok(())
            }
        }
    }

    fn command(&self, command: Command) -> Result<(), SocketError> {
        self.shared.commands.send(command).map_err(|err| {
            debug!(command = ?err.0, "Driver stopped, command dropped");
            SocketError::Terminated
        })
    }
}

impl ItemSocket for ReconnectingSocket {
    fn connect(&self) -> Result<(), SocketError> {
        Self::connect(self)
    }

    fn close(&self) -> Result<(), SocketError> {
        Self::close(self)
    }

    fn abort(&self) -> Result<(), SocketError> {
        Self::abort(self)
    }

    fn on<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        Self::on(self, callback)
    }

    fn off(&self, id: ListenerId) -> bool {
        Self::off(self, id)
    }

    fn initialize_bounding_box(&self, raw: Value) -> Result<BoundingBox, SocketError> {
        Self::initialize_bounding_box(self, raw)
    }

    fn set_bounding_box(&self, raw: Value) -> Result<BoundingBox, SocketError> {
        Self::set_bounding_box(self, raw)
    }
}

/// One turn of the driver loop.
enum Step {
    Command(Option<Command>),
    Signal(TransportId, TransportSignal),
    Retry,
}

struct Driver {
    endpoint: Endpoint,
    connector: Arc<dyn Connector>,
    events: EventBus,
    intent: Arc<Mutex<IntentCell>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    status: ConnectionStatus,
    transport: Option<Box<dyn Transport>>,
    current: TransportId,
    signal_tx: SignalTx,
    retry_at: Option<Instant>,
    /// Intent revision covered by the last replay.
    replayed: u64,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>, mut signals: SignalRx) {
        loop {
            let retry_at = self.retry_at;
            let step = tokio::select! {
                biased;
                command = commands.recv() => Step::Command(command),
                Some((id, signal)) = signals.recv() => Step::Signal(id, signal),
                () = retry_timer(retry_at) => Step::Retry,
            };

            match step {
                Step::Command(Some(command)) => self.handle_command(command),
                Step::Command(None) => {
                    self.shutdown();
                    return;
                }
                Step::Signal(id, signal) => self.handle_signal(id, signal),
                Step::Retry => self.retry(),
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Close => self.close(),
            Command::Abort => {
                info!(address = self.endpoint.address(), "Reconnection aborted");
                self.status.aborted = true;
                self.publish_status();
            }
            Command::Send { kind, revision } => self.send_change(kind, revision),
        }
    }

    fn connect(&mut self) {
        self.status.aborted = false;
        if matches!(self.status.state, ConnectionState::Idle | ConnectionState::Closed) {
            self.status.retries_done = 0;
        }
        self.retry_at = None;
        if self.transport.is_some() {
            debug!(address = self.endpoint.address(), "Transport already live, connect ignored");
            self.publish_status();
            return;
        }
        self.open_transport();
    }

    fn open_transport(&mut self) {
        let id = self.current.next();
        self.current = id;
        self.status.state = ConnectionState::Connecting;
        self.publish_status();
        info!(
            address = self.endpoint.address(),
            transport = %id,
            retries_done = self.status.retries_done,
            "Opening transport"
        );
        let sink = SignalSink::new(id, self.signal_tx.clone());
        self.transport = Some(self.connector.open(self.endpoint.address(), sink));
    }

    fn close(&mut self) {
        self.retry_at = None;
        if self.transport.is_some() {
            self.status.state = ConnectionState::Closing;
            self.publish_status();
            self.teardown();
        }
        self.status.state = ConnectionState::Closed;
        self.publish_status();
        info!(address = self.endpoint.address(), "Socket closed by client");
        self.events.emit(&SocketEvent::Closed);
    }

    fn handle_signal(&mut self, id: TransportId, signal: TransportSignal) {
        if id != self.current || self.transport.is_none() {
            trace!(transport = %id, current = %self.current, ?signal, "Ignoring signal from stale transport");
            return;
        }
        match signal {
            TransportSignal::Opened => self.opened(),
            TransportSignal::Message(text) => self.relay(&text),
            TransportSignal::Error(reason) => {
                warn!(address = self.endpoint.address(), transport = %id, reason = %reason, "Transport failed");
                self.lost();
            }
            TransportSignal::Closed => {
                info!(address = self.endpoint.address(), transport = %id, "Transport closed by server");
                self.lost();
            }
        }
    }

    fn opened(&mut self) {
        self.status.state = ConnectionState::Open;
        self.status.retries_done = 0;
        self.publish_status();
        info!(address = self.endpoint.address(), transport = %self.current, "Transport open");
        self.replay();
        self.events.emit(&SocketEvent::Opened);
    }

    /// Re-establish the stored intent on a freshly opened transport.
    fn replay(&mut self) {
        let (message, revision) = {
            let cell = self.intent.lock();
            let message = cell
                .intent
                .replay_kind()
                .map(|kind| cell.intent.message(kind, self.endpoint.type_tag()));
            (message, cell.revision)
        };
        self.replayed = revision;
        match message {
            Some(message) => {
                debug!(event = %message.event, revision, "Replaying subscription");
                self.write(&message);
            }
            None => debug!("Nothing to replay"),
        }
    }

    fn send_change(&mut self, kind: MessageKind, revision: u64) {
        if !self.status.is_open() {
            debug!(event = %kind, state = %self.status.state, "Not open, change deferred to replay");
            return;
        }
        if revision <= self.replayed {
            debug!(event = %kind, revision, "Change already covered by replay");
            return;
        }
        let message = self
            .intent
            .lock()
            .intent
            .message(kind, self.endpoint.type_tag());
        self.write(&message);
    }

    fn write(&mut self, message: &ProtocolMessage) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        match message.to_json() {
            Ok(text) => {
                debug!(event = %message.event, payload = %text, "Sending protocol message");
                transport.send(text);
            }
            Err(err) => warn!(event = %message.event, error = %err, "Failed to encode protocol message"),
        }
    }

    fn relay(&self, text: &str) {
        if !self.intent.lock().intent.listening {
            trace!("Not listening, inbound message dropped");
            return;
        }
        match InboundPayload::parse(text) {
            Ok(payload) => {
                let items = payload.into_items();
                debug!(count = items.len(), "Relaying items");
                for item in items {
                    self.events.emit(&SocketEvent::NewItem(item));
                }
            }
            Err(err) => warn!(error = %err, "Dropping unparsable inbound message"),
        }
    }

    /// The transport errored or the server closed it.
    fn lost(&mut self) {
        self.teardown();
        let policy = self.endpoint.retry();
        if !self.status.aborted && policy.allows(self.status.retries_done) {
            self.status.retries_done = self.status.retries_done.saturating_add(1);
            let now = Instant::now();
            self.retry_at = Some(now.checked_add(policy.retry_interval).unwrap_or(now));
            self.status.state = ConnectionState::Connecting;
            self.publish_status();
            info!(
                address = self.endpoint.address(),
                attempt = self.status.retries_done,
                max_retries = policy.max_retries,
                delay_ms = u64::try_from(policy.retry_interval.as_millis()).unwrap_or(u64::MAX),
                "Reconnect scheduled"
            );
        } else {
            self.give_up();
        }
    }

    fn retry(&mut self) {
        self.retry_at = None;
        if self.status.aborted {
            self.give_up();
            return;
        }
        self.open_transport();
    }

    fn give_up(&mut self) {
        self.retry_at = None;
        self.status.state = ConnectionState::Closed;
        self.publish_status();
        let err = ConnectionError {
            address: self.endpoint.address().to_owned(),
            retries: self.status.retries_done,
        };
        if self.status.aborted {
            warn!(address = %err.address, retries = err.retries, "Retry refused after abort");
        } else {
            error!(address = %err.address, retries = err.retries, "Reconnection exhausted");
        }
        self.events.emit(&SocketEvent::Error(err));
    }

    fn teardown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }

    fn shutdown(&mut self) {
        debug!(address = self.endpoint.address(), "All handles dropped, stopping driver");
        self.retry_at = None;
        self.teardown();
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status);
    }
}

async fn retry_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => core::future::pending().await,
    }
}
