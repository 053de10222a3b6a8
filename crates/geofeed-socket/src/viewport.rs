//! Binding between an interactive map widget and a socket.
//!
//! Attaching seeds the subscription with the widget's current viewport and
//! follows every viewport change. After a reconnect the box is re-read from
//! the widget rather than taken from the last message sent.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::SocketError;
use crate::event::{ListenerId, SocketEvent};
use crate::socket::ItemSocket;

/// A longitude/latitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    /// Longitude in degrees.
    pub lng: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl LngLat {
    /// Create a pair.
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// The visible area of a map, as two corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportBounds {
    /// South-west corner.
    pub south_west: LngLat,
    /// North-east corner.
    pub north_east: LngLat,
}

impl ViewportBounds {
    /// Create bounds from two corners.
    pub const fn new(south_west: LngLat, north_east: LngLat) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// `[swLon, swLat, neLon, neLat]`, unvalidated.
    pub fn to_raw(&self) -> Value {
        json!([
            self.south_west.lng,
            self.south_west.lat,
            self.north_east.lng,
            self.north_east.lat,
        ])
    }
}

/// Callback a widget invokes after its viewport changes.
pub type ViewportCallback = Box<dyn Fn() + Send + Sync>;

/// What the binding needs from a map widget.
pub trait MapWidget: Send + Sync {
    /// The currently visible area.
    fn viewport_bounds(&self) -> ViewportBounds;

    /// Register the viewport-changed callback.
    fn on_viewport_changed(&self, callback: ViewportCallback);

    /// Remove the viewport-changed callback.
    fn off_viewport_changed(&self);
}

struct Attached {
    widget: Arc<dyn MapWidget>,
    listener: ListenerId,
}

/// Keeps a socket's bounding box in sync with a map widget.
pub struct ViewportBinding<S: ItemSocket> {
    socket: S,
    attached: Arc<Mutex<Option<Attached>>>,
}

impl<S: ItemSocket> core::fmt::Debug for ViewportBinding<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ViewportBinding")
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

impl<S: ItemSocket> ViewportBinding<S> {
    /// Wrap a socket. Nothing happens until [`attach`](Self::attach).
    pub fn new(socket: S) -> Self {
        Self {
            socket,
            attached: Arc::new(Mutex::new(None)),
        }
    }

    /// The wrapped socket.
    pub const fn socket(&self) -> &S {
        &self.socket
    }

    /// Whether a widget is attached.
    pub fn is_attached(&self) -> bool {
        self.attached.lock().is_some()
    }

    /// Attach a widget. A second attach while attached is a no-op.
    ///
    /// The widget's current viewport is sent as the initial bounding box; if
    /// it fails validation nothing is registered.
    pub fn attach(&self, widget: Arc<dyn MapWidget>) -> Result<(), SocketError> {
        let mut attached = self.attached.lock();
        if attached.is_some() {
            debug!("Widget already attached");
            return Ok(());
        }

        let bounding_box = self
            .socket
            .initialize_bounding_box(widget.viewport_bounds().to_raw())?;

        let socket = self.socket.clone();
        let changed_widget = Arc::downgrade(&widget);
        widget.on_viewport_changed(Box::new(move || {
            follow_viewport(&socket, &changed_widget, "viewport changed");
        }));

        let socket = self.socket.clone();
        let reseed_widget = Arc::downgrade(&widget);
        let state = Arc::downgrade(&self.attached);
        let listener = self.socket.on(move |event| match event {
            SocketEvent::Opened => {
                follow_viewport(&socket, &reseed_widget, "reseed after reopen");
            }
            SocketEvent::Closed => release(&state, &socket),
            SocketEvent::Error(_) | SocketEvent::NewItem(_) => {}
        });

        info!(%bounding_box, "Map widget attached");
        *attached = Some(Attached { widget, listener });
        Ok(())
    }

    /// Detach the widget, if any.
    pub fn detach(&self) {
        let taken = self.attached.lock().take();
        if let Some(attached) = taken {
            attached.widget.off_viewport_changed();
            self.socket.off(attached.listener);
            info!("Map widget detached");
        }
    }

    /// Detach the widget and close the socket.
    pub fn close(&self) -> Result<(), SocketError> {
        self.detach();
        self.socket.close()
    }
}

/// Send the widget's current viewport as the new bounding box.
fn follow_viewport<S: ItemSocket>(socket: &S, widget: &Weak<dyn MapWidget>, context: &str) {
    let Some(widget) = widget.upgrade() else {
        return;
    };
    if let Err(err) = socket.set_bounding_box(widget.viewport_bounds().to_raw()) {
        warn!(error = %err, context, "Bounding box not updated");
    }
}

/// Detach from the socket's side after it closed.
fn release<S: ItemSocket>(state: &Weak<Mutex<Option<Attached>>>, socket: &S) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let taken = state.lock().take();
    if let Some(attached) = taken {
        attached.widget.off_viewport_changed();
        socket.off(attached.listener);
        debug!("Socket closed, map widget released");
    }
}
