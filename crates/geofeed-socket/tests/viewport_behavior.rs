//! Behavior tests for the map widget binding.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::float_cmp)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{StubServer, assert_quiet, expect_opened, next_event, next_items, settle};
use geofeed_socket::{
    LngLat, MapWidget, SocketError, SocketEvent, SocketOptions, ViewportBinding, ViewportBounds,
    ViewportCallback,
};
use geofeed_types::{BadFormat, BoundingBox, MessageKind};
use parking_lot::Mutex;

/// A map whose viewport the test moves by hand.
struct FakeMap {
    bounds: Mutex<ViewportBounds>,
    callback: Mutex<Option<ViewportCallback>>,
}

impl FakeMap {
    fn new(bounds: ViewportBounds) -> Arc<Self> {
        Arc::new(Self {
            bounds: Mutex::new(bounds),
            callback: Mutex::new(None),
        })
    }

    /// Move the viewport and notify, like a user pan.
    fn pan_to(&self, bounds: ViewportBounds) {
        *self.bounds.lock() = bounds;
        if let Some(callback) = self.callback.lock().as_ref() {
            callback();
        }
    }

    /// Move the viewport without notifying.
    fn jump_to(&self, bounds: ViewportBounds) {
        *self.bounds.lock() = bounds;
    }

    fn has_listener(&self) -> bool {
        self.callback.lock().is_some()
    }
}

impl MapWidget for FakeMap {
    fn viewport_bounds(&self) -> ViewportBounds {
        *self.bounds.lock()
    }

    fn on_viewport_changed(&self, callback: ViewportCallback) {
        *self.callback.lock() = Some(callback);
    }

    fn off_viewport_changed(&self) {
        *self.callback.lock() = None;
    }
}

fn montpellier() -> ViewportBounds {
    ViewportBounds::new(LngLat::new(3.78, 43.55), LngLat::new(4.04, 43.65))
}

fn panned() -> ViewportBounds {
    ViewportBounds::new(LngLat::new(3.80, 43.50), LngLat::new(4.10, 43.70))
}

fn as_box(bounds: ViewportBounds) -> BoundingBox {
    geofeed_types::check(&bounds.to_raw()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn attach_seeds_the_box_from_the_current_viewport() {
    let server = StubServer::new();
    let socket = server.socket(SocketOptions::default());
    let mut events = socket.subscribe();
    let binding = ViewportBinding::new(socket.clone());
    let map = FakeMap::new(montpellier());

    socket.connect().unwrap();
    expect_opened(&mut events).await;
    binding.attach(map.clone()).unwrap();
    next_items(&mut events, 3).await;

    assert!(binding.is_attached());
    assert!(map.has_listener());
    let received = server.received();
    assert_eq!(received[0].event, MessageKind::BoundingBoxInitialized);
    assert_eq!(received[0].bounding_box, Some(as_box(montpellier())));
}

#[tokio::test(start_paused = true)]
async fn second_attach_is_a_no_op() {
    let server = StubServer::new();
    let socket = server.socket(SocketOptions::default());
    let mut events = socket.subscribe();
    let binding = ViewportBinding::new(socket.clone());
    let map = FakeMap::new(montpellier());

    socket.connect().unwrap();
    expect_opened(&mut events).await;
    binding.attach(map.clone()).unwrap();
    next_items(&mut events, 3).await;
    binding.attach(FakeMap::new(panned())).unwrap();

    assert_quiet(&mut events).await;
    assert_eq!(server.received().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn panning_sends_a_box_change() {
    let server = StubServer::new();
    let socket = server.socket(SocketOptions::default());
    let mut events = socket.subscribe();
    let binding = ViewportBinding::new(socket.clone());
    let map = FakeMap::new(montpellier());

    socket.connect().unwrap();
    expect_opened(&mut events).await;
    binding.attach(map.clone()).unwrap();
    next_items(&mut events, 3).await;

    map.pan_to(panned());
    next_items(&mut events, 2).await;
    let received = server.received();
    assert_eq!(received[1].event, MessageKind::BoundingBoxChanged);
    assert_eq!(received[1].bounding_box, Some(as_box(panned())));
}

#[tokio::test(start_paused = true)]
async fn invalid_viewport_is_not_attached() {
    let server = StubServer::new();
    let socket = server.socket(SocketOptions::default());
    let binding = ViewportBinding::new(socket.clone());
    let upside_down = ViewportBounds::new(LngLat::new(3.78, 43.65), LngLat::new(4.04, 43.55));
    let map = FakeMap::new(upside_down);

    let err = binding.attach(map.clone()).unwrap_err();
    assert!(matches!(err, SocketError::BadFormat(BadFormat::Coordinates { .. })));
    assert!(!binding.is_attached());
    assert!(!map.has_listener());
    assert_eq!(socket.intent().bounding_box, None);
}

#[tokio::test(start_paused = true)]
async fn reopen_reseeds_from_the_widget_not_the_last_message() {
    let server = StubServer::new();
    let socket = server.socket(SocketOptions::default().with_retry_interval(Duration::from_millis(50)));
    let mut events = socket.subscribe();
    let binding = ViewportBinding::new(socket.clone());
    let map = FakeMap::new(montpellier());

    socket.connect().unwrap();
    expect_opened(&mut events).await;
    binding.attach(map.clone()).unwrap();
    next_items(&mut events, 3).await;

    map.jump_to(panned());
    server.drop_connections();
    expect_opened(&mut events).await;
    // Replay of the stored box, then the reseed from the widget.
    next_items(&mut events, 3).await;
    next_items(&mut events, 2).await;

    let kinds = server.received_kinds();
    assert_eq!(
        kinds,
        [
            MessageKind::BoundingBoxInitialized,
            MessageKind::BoundingBoxInitialized,
            MessageKind::BoundingBoxChanged,
        ]
    );
    let received = server.received();
    assert_eq!(received[1].bounding_box, Some(as_box(montpellier())));
    assert_eq!(received[2].bounding_box, Some(as_box(panned())));
}

#[tokio::test(start_paused = true)]
async fn pans_while_disconnected_ride_on_the_replay() {
    let server = StubServer::new();
    let socket = server.socket(SocketOptions::default().with_retry_interval(Duration::from_millis(50)));
    let mut events = socket.subscribe();
    let binding = ViewportBinding::new(socket.clone());
    let map = FakeMap::new(montpellier());

    socket.connect().unwrap();
    expect_opened(&mut events).await;
    binding.attach(map.clone()).unwrap();
    next_items(&mut events, 3).await;

    server.drop_connections();
    settle().await;
    map.pan_to(panned());
    expect_opened(&mut events).await;
    next_items(&mut events, 3).await;
    assert_quiet(&mut events).await;

    let received = server.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1].event, MessageKind::BoundingBoxInitialized);
    assert_eq!(received[1].bounding_box, Some(as_box(panned())));
}

#[tokio::test(start_paused = true)]
async fn detach_stops_following_the_map() {
    let server = StubServer::new();
    let socket = server.socket(SocketOptions::default());
    let mut events = socket.subscribe();
    let binding = ViewportBinding::new(socket.clone());
    let map = FakeMap::new(montpellier());

    socket.connect().unwrap();
    expect_opened(&mut events).await;
    binding.attach(map.clone()).unwrap();
    next_items(&mut events, 3).await;

    binding.detach();
    binding.detach();
    assert!(!map.has_listener());
    map.pan_to(panned());
    assert_quiet(&mut events).await;
    assert_eq!(server.received().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn detach_and_close_are_safe_without_a_widget() {
    let server = StubServer::new();
    let socket = server.socket(SocketOptions::default());
    let mut events = socket.subscribe();
    let binding = ViewportBinding::new(socket.clone());

    binding.detach();
    binding.close().unwrap();
    assert_eq!(next_event(&mut events).await, SocketEvent::Closed);
}

#[tokio::test(start_paused = true)]
async fn closing_releases_the_widget() {
    let server = StubServer::new();
    let socket = server.socket(SocketOptions::default());
    let mut events = socket.subscribe();
    let binding = ViewportBinding::new(socket.clone());
    let map = FakeMap::new(montpellier());

    socket.connect().unwrap();
    expect_opened(&mut events).await;
    binding.attach(map.clone()).unwrap();
    next_items(&mut events, 3).await;

    binding.close().unwrap();
    assert_eq!(next_event(&mut events).await, SocketEvent::Closed);
    assert!(!binding.is_attached());
    assert!(!map.has_listener());
}

#[tokio::test(start_paused = true)]
async fn socket_close_releases_the_widget_too() {
    let server = StubServer::new();
    let socket = server.socket(SocketOptions::default());
    let mut events = socket.subscribe();
    let binding = ViewportBinding::new(socket.clone());
    let map = FakeMap::new(montpellier());

    socket.connect().unwrap();
    expect_opened(&mut events).await;
    binding.attach(map.clone()).unwrap();
    next_items(&mut events, 3).await;

    socket.close().unwrap();
    assert_eq!(next_event(&mut events).await, SocketEvent::Closed);
    assert!(!binding.is_attached());
    assert!(!map.has_listener());
}
