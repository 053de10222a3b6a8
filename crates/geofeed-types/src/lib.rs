//! Shared type definitions for geofeed.
//!
//! This crate holds everything that is pure data: the bounding box validator
//! that gates every subscription message, the outbound protocol messages,
//! and the inbound item payloads. Nothing here performs I/O.
//!
//! Wire types flow downstream to `TypeScript` via `ts-rs` for server and
//! dashboard code that speaks the same protocol.
//!
//! # Modules
//!
//! - [`bounding_box`] -- Validation and clamping of `[swLon, swLat, neLon, neLat]` boxes
//! - [`issue`] -- Coordinate issues and the [`BadFormat`] error
//! - [`protocol`] -- Outbound subscription messages
//! - [`item`] -- Inbound items and payload parsing

pub mod bounding_box;
pub mod issue;
pub mod item;
pub mod protocol;

// Re-export all public types at crate root for convenience.
pub use bounding_box::{BoundingBox, check};
pub use issue::{BadFormat, CoordinateIssue, CoordinatePosition};
pub use item::{InboundPayload, Item};
pub use protocol::{Filter, MessageKind, ProtocolMessage, normalize_filter};
