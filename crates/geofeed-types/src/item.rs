//! Inbound items.
//!
//! The server answers subscription requests with either one item object or
//! an array of them. Either way the client surfaces one event per item.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::Filter;

/// A geospatial item pushed by the server.
///
/// Only `geojson` and `data` have a meaning to the client; every other key
/// is preserved untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// `GeoJSON` geometry of the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geojson: Option<Value>,
    /// Application data, matched against the subscription filter.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    /// Any other fields sent by the server.
    #[serde(flatten)]
    pub extra: Filter,
}

impl Item {
    /// Whether every key of `filter` has an equal value in this item's
    /// `data` object. An empty filter matches everything.
    pub fn matches(&self, filter: &Filter) -> bool {
        filter
            .iter()
            .all(|(key, expected)| self.data.get(key) == Some(expected))
    }

    /// `[lon, lat]` of a point geometry, when the item has one.
    pub fn point(&self) -> Option<[f64; 2]> {
        let coordinates = self.geojson.as_ref()?.get("coordinates")?.as_array()?;
        match coordinates.as_slice() {
            [lon, lat, ..] => Some([lon.as_f64()?, lat.as_f64()?]),
            _ => None,
        }
    }
}

/// Payload of one inbound transport message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InboundPayload {
    /// An array of items.
    Batch(Vec<Item>),
    /// A single item object.
    Single(Item),
}

impl InboundPayload {
    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error when the text is neither an item
    /// object nor an array of item objects.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Flatten into individual items, preserving order.
    pub fn into_items(self) -> Vec<Item> {
        match self {
            Self::Batch(items) => items,
            Self::Single(item) => vec![item],
        }
    }
}
