//! Outbound subscription protocol.
//!
//! Every message the client writes is a JSON object of the form:
//!
//! ```text
//! { "event": "ready" | "bounding_box_initialized" | "bounding_box_changed" | "filter_changed",
//!   "bounding_box": [swLon, swLat, neLon, neLat],   // omitted when unset
//!   "filter": { ... },                              // omitted when unset
//!   "type": "<endpoint type tag>" }
//! ```
//!
//! The current bounding box and filter ride along on every message, so the
//! server never has to remember earlier requests to interpret a new one.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::bounding_box::BoundingBox;

/// Content filter forwarded to the server. Keys are matched against each
/// item's `data` object.
pub type Filter = serde_json::Map<String, Value>;

/// Normalize a filter: an empty filter means "no filter".
pub fn normalize_filter(filter: Filter) -> Option<Filter> {
    if filter.is_empty() { None } else { Some(filter) }
}

/// Kind of subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MessageKind {
    /// Start streaming without a viewport.
    Ready,
    /// Start streaming inside a bounding box (sends the backlog for the box).
    BoundingBoxInitialized,
    /// The viewport moved; the server resends the backlog for the new box.
    BoundingBoxChanged,
    /// The content filter changed.
    FilterChanged,
}

impl MessageKind {
    /// Wire name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::BoundingBoxInitialized => "bounding_box_initialized",
            Self::BoundingBoxChanged => "bounding_box_changed",
            Self::FilterChanged => "filter_changed",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ProtocolMessage {
    /// What the client is asking for.
    pub event: MessageKind,
    /// The current bounding box, if one has been set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    /// The current content filter, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "Record<string, unknown> | null")]
    pub filter: Option<Filter>,
    /// The endpoint's free-form type tag.
    #[serde(rename = "type")]
    pub type_tag: String,
}

impl ProtocolMessage {
    /// Create a message with no bounding box and no filter.
    pub fn new(event: MessageKind, type_tag: impl Into<String>) -> Self {
        Self {
            event,
            bounding_box: None,
            filter: None,
            type_tag: type_tag.into(),
        }
    }

    /// Attach the current bounding box.
    #[must_use]
    pub fn with_bounding_box(mut self, bounding_box: Option<BoundingBox>) -> Self {
        self.bounding_box = bounding_box;
        self
    }

    /// Attach the current filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the serializer error (only possible for exotic filter values).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error when the text is not a valid message.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_fields_are_omitted() {
        let message = ProtocolMessage::new(MessageKind::Ready, "station");
        let value: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"event": "ready", "type": "station"}));
    }

    #[test]
    fn full_message_shape() {
        let bbox = BoundingBox::try_from([3.78, 43.55, 4.04, 43.65]).unwrap();
        let mut filter = Filter::new();
        filter.insert("linked_item".to_owned(), json!(48));
        let message = ProtocolMessage::new(MessageKind::BoundingBoxChanged, "station")
            .with_bounding_box(Some(bbox))
            .with_filter(Some(filter));

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "bounding_box_changed",
                "bounding_box": [3.78, 43.55, 4.04, 43.65],
                "filter": {"linked_item": 48},
                "type": "station"
            })
        );
        assert_eq!(ProtocolMessage::from_json(&value.to_string()).unwrap(), message);
    }

    #[test]
    fn kind_names_match_serde() {
        for kind in [
            MessageKind::Ready,
            MessageKind::BoundingBoxInitialized,
            MessageKind::BoundingBoxChanged,
            MessageKind::FilterChanged,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
    }

    #[test]
    fn empty_filter_normalizes_to_none() {
        assert_eq!(normalize_filter(Filter::new()), None);
        let mut filter = Filter::new();
        filter.insert("k".to_owned(), json!(1));
        assert!(normalize_filter(filter).is_some());
    }
}
