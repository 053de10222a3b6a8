//! Bounding box validation and normalization.
//!
//! A [`BoundingBox`] is the canonical `[swLon, swLat, neLon, neLat]` array
//! sent with every subscription message. The only way to obtain one is
//! through [`check`] (or the typed [`BoundingBox::from_coordinates`]), which
//! enforces:
//!
//! - the raw input is an array of exactly four values (fatal, checked first);
//! - every value is a finite number (numeric strings are accepted);
//! - longitudes are clamped to `[-180, 180]` and latitudes to `[-90, 90]`;
//! - the north-east latitude is strictly greater than the south-west one.
//!
//! Longitude order is not constrained: a box whose south-west longitude is
//! east of its north-east longitude crosses the antimeridian and is legal.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::issue::{BadFormat, CoordinateIssue, CoordinatePosition};

/// Lowest legal longitude.
pub const MIN_LONGITUDE: f64 = -180.0;
/// Highest legal longitude.
pub const MAX_LONGITUDE: f64 = 180.0;
/// Lowest legal latitude.
pub const MIN_LATITUDE: f64 = -90.0;
/// Highest legal latitude.
pub const MAX_LATITUDE: f64 = 90.0;

/// A validated `[swLon, swLat, neLon, neLat]` box.
///
/// Serializes as a bare 4-element array. Deserializing runs the same
/// validation as [`check`], so an invalid array on the wire fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BoundingBox([f64; 4]);

impl BoundingBox {
    /// Validate four typed coordinates.
    ///
    /// Non-finite values (NaN, infinities) are reported as invalid numbers.
    ///
    /// # Errors
    ///
    /// Returns [`BadFormat::Coordinates`] with every issue found.
    pub fn from_coordinates(
        sw_lon: f64,
        sw_lat: f64,
        ne_lon: f64,
        ne_lat: f64,
    ) -> Result<Self, BadFormat> {
        let values = [sw_lon, sw_lat, ne_lon, ne_lat].map(float_value);
        let [a, b, c, d] = &values;
        normalize([a, b, c, d])
    }

    /// South-west longitude.
    pub const fn sw_lon(&self) -> f64 {
        self.0[0]
    }

    /// South-west latitude.
    pub const fn sw_lat(&self) -> f64 {
        self.0[1]
    }

    /// North-east longitude.
    pub const fn ne_lon(&self) -> f64 {
        self.0[2]
    }

    /// North-east latitude.
    pub const fn ne_lat(&self) -> f64 {
        self.0[3]
    }

    /// The four coordinates in wire order.
    pub const fn as_array(&self) -> [f64; 4] {
        self.0
    }

    /// Whether the box spans the antimeridian (west edge east of east edge).
    pub fn crosses_antimeridian(&self) -> bool {
        self.sw_lon() > self.ne_lon()
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.sw_lon(),
            self.sw_lat(),
            self.ne_lon(),
            self.ne_lat()
        )
    }
}

impl<'de> Deserialize<'de> for BoundingBox {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        check(&raw).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = BadFormat;

    fn try_from([sw_lon, sw_lat, ne_lon, ne_lat]: [f64; 4]) -> Result<Self, Self::Error> {
        Self::from_coordinates(sw_lon, sw_lat, ne_lon, ne_lat)
    }
}

impl TryFrom<&Value> for BoundingBox {
    type Error = BadFormat;

    fn try_from(raw: &Value) -> Result<Self, Self::Error> {
        check(raw)
    }
}

impl From<BoundingBox> for Value {
    fn from(bounding_box: BoundingBox) -> Self {
        Self::Array(bounding_box.0.iter().copied().map(float_value).collect())
    }
}

/// Validate and normalize a raw bounding box.
///
/// The two structural checks (array, four values) short-circuit. After
/// that every coordinate is inspected independently and all issues are
/// reported together, in position order, with the latitude ordering issue
/// last.
///
/// # Errors
///
/// Returns [`BadFormat`] describing every problem found.
pub fn check(raw: &Value) -> Result<BoundingBox, BadFormat> {
    let Value::Array(values) = raw else {
        return Err(BadFormat::NotAnArray);
    };
    let [sw_lon, sw_lat, ne_lon, ne_lat] = values.as_slice() else {
        return Err(BadFormat::WrongLength {
            found: values.len(),
        });
    };
    normalize([sw_lon, sw_lat, ne_lon, ne_lat])
}

/// Per-coordinate validation, clamping, and the latitude ordering check.
fn normalize(values: [&Value; 4]) -> Result<BoundingBox, BadFormat> {
    let mut issues = Vec::new();
    let mut coordinates = [None; 4];

    for ((slot, position), value) in coordinates
        .iter_mut()
        .zip(CoordinatePosition::ALL)
        .zip(values)
    {
        match parse_coordinate(value) {
            Some(number) => {
                let (min, max) = position.range();
                *slot = Some(number.clamp(min, max));
            }
            None => issues.push(CoordinateIssue::not_a_number(position, value.clone())),
        }
    }

    if let [_, Some(sw_lat), _, Some(ne_lat)] = coordinates {
        if ne_lat <= sw_lat {
            issues.push(CoordinateIssue::not_greater_than(
                CoordinatePosition::NeLat,
                float_value(ne_lat),
                CoordinatePosition::SwLat,
                float_value(sw_lat),
            ));
        }
    }

    match coordinates {
        [Some(sw_lon), Some(sw_lat), Some(ne_lon), Some(ne_lat)] if issues.is_empty() => {
            Ok(BoundingBox([sw_lon, sw_lat, ne_lon, ne_lat]))
        }
        _ => Err(BadFormat::Coordinates { issues }),
    }
}

/// Read a finite number from a JSON number or a numeric string.
fn parse_coordinate(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }?;
    number.is_finite().then_some(number)
}

/// JSON representation of a float; non-finite values become `null`.
fn float_value(number: f64) -> Value {
    serde_json::Number::from_f64(number).map_or(Value::Null, Value::Number)
}
