//! Validation failures reported by the bounding box checker.
//!
//! A [`BadFormat`] either describes a structural problem with the raw input
//! (not an array, wrong number of values) or carries every
//! [`CoordinateIssue`] found while inspecting the four coordinates. Issues
//! are collected, never short-circuited, so a single check surfaces every
//! problem at once.

use core::fmt;

use serde_json::Value;

/// Prefix shared by every [`BadFormat`] message.
pub const BAD_FORMAT_PREFIX: &str =
    "the provided bounding box is badly formatted, with the following error(s):";

/// One of the four positions of a `[swLon, swLat, neLon, neLat]` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CoordinatePosition {
    /// South-west longitude (index 0).
    SwLon,
    /// South-west latitude (index 1).
    SwLat,
    /// North-east longitude (index 2).
    NeLon,
    /// North-east latitude (index 3).
    NeLat,
}

impl CoordinatePosition {
    /// All positions in wire order.
    pub const ALL: [Self; 4] = [Self::SwLon, Self::SwLat, Self::NeLon, Self::NeLat];

    /// Human label used in error messages (`SWLon`, `SWLat`, `NELon`, `NELat`).
    pub const fn label(self) -> &'static str {
        match self {
            Self::SwLon => "SWLon",
            Self::SwLat => "SWLat",
            Self::NeLon => "NELon",
            Self::NeLat => "NELat",
        }
    }

    /// Index of this position in the 4-value array.
    pub const fn index(self) -> usize {
        match self {
            Self::SwLon => 0,
            Self::SwLat => 1,
            Self::NeLon => 2,
            Self::NeLat => 3,
        }
    }

    /// Whether this position holds a latitude.
    pub const fn is_latitude(self) -> bool {
        matches!(self, Self::SwLat | Self::NeLat)
    }

    /// Inclusive `(min, max)` range values at this position are clamped to.
    pub const fn range(self) -> (f64, f64) {
        if self.is_latitude() {
            (crate::bounding_box::MIN_LATITUDE, crate::bounding_box::MAX_LATITUDE)
        } else {
            (crate::bounding_box::MIN_LONGITUDE, crate::bounding_box::MAX_LONGITUDE)
        }
    }
}

impl fmt::Display for CoordinatePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single validation failure on one coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateIssue {
    /// The position the failure was found at.
    pub position: CoordinatePosition,
    /// The offending value as it was received.
    pub value: Value,
    /// Free-text reason, e.g. `must be a valid float number`.
    pub reason: String,
    /// The other coordinate involved, for ordering failures.
    pub compared: Option<(CoordinatePosition, Value)>,
}

impl CoordinateIssue {
    /// The value at `position` is not a finite number.
    pub fn not_a_number(position: CoordinatePosition, value: Value) -> Self {
        Self {
            position,
            value,
            reason: "must be a valid float number".to_owned(),
            compared: None,
        }
    }

    /// The value at `position` must be strictly greater than the value at
    /// `compared`.
    pub fn not_greater_than(
        position: CoordinatePosition,
        value: Value,
        compared: CoordinatePosition,
        compared_value: Value,
    ) -> Self {
        Self {
            position,
            value,
            reason: "must be greater than".to_owned(),
            compared: Some((compared, compared_value)),
        }
    }
}

impl fmt::Display for CoordinateIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.position, self.value, self.reason)?;
        if let Some((position, value)) = &self.compared {
            write!(f, " [{position}] {value}")?;
        }
        Ok(())
    }
}

/// A bounding box failed validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BadFormat {
    /// The raw input is not an ordered sequence.
    #[error("{} it must be an array", BAD_FORMAT_PREFIX)]
    NotAnArray,

    /// The raw input does not hold exactly four values.
    #[error("{} it must contain 4 values, found {found}", BAD_FORMAT_PREFIX)]
    WrongLength {
        /// Number of values actually received.
        found: usize,
    },

    /// One or more coordinates are invalid.
    #[error("{}{}", BAD_FORMAT_PREFIX, format_issues(.issues))]
    Coordinates {
        /// Every issue found, in position order with the ordering issue last.
        issues: Vec<CoordinateIssue>,
    },
}

impl BadFormat {
    /// The per-coordinate issues, empty for structural failures.
    pub fn issues(&self) -> &[CoordinateIssue] {
        match self {
            Self::Coordinates { issues } => issues,
            Self::NotAnArray | Self::WrongLength { .. } => &[],
        }
    }
}

/// Render issues one per line.
fn format_issues(issues: &[CoordinateIssue]) -> String {
    issues.iter().map(|issue| format!("\n - {issue}")).collect()
}
