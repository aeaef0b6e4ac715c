//! Versioned wire/file schema for fence documents.
//!
//! ```json
//! {
//!   "version": 2,
//!   "polygons": [ { "version": 1, "inclusion": true, "polygon": [[lon, lat], ...] } ],
//!   "circles":  [ { "version": 1, "inclusion": false, "circle": { "center": [lon, lat], "radius": 50.0 } } ],
//!   "breachReturn": [lon, lat, alt]
//! }
//! ```
//!
//! A missing `version`, or `version == 1`, is the legacy layout and decodes
//! to nothing at all.

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::geo::GeoCoordinate;
use crate::shapes::{FenceCircle, FencePolygon, FenceShape};

pub const VERSION_KEY: &str = "version";
pub const POLYGONS_KEY: &str = "polygons";
pub const CIRCLES_KEY: &str = "circles";
pub const BREACH_RETURN_KEY: &str = "breachReturn";

/// Document version written by `encode`.
pub const CURRENT_VERSION: i64 = 2;
/// Old layout, silently ignored on load.
pub const LEGACY_VERSION: i64 = 1;

/// Schema validation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("{0} is not a JSON object")]
    NotAnObject(&'static str),
    #[error("required key '{0}' is missing")]
    MissingKey(&'static str),
    #[error("key '{key}' must be {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },
    #[error("fence document supports version {supported}, found {found}")]
    UnsupportedVersion { found: i64, supported: i64 },
    #[error("{kind} supports version {supported}, found {found}")]
    UnsupportedShapeVersion {
        kind: &'static str,
        found: i64,
        supported: i64,
    },
    #[error("polygon {0} not stored as object")]
    MalformedPolygon(usize),
    #[error("circle {0} not stored as object")]
    MalformedCircle(usize),
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

/// Everything a fence document carries, as plain values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FenceSnapshot {
    pub breach_return: Option<GeoCoordinate>,
    pub polygons: Vec<FencePolygon>,
    pub circles: Vec<FenceCircle>,
}

impl FenceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty() && self.circles.is_empty() && self.breach_return.is_none()
    }
}

/// Result of decoding a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Version absent or 1: accepted, nothing to load.
    Legacy,
    Fence(FenceSnapshot),
}

/// Decode a fence document. Nothing is returned unless every entry parses.
pub fn decode(json: &Value) -> Result<Decoded, ParseError> {
    let obj = json
        .as_object()
        .ok_or(ParseError::NotAnObject("fence document"))?;

    let Some(version) = obj.get(VERSION_KEY) else {
        return Ok(Decoded::Legacy);
    };
    let version = match (integer(version), version.as_f64()) {
        (Some(version), _) => version,
        // Fractional versions are reported truncated.
        (None, Some(number)) => {
            return Err(ParseError::UnsupportedVersion {
                found: number as i64,
                supported: CURRENT_VERSION,
            });
        }
        (None, None) => {
            return Err(ParseError::WrongType {
                key: VERSION_KEY,
                expected: "an integer",
            });
        }
    };
    if version == LEGACY_VERSION {
        return Ok(Decoded::Legacy);
    }
    if version != CURRENT_VERSION {
        return Err(ParseError::UnsupportedVersion {
            found: version,
            supported: CURRENT_VERSION,
        });
    }

    let polygon_values = require_array(obj, POLYGONS_KEY)?;
    let circle_values = require_array(obj, CIRCLES_KEY)?;
    let breach_value = match obj.get(BREACH_RETURN_KEY) {
        Some(value) if value.is_array() => Some(value),
        Some(_) => {
            return Err(ParseError::WrongType {
                key: BREACH_RETURN_KEY,
                expected: "an array",
            });
        }
        None => None,
    };

    let mut snapshot = FenceSnapshot::default();

    for (index, value) in polygon_values.iter().enumerate() {
        let entry = value.as_object().ok_or(ParseError::MalformedPolygon(index))?;
        snapshot.polygons.push(FencePolygon::from_json(entry)?);
    }

    for (index, value) in circle_values.iter().enumerate() {
        let entry = value.as_object().ok_or(ParseError::MalformedCircle(index))?;
        snapshot.circles.push(FenceCircle::from_json(entry)?);
    }

    if let Some(value) = breach_value {
        snapshot.breach_return = Some(coordinate_from_json(value, true)?);
    }

    Ok(Decoded::Fence(snapshot))
}

/// Encode a snapshot as a current-version document.
///
/// `breachReturn` is omitted when there is no point.
pub fn encode(snapshot: &FenceSnapshot) -> Value {
    let mut obj = Map::new();
    obj.insert(VERSION_KEY.to_string(), json!(CURRENT_VERSION));
    obj.insert(
        POLYGONS_KEY.to_string(),
        Value::Array(snapshot.polygons.iter().map(|p| Value::Object(p.to_json())).collect()),
    );
    obj.insert(
        CIRCLES_KEY.to_string(),
        Value::Array(snapshot.circles.iter().map(|c| Value::Object(c.to_json())).collect()),
    );
    if let Some(point) = snapshot.breach_return.as_ref().filter(|p| p.is_valid()) {
        obj.insert(BREACH_RETURN_KEY.to_string(), coordinate_to_json(point, true));
    }
    Value::Object(obj)
}

/// Parse `[lon, lat]` or `[lon, lat, alt]`.
pub fn coordinate_from_json(value: &Value, altitude_required: bool) -> Result<GeoCoordinate, ParseError> {
    let items = value
        .as_array()
        .ok_or_else(|| ParseError::InvalidCoordinate("not stored as array".to_string()))?;

    let accepted = if altitude_required {
        items.len() == 3
    } else {
        items.len() == 2 || items.len() == 3
    };
    if !accepted {
        let expected = if altitude_required { "[lon, lat, alt]" } else { "[lon, lat]" };
        return Err(ParseError::InvalidCoordinate(format!(
            "expected {}, found {} values",
            expected,
            items.len()
        )));
    }

    let mut numbers = Vec::with_capacity(items.len());
    for item in items {
        let number = item
            .as_f64()
            .ok_or_else(|| ParseError::InvalidCoordinate(format!("'{}' is not a number", item)))?;
        numbers.push(number);
    }

    let coordinate = GeoCoordinate {
        longitude: numbers[0],
        latitude: numbers[1],
        altitude: numbers.get(2).copied(),
    };
    if !coordinate.is_valid() {
        return Err(ParseError::InvalidCoordinate(format!(
            "lat {} lon {} out of range",
            coordinate.latitude, coordinate.longitude
        )));
    }
    Ok(coordinate)
}

/// Write `[lon, lat]`, or `[lon, lat, alt]` when `write_altitude` is set.
/// A missing altitude is written as 0.
pub fn coordinate_to_json(coordinate: &GeoCoordinate, write_altitude: bool) -> Value {
    if write_altitude {
        json!([
            coordinate.longitude,
            coordinate.latitude,
            coordinate.altitude.unwrap_or(0.0)
        ])
    } else {
        json!([coordinate.longitude, coordinate.latitude])
    }
}

/// Integer value of a JSON number, accepting integral floats like `2.0`.
pub(crate) fn integer(value: &Value) -> Option<i64> {
    if let Some(v) = value.as_i64() {
        return Some(v);
    }
    value
        .as_f64()
        .filter(|v| v.fract() == 0.0 && v.is_finite())
        .map(|v| v as i64)
}

pub(crate) fn require<'a>(obj: &'a Map<String, Value>, key: &'static str) -> Result<&'a Value, ParseError> {
    obj.get(key).ok_or(ParseError::MissingKey(key))
}

pub(crate) fn require_array<'a>(
    obj: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a Vec<Value>, ParseError> {
    require(obj, key)?.as_array().ok_or(ParseError::WrongType {
        key,
        expected: "an array",
    })
}

pub(crate) fn require_bool(obj: &Map<String, Value>, key: &'static str) -> Result<bool, ParseError> {
    require(obj, key)?.as_bool().ok_or(ParseError::WrongType {
        key,
        expected: "a boolean",
    })
}

pub(crate) fn require_f64(obj: &Map<String, Value>, key: &'static str) -> Result<f64, ParseError> {
    require(obj, key)?.as_f64().ok_or(ParseError::WrongType {
        key,
        expected: "a number",
    })
}

/// Check a nested shape object's own `version` field.
pub(crate) fn require_shape_version(
    obj: &Map<String, Value>,
    kind: &'static str,
    supported: i64,
) -> Result<(), ParseError> {
    let found = integer(require(obj, VERSION_KEY)?).ok_or(ParseError::WrongType {
        key: VERSION_KEY,
        expected: "an integer",
    })?;
    if found != supported {
        return Err(ParseError::UnsupportedShapeVersion {
            kind,
            found,
            supported,
        });
    }
    Ok(())
}
