//! Fence circle.

use super::FenceShape;
use crate::geo::GeoCoordinate;
use crate::schema::{self, ParseError};
use serde_json::{Map, Value, json};

const CIRCLE_VERSION: i64 = 1;
const INCLUSION_KEY: &str = "inclusion";
const CIRCLE_KEY: &str = "circle";
const CENTER_KEY: &str = "center";
const RADIUS_KEY: &str = "radius";

/// An inclusion or exclusion circle. Radius is in meters.
#[derive(Debug, Clone)]
pub struct FenceCircle {
    center: GeoCoordinate,
    radius: f64,
    inclusion: bool,
    interactive: bool,
    dirty: bool,
}

impl FenceCircle {
    pub fn new(center: GeoCoordinate, radius: f64, inclusion: bool) -> Self {
        Self {
            center,
            radius,
            inclusion,
            interactive: false,
            dirty: false,
        }
    }

    pub fn center(&self) -> GeoCoordinate {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn set_center(&mut self, center: GeoCoordinate) {
        if self.center != center {
            self.center = center;
            self.dirty = true;
        }
    }

    /// Radius is expected to be positive but not enforced.
    pub fn set_radius(&mut self, radius: f64) {
        if self.radius != radius {
            self.radius = radius;
            self.dirty = true;
        }
    }
}

impl PartialEq for FenceCircle {
    fn eq(&self, other: &Self) -> bool {
        self.inclusion == other.inclusion && self.center == other.center && self.radius == other.radius
    }
}

impl FenceShape for FenceCircle {
    const KIND: &'static str = "circle";

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    fn is_inclusion(&self) -> bool {
        self.inclusion
    }

    fn set_inclusion(&mut self, inclusion: bool) {
        if self.inclusion != inclusion {
            self.inclusion = inclusion;
            self.dirty = true;
        }
    }

    fn contains(&self, point: &GeoCoordinate) -> bool {
        self.center.distance_to(point) <= self.radius
    }

    fn to_json(&self) -> Map<String, Value> {
        let mut obj = Map::new();
        obj.insert(schema::VERSION_KEY.to_string(), json!(CIRCLE_VERSION));
        obj.insert(INCLUSION_KEY.to_string(), json!(self.inclusion));
        obj.insert(
            CIRCLE_KEY.to_string(),
            json!({
                CENTER_KEY: schema::coordinate_to_json(&self.center, false),
                RADIUS_KEY: self.radius,
            }),
        );
        obj
    }

    fn from_json(obj: &Map<String, Value>) -> Result<Self, ParseError> {
        schema::require_shape_version(obj, Self::KIND, CIRCLE_VERSION)?;
        let inclusion = schema::require_bool(obj, INCLUSION_KEY)?;
        let circle = schema::require(obj, CIRCLE_KEY)?
            .as_object()
            .ok_or(ParseError::NotAnObject(CIRCLE_KEY))?;
        let center = schema::coordinate_from_json(schema::require(circle, CENTER_KEY)?, false)?;
        let radius = schema::require_f64(circle, RADIUS_KEY)?;
        Ok(Self::new(center, radius, inclusion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_by_distance() {
        let circle = FenceCircle::new(GeoCoordinate::new(47.0, 8.0), 100.0, false);
        assert!(circle.contains(&GeoCoordinate::new(47.0, 8.0)));
        let outside = GeoCoordinate::new(47.0, 8.0).at_distance_and_azimuth(150.0, 45.0);
        assert!(!circle.contains(&outside));
    }

    #[test]
    fn test_radius_change_sets_dirty() {
        let mut circle = FenceCircle::new(GeoCoordinate::new(0.0, 0.0), 10.0, true);
        circle.set_radius(10.0);
        assert!(!circle.is_dirty());
        circle.set_radius(20.0);
        assert!(circle.is_dirty());
    }

    #[test]
    fn test_json_layout() {
        let circle = FenceCircle::new(GeoCoordinate::new(47.5, 8.25), 75.0, true);
        let obj = Value::Object(circle.to_json());
        assert_eq!(obj["version"], json!(1));
        assert_eq!(obj["inclusion"], json!(true));
        assert_eq!(obj["circle"]["center"], json!([8.25, 47.5]));
        assert_eq!(obj["circle"]["radius"], json!(75.0));
    }

    #[test]
    fn test_json_circle_not_object() {
        let obj = json!({ "version": 1, "inclusion": true, "circle": [1, 2] });
        let result = FenceCircle::from_json(obj.as_object().unwrap());
        assert_eq!(result, Err(ParseError::NotAnObject("circle")));
    }

    #[test]
    fn test_json_missing_radius() {
        let obj = json!({ "version": 1, "inclusion": true, "circle": { "center": [1.0, 2.0] } });
        let result = FenceCircle::from_json(obj.as_object().unwrap());
        assert_eq!(result, Err(ParseError::MissingKey("radius")));
    }
}
