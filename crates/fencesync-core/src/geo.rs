//! Geographic coordinates and great-circle helpers.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Mean earth radius in meters, spherical model.
pub const EARTH_RADIUS_M: f64 = 6_371_007.2;

/// A WGS84 latitude/longitude with an optional altitude (meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

impl GeoCoordinate {
    /// Create a coordinate without altitude.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
        }
    }

    /// Create a coordinate with altitude.
    pub fn with_altitude(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: Some(altitude),
        }
    }

    /// Whether latitude and longitude are finite and in range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to `other` in meters (haversine).
    pub fn distance_to(&self, other: &GeoCoordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Coordinate reached by travelling `distance` meters along `azimuth`
    /// degrees (clockwise from north). Altitude is carried over.
    pub fn at_distance_and_azimuth(&self, distance: f64, azimuth: f64) -> GeoCoordinate {
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();
        let bearing = azimuth.to_radians();
        let angular = distance / EARTH_RADIUS_M;

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

        let mut longitude = lon2.to_degrees();
        if longitude > 180.0 {
            longitude -= 360.0;
        } else if longitude < -180.0 {
            longitude += 360.0;
        }

        GeoCoordinate {
            latitude: lat2.to_degrees(),
            longitude,
            altitude: self.altitude,
        }
    }

    /// Project into the lon/lat plane (x = longitude, y = latitude).
    pub fn to_plane(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity() {
        assert!(GeoCoordinate::new(47.0, 8.0).is_valid());
        assert!(!GeoCoordinate::new(91.0, 8.0).is_valid());
        assert!(!GeoCoordinate::new(0.0, -181.0).is_valid());
        assert!(!GeoCoordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = GeoCoordinate::new(0.0, 0.0);
        let b = GeoCoordinate::new(1.0, 0.0);
        let d = a.distance_to(&b);
        assert!((d - 111_195.0).abs() < 50.0, "distance was {}", d);
    }

    #[test]
    fn test_azimuth_roundtrip_distance() {
        let origin = GeoCoordinate::with_altitude(47.397, 8.545, 30.0);
        let moved = origin.at_distance_and_azimuth(1000.0, 90.0);
        assert!((origin.distance_to(&moved) - 1000.0).abs() < 0.5);
        assert!(moved.longitude > origin.longitude);
        assert_eq!(moved.altitude, Some(30.0));
    }

    #[test]
    fn test_north_is_latitude_increase() {
        let origin = GeoCoordinate::new(10.0, 10.0);
        let moved = origin.at_distance_and_azimuth(500.0, 0.0);
        assert!(moved.latitude > origin.latitude);
        assert!((moved.longitude - origin.longitude).abs() < 1e-9);
    }
}
