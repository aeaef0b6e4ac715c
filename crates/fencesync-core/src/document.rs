//! Editable fence document: shapes, breach return point and dirty state.

use crate::config::AltitudeSettings;
use crate::events::{EventQueue, FenceEvent};
use crate::geo::GeoCoordinate;
use crate::schema::{self, Decoded, FenceSnapshot, ParseError};
use crate::shape_set::{SetEvent, ShapeSet};
use crate::shapes::{FenceCircle, FencePolygon, FenceShape};
use serde_json::Value;
use thiserror::Error;

/// Initial shapes cover this fraction of the requested box.
const INITIAL_SHAPE_INSET: f64 = 0.75;
/// Cap on the half extent (or radius) of a newly added shape, meters.
const MAX_INITIAL_HALF_EXTENT: f64 = 1500.0;

/// Breach altitude validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AltitudeError {
    #[error("altitude {value} outside [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("altitude is not a finite number")]
    NotFinite,
}

/// The ground-side fence document.
///
/// Owns every shape it holds. The aggregate dirty flag is raised by any
/// membership change, any shape turning dirty, and any breach point or
/// breach altitude change.
#[derive(Debug, Clone)]
pub struct FenceDocument {
    polygons: ShapeSet<FencePolygon>,
    circles: ShapeSet<FenceCircle>,
    breach_return: Option<GeoCoordinate>,
    breach_altitude: f64,
    altitude: AltitudeSettings,
    dirty: bool,
    events: EventQueue,
}

impl Default for FenceDocument {
    fn default() -> Self {
        Self::new(AltitudeSettings::default())
    }
}

impl FenceDocument {
    /// Create an empty document using `altitude` for breach altitude
    /// defaults and limits.
    pub fn new(altitude: AltitudeSettings) -> Self {
        Self {
            polygons: ShapeSet::new(),
            circles: ShapeSet::new(),
            breach_return: None,
            breach_altitude: altitude.default,
            altitude,
            dirty: false,
            events: EventQueue::new(),
        }
    }

    pub fn polygons(&self) -> &ShapeSet<FencePolygon> {
        &self.polygons
    }

    pub fn circles(&self) -> &ShapeSet<FenceCircle> {
        &self.circles
    }

    pub fn breach_return(&self) -> Option<GeoCoordinate> {
        self.breach_return
    }

    pub fn breach_altitude(&self) -> f64 {
        self.breach_altitude
    }

    pub fn altitude_settings(&self) -> AltitudeSettings {
        self.altitude
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// No shapes and no breach return point.
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty() && self.circles.is_empty() && self.breach_return.is_none()
    }

    /// At least one polygon or circle.
    pub fn contains_items(&self) -> bool {
        !self.polygons.is_empty() || !self.circles.is_empty()
    }

    /// Set the aggregate dirty flag.
    ///
    /// Clearing it also clears every contained shape; setting it leaves
    /// shapes untouched.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.absorb_set_events();
        if !dirty {
            self.polygons.set_all_dirty(false);
            self.circles.set_all_dirty(false);
            // Only DirtyChanged(false) can be queued at this point.
            self.polygons.drain_events();
            self.circles.drain_events();
        }
        self.update_dirty(dirty);
    }

    /// Set or clear the breach return point. Invalid coordinates clear it.
    pub fn set_breach_return(&mut self, point: Option<GeoCoordinate>) {
        let point = point.filter(GeoCoordinate::is_valid);
        if self.breach_return != point {
            self.breach_return = point;
            self.update_dirty(true);
            self.events.push(FenceEvent::BreachReturnChanged(point));
        }
    }

    /// Set the altitude written with the breach return point.
    pub fn set_breach_altitude(&mut self, altitude: f64) -> Result<(), AltitudeError> {
        if !altitude.is_finite() {
            return Err(AltitudeError::NotFinite);
        }
        if altitude < self.altitude.min || altitude > self.altitude.max {
            return Err(AltitudeError::OutOfRange {
                value: altitude,
                min: self.altitude.min,
                max: self.altitude.max,
            });
        }
        self.store_breach_altitude(altitude);
        Ok(())
    }

    /// Clear the breach return point and drop every shape.
    pub fn remove_all(&mut self) {
        self.set_breach_return(None);
        self.polygons.clear();
        self.circles.clear();
        self.absorb_set_events();
    }

    /// Replace the document with the contents of `json`.
    ///
    /// The document is always cleared first, even when parsing fails. A
    /// legacy document (no version, or version 1) loads as empty.
    pub fn load(&mut self, json: &Value) -> Result<(), ParseError> {
        self.remove_all();

        let snapshot = match schema::decode(json)? {
            Decoded::Legacy => {
                log::debug!("Ignoring legacy fence document");
                return Ok(());
            }
            Decoded::Fence(snapshot) => snapshot,
        };

        self.install(snapshot);
        self.set_dirty(false);
        self.events.push(FenceEvent::Loaded {
            breach_return: self.breach_return,
        });
        Ok(())
    }

    /// Serialize to the current schema version.
    pub fn save(&self) -> Value {
        schema::encode(&self.snapshot())
    }

    /// Copy of the persisted content, with the breach altitude applied to
    /// the breach return point.
    pub fn snapshot(&self) -> FenceSnapshot {
        FenceSnapshot {
            breach_return: self.breach_return.map(|p| GeoCoordinate {
                altitude: Some(self.breach_altitude),
                ..p
            }),
            polygons: self.polygons.as_slice().to_vec(),
            circles: self.circles.as_slice().to_vec(),
        }
    }

    /// Replace all content with `snapshot` and mark the document clean.
    pub fn reconcile(&mut self, snapshot: FenceSnapshot) {
        self.polygons.clear();
        self.circles.clear();
        self.install(snapshot);
        self.set_dirty(false);
    }

    pub fn append_polygon(&mut self, polygon: FencePolygon) {
        self.polygons.append(polygon);
        self.absorb_set_events();
    }

    pub fn append_circle(&mut self, circle: FenceCircle) {
        self.circles.append(circle);
        self.absorb_set_events();
    }

    /// Mutate a polygon in place. Returns `None` if `index` is out of range.
    pub fn edit_polygon<R>(&mut self, index: usize, f: impl FnOnce(&mut FencePolygon) -> R) -> Option<R> {
        let result = self.polygons.edit(index, f).ok();
        self.absorb_set_events();
        result
    }

    /// Mutate a circle in place. Returns `None` if `index` is out of range.
    pub fn edit_circle<R>(&mut self, index: usize, f: impl FnOnce(&mut FenceCircle) -> R) -> Option<R> {
        let result = self.circles.edit(index, f).ok();
        self.absorb_set_events();
        result
    }

    /// Delete a polygon. Out of range indices are ignored.
    pub fn delete_polygon(&mut self, index: usize) {
        if let Err(e) = self.polygons.remove_at(index) {
            log::debug!("delete_polygon ignored: {}", e);
        }
        self.absorb_set_events();
    }

    /// Delete a circle. Out of range indices are ignored.
    pub fn delete_circle(&mut self, index: usize) {
        if let Err(e) = self.circles.remove_at(index) {
            log::debug!("delete_circle ignored: {}", e);
        }
        self.absorb_set_events();
    }

    pub fn clear_all_interactive(&mut self) {
        self.polygons.clear_interactive();
        self.circles.clear_interactive();
    }

    /// Add a rectangular inclusion polygon centered in the given box.
    ///
    /// The polygon covers 3/4 of the box, with half extents capped at
    /// 1500 m. It becomes the only interactive shape.
    pub fn add_inclusion_polygon(&mut self, top_left: GeoCoordinate, bottom_right: GeoCoordinate) {
        let (center, half_width, half_height) = box_center(top_left, bottom_right);
        let half_width = (half_width * INITIAL_SHAPE_INSET).min(MAX_INITIAL_HALF_EXTENT);
        let half_height = (half_height * INITIAL_SHAPE_INSET).min(MAX_INITIAL_HALF_EXTENT);

        let corner = |east: f64, north: f64| {
            center
                .at_distance_and_azimuth(half_width, east)
                .at_distance_and_azimuth(half_height, north)
        };
        let vertices = vec![
            corner(-90.0, 0.0),
            corner(90.0, 0.0),
            corner(90.0, 180.0),
            corner(-90.0, 180.0),
        ];

        let mut polygon = FencePolygon::from_vertices(vertices, true);
        polygon.set_dirty(true);
        self.clear_all_interactive();
        polygon.set_interactive(true);
        self.append_polygon(polygon);
    }

    /// Add an inclusion circle centered in the given box.
    ///
    /// The radius is 3/4 of the smaller half extent, capped at 1500 m. It
    /// becomes the only interactive shape.
    pub fn add_inclusion_circle(&mut self, top_left: GeoCoordinate, bottom_right: GeoCoordinate) {
        let (center, half_width, half_height) = box_center(top_left, bottom_right);
        let radius = (half_width.min(half_height) * INITIAL_SHAPE_INSET).min(MAX_INITIAL_HALF_EXTENT);

        let mut circle = FenceCircle::new(center, radius, true);
        circle.set_dirty(true);
        self.clear_all_interactive();
        circle.set_interactive(true);
        self.append_circle(circle);
    }

    /// Take queued notifications.
    pub fn drain_events(&mut self) -> Vec<FenceEvent> {
        self.absorb_set_events();
        self.events.drain()
    }

    /// Put decoded content in place. Shapes are assumed already cleared.
    fn install(&mut self, snapshot: FenceSnapshot) {
        for polygon in snapshot.polygons {
            self.polygons.append(polygon);
        }
        for circle in snapshot.circles {
            self.circles.append(circle);
        }
        self.absorb_set_events();

        self.breach_return = snapshot.breach_return.filter(GeoCoordinate::is_valid);
        self.events.push(FenceEvent::BreachReturnChanged(self.breach_return));
        let altitude = self
            .breach_return
            .and_then(|p| p.altitude)
            .unwrap_or(self.altitude.default);
        self.store_breach_altitude(altitude);
    }

    fn store_breach_altitude(&mut self, altitude: f64) {
        if self.breach_altitude != altitude {
            self.breach_altitude = altitude;
            self.events.push(FenceEvent::BreachAltitudeChanged(altitude));
            self.update_dirty(true);
        }
    }

    fn update_dirty(&mut self, dirty: bool) {
        if self.dirty != dirty {
            self.dirty = dirty;
            self.events.push(FenceEvent::DirtyChanged(dirty));
        }
    }

    /// Translate shape set notifications into document notifications.
    fn absorb_set_events(&mut self) {
        let mut dirtied = false;
        let mut count_changed = false;

        for event in self.polygons.drain_events() {
            match event {
                SetEvent::CountChanged(count) => {
                    self.events.push(FenceEvent::PolygonCountChanged(count));
                    count_changed = true;
                    dirtied = true;
                }
                SetEvent::DirtyChanged(dirty) => dirtied |= dirty,
            }
        }
        for event in self.circles.drain_events() {
            match event {
                SetEvent::CountChanged(count) => {
                    self.events.push(FenceEvent::CircleCountChanged(count));
                    count_changed = true;
                    dirtied = true;
                }
                SetEvent::DirtyChanged(dirty) => dirtied |= dirty,
            }
        }

        if count_changed {
            let contains_items = self.contains_items();
            self.events.push(FenceEvent::ContainsItemsChanged(contains_items));
        }
        if dirtied {
            self.update_dirty(true);
        }
    }
}

/// Center of the box spanned by two corners, plus its half width and
/// half height in meters.
fn box_center(top_left: GeoCoordinate, bottom_right: GeoCoordinate) -> (GeoCoordinate, f64, f64) {
    let top_right = GeoCoordinate::new(top_left.latitude, bottom_right.longitude);
    let bottom_left = GeoCoordinate::new(bottom_right.latitude, top_left.longitude);

    let half_width = top_left.distance_to(&top_right) / 2.0;
    let half_height = top_left.distance_to(&bottom_left) / 2.0;

    let center_left_edge = top_left.at_distance_and_azimuth(half_height, 180.0);
    let center_top_edge = top_left.at_distance_and_azimuth(half_width, 90.0);
    let center = GeoCoordinate::new(center_left_edge.latitude, center_top_edge.longitude);

    (center, half_width, half_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn triangle(inclusion: bool) -> FencePolygon {
        FencePolygon::from_vertices(
            vec![
                GeoCoordinate::new(47.0, 8.0),
                GeoCoordinate::new(47.1, 8.0),
                GeoCoordinate::new(47.0, 8.1),
            ],
            inclusion,
        )
    }

    fn populated() -> FenceDocument {
        let mut doc = FenceDocument::default();
        doc.append_polygon(triangle(true));
        doc.append_polygon(FencePolygon::from_vertices(vec![GeoCoordinate::new(1.0, 1.0)], false));
        doc.append_circle(FenceCircle::new(GeoCoordinate::new(47.05, 8.05), 120.0, false));
        doc.set_breach_return(Some(GeoCoordinate::with_altitude(47.02, 8.02, 35.0)));
        doc.set_breach_altitude(35.0).unwrap();
        doc
    }

    #[test]
    fn test_new_document_is_empty_and_clean() {
        let doc = FenceDocument::default();
        assert!(doc.is_empty());
        assert!(!doc.is_dirty());
        assert!(!doc.contains_items());
        assert!((doc.breach_altitude() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_round_trip_with_breach_point() {
        let original = populated();
        let saved = original.save();

        let mut loaded = FenceDocument::default();
        loaded.load(&saved).unwrap();

        assert_eq!(loaded.polygons().len(), 2);
        assert_eq!(loaded.circles().len(), 1);
        assert_eq!(loaded.polygons().as_slice(), original.polygons().as_slice());
        assert_eq!(loaded.circles().as_slice(), original.circles().as_slice());
        assert_eq!(
            loaded.breach_return(),
            Some(GeoCoordinate::with_altitude(47.02, 8.02, 35.0))
        );
        assert!((loaded.breach_altitude() - 35.0).abs() < f64::EPSILON);
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn test_round_trip_without_breach_point() {
        let mut original = FenceDocument::default();
        original.append_circle(FenceCircle::new(GeoCoordinate::new(10.0, 10.0), 5.0, true));
        let saved = original.save();
        assert!(saved.get(schema::BREACH_RETURN_KEY).is_none());

        let mut loaded = populated();
        loaded.load(&saved).unwrap();
        assert_eq!(loaded.circles().len(), 1);
        assert_eq!(loaded.polygons().len(), 0);
        assert_eq!(loaded.breach_return(), None);
        assert!((loaded.breach_altitude() - 50.0).abs() < f64::EPSILON);
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn test_save_writes_current_breach_altitude() {
        let mut doc = populated();
        doc.set_breach_altitude(80.0).unwrap();
        let saved = doc.save();
        assert_eq!(saved["breachReturn"], json!([8.02, 47.02, 80.0]));
        assert_eq!(saved["version"], json!(2));
    }

    #[test]
    fn test_legacy_load_is_empty_success() {
        for legacy in [
            json!({ "polygons": [{ "bogus": true }] }),
            json!({ "version": 1, "circles": "nope", "breachReturn": [0, 0, 0] }),
        ] {
            let mut doc = populated();
            assert!(doc.load(&legacy).is_ok());
            assert!(doc.is_empty());
        }
    }

    #[test]
    fn test_unsupported_version_leaves_document_cleared() {
        let mut doc = populated();
        let result = doc.load(&json!({ "version": 3, "polygons": [], "circles": [] }));
        assert!(matches!(result, Err(ParseError::UnsupportedVersion { found: 3, .. })));
        assert_eq!(doc.polygons().len(), 0);
        assert_eq!(doc.circles().len(), 0);
        assert!(doc.is_empty());
    }

    #[test]
    fn test_malformed_circle_after_good_polygons_loads_nothing() {
        let mut doc = FenceDocument::default();
        let json = json!({
            "version": 2,
            "polygons": [Value::Object(triangle(true).to_json())],
            "circles": ["not an object"],
        });
        assert_eq!(doc.load(&json), Err(ParseError::MalformedCircle(0)));
        assert!(doc.is_empty());
    }

    #[test]
    fn test_load_signals_breach_point() {
        let mut doc = FenceDocument::default();
        doc.load(&populated().save()).unwrap();
        let events = doc.drain_events();
        assert!(events.contains(&FenceEvent::Loaded {
            breach_return: Some(GeoCoordinate::with_altitude(47.02, 8.02, 35.0)),
        }));
        assert_eq!(events.last(), Some(&FenceEvent::Loaded {
            breach_return: Some(GeoCoordinate::with_altitude(47.02, 8.02, 35.0)),
        }));
    }

    #[test]
    fn test_dirty_propagation_through_polygon_edit() {
        let mut doc = FenceDocument::default();
        doc.append_polygon(triangle(true));
        assert!(doc.is_dirty());

        doc.set_dirty(false);
        assert!(!doc.is_dirty());
        assert!(!doc.polygons().get(0).unwrap().is_dirty());

        doc.edit_polygon(0, |p| p.append_vertex(GeoCoordinate::new(47.05, 8.2)));
        assert!(doc.is_dirty());
        assert!(doc.polygons().get(0).unwrap().is_dirty());
    }

    #[test]
    fn test_set_dirty_true_leaves_shapes_alone() {
        let mut doc = FenceDocument::default();
        doc.append_circle(FenceCircle::new(GeoCoordinate::new(0.0, 0.0), 10.0, true));
        doc.set_dirty(false);
        doc.set_dirty(true);
        assert!(doc.is_dirty());
        assert!(!doc.circles().get(0).unwrap().is_dirty());
    }

    #[test]
    fn test_breach_point_change_dirties() {
        let mut doc = FenceDocument::default();
        doc.set_breach_return(Some(GeoCoordinate::new(1.0, 1.0)));
        assert!(doc.is_dirty());
        assert!(!doc.is_empty());
        assert!(!doc.contains_items());
    }

    #[test]
    fn test_invalid_breach_point_is_none() {
        let mut doc = FenceDocument::default();
        doc.set_breach_return(Some(GeoCoordinate::new(120.0, 1.0)));
        assert_eq!(doc.breach_return(), None);
        assert!(!doc.is_dirty());
    }

    #[test]
    fn test_altitude_limits() {
        let mut doc = FenceDocument::default();
        assert!(matches!(doc.set_breach_altitude(-5.0), Err(AltitudeError::OutOfRange { .. })));
        assert_eq!(doc.set_breach_altitude(f64::NAN), Err(AltitudeError::NotFinite));
        assert!(!doc.is_dirty());
        doc.set_breach_altitude(120.0).unwrap();
        assert!(doc.is_dirty());
    }

    #[test]
    fn test_remove_all_signals_breach_change() {
        let mut doc = populated();
        doc.drain_events();
        doc.remove_all();
        let events = doc.drain_events();
        assert!(events.contains(&FenceEvent::BreachReturnChanged(None)));
        assert!(events.contains(&FenceEvent::ContainsItemsChanged(false)));
        assert!(doc.is_empty());
    }

    #[test]
    fn test_delete_out_of_range_is_ignored() {
        let mut doc = populated();
        doc.set_dirty(false);
        doc.delete_polygon(7);
        doc.delete_circle(1);
        assert_eq!(doc.polygons().len(), 2);
        assert_eq!(doc.circles().len(), 1);
        assert!(!doc.is_dirty());

        doc.delete_circle(0);
        assert_eq!(doc.circles().len(), 0);
        assert!(doc.is_dirty());
    }

    #[test]
    fn test_add_inclusion_polygon() {
        let mut doc = FenceDocument::default();
        doc.append_circle(FenceCircle::new(GeoCoordinate::new(0.0, 0.0), 10.0, false));
        doc.edit_circle(0, |c| c.set_interactive(true));

        let top_left = GeoCoordinate::new(47.40, 8.50);
        let bottom_right = GeoCoordinate::new(47.39, 8.52);
        doc.add_inclusion_polygon(top_left, bottom_right);

        let polygon = doc.polygons().get(0).unwrap();
        assert_eq!(polygon.vertex_count(), 4);
        assert!(polygon.is_inclusion());
        assert!(polygon.is_interactive());
        assert!(!doc.circles().get(0).unwrap().is_interactive());

        // Inset polygon stays inside the requested box.
        for vertex in polygon.vertices() {
            assert!(vertex.latitude < 47.40 && vertex.latitude > 47.39);
            assert!(vertex.longitude > 8.50 && vertex.longitude < 8.52);
        }
    }

    #[test]
    fn test_add_inclusion_circle_caps_radius() {
        let mut doc = FenceDocument::default();
        doc.add_inclusion_circle(GeoCoordinate::new(48.0, 8.0), GeoCoordinate::new(47.0, 9.0));
        let circle = doc.circles().get(0).unwrap();
        assert!((circle.radius() - MAX_INITIAL_HALF_EXTENT).abs() < f64::EPSILON);
        assert!(circle.is_inclusion());
        assert!(circle.is_interactive());
        assert!((circle.center().latitude - 47.5).abs() < 0.01);
    }

    #[test]
    fn test_reconcile_replaces_content() {
        let mut doc = populated();
        let snapshot = FenceSnapshot {
            breach_return: None,
            polygons: vec![triangle(false)],
            circles: Vec::new(),
        };
        doc.reconcile(snapshot);
        assert_eq!(doc.polygons().len(), 1);
        assert_eq!(doc.circles().len(), 0);
        assert_eq!(doc.breach_return(), None);
        assert!((doc.breach_altitude() - 50.0).abs() < f64::EPSILON);
        assert!(!doc.is_dirty());
    }
}
