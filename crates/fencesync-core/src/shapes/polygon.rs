//! Fence polygon.

use super::FenceShape;
use crate::geo::GeoCoordinate;
use crate::schema::{self, ParseError};
use kurbo::{BezPath, Rect, Shape as KurboShape};
use serde_json::{Map, Value, json};

const POLYGON_VERSION: i64 = 1;
const INCLUSION_KEY: &str = "inclusion";
const POLYGON_KEY: &str = "polygon";

/// An inclusion or exclusion polygon.
///
/// A polygon with fewer than three vertices is incomplete: it still
/// serializes, but `contains` is always false.
#[derive(Debug, Clone)]
pub struct FencePolygon {
    vertices: Vec<GeoCoordinate>,
    inclusion: bool,
    interactive: bool,
    dirty: bool,
}

impl FencePolygon {
    /// Create an empty polygon.
    pub fn new(inclusion: bool) -> Self {
        Self {
            vertices: Vec::new(),
            inclusion,
            interactive: false,
            dirty: false,
        }
    }

    /// Create a polygon from a vertex list.
    pub fn from_vertices(vertices: Vec<GeoCoordinate>, inclusion: bool) -> Self {
        Self {
            vertices,
            inclusion,
            interactive: false,
            dirty: false,
        }
    }

    pub fn vertices(&self) -> &[GeoCoordinate] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// At least three vertices.
    pub fn is_complete(&self) -> bool {
        self.vertices.len() >= 3
    }

    pub fn append_vertex(&mut self, vertex: GeoCoordinate) {
        self.vertices.push(vertex);
        self.dirty = true;
    }

    /// Move a vertex. Returns false if `index` is out of range.
    pub fn set_vertex(&mut self, index: usize, vertex: GeoCoordinate) -> bool {
        match self.vertices.get_mut(index) {
            Some(existing) => {
                if *existing != vertex {
                    *existing = vertex;
                    self.dirty = true;
                }
                true
            }
            None => false,
        }
    }

    pub fn remove_vertex(&mut self, index: usize) -> Option<GeoCoordinate> {
        if index >= self.vertices.len() {
            return None;
        }
        self.dirty = true;
        Some(self.vertices.remove(index))
    }

    pub fn set_vertices(&mut self, vertices: Vec<GeoCoordinate>) {
        if self.vertices != vertices {
            self.vertices = vertices;
            self.dirty = true;
        }
    }

    /// Bounding box in the lon/lat plane.
    pub fn bounds(&self) -> Option<Rect> {
        let mut points = self.vertices.iter().map(GeoCoordinate::to_plane);
        let first = points.next()?;
        Some(points.fold(Rect::from_points(first, first), |rect, p| rect.union_pt(p)))
    }

    /// Closed outline in the lon/lat plane.
    pub fn to_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let mut points = self.vertices.iter().map(GeoCoordinate::to_plane);
        if let Some(first) = points.next() {
            path.move_to(first);
            for p in points {
                path.line_to(p);
            }
            path.close_path();
        }
        path
    }
}

impl PartialEq for FencePolygon {
    fn eq(&self, other: &Self) -> bool {
        self.inclusion == other.inclusion && self.vertices == other.vertices
    }
}

impl FenceShape for FencePolygon {
    const KIND: &'static str = "polygon";

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
        self.is_complete() && self.to_path().contains(point.to_plane())
    }

    fn to_json(&self) -> Map<String, Value> {
        let mut obj = Map::new();
        obj.insert(schema::VERSION_KEY.to_string(), json!(POLYGON_VERSION));
        obj.insert(INCLUSION_KEY.to_string(), json!(self.inclusion));
        obj.insert(
            POLYGON_KEY.to_string(),
            Value::Array(
                self.vertices
                    .iter()
                    .map(|v| schema::coordinate_to_json(v, false))
                    .collect(),
            ),
        );
        obj
    }

    fn from_json(obj: &Map<String, Value>) -> Result<Self, ParseError> {
        schema::require_shape_version(obj, Self::KIND, POLYGON_VERSION)?;
        let inclusion = schema::require_bool(obj, INCLUSION_KEY)?;
        let vertices = schema::require_array(obj, POLYGON_KEY)?
            .iter()
            .map(|v| schema::coordinate_from_json(v, false))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_vertices(vertices, inclusion))
    }
}
