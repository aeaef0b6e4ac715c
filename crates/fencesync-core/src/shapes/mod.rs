//! Fence shapes: inclusion/exclusion polygons and circles.

mod circle;
mod polygon;

pub use circle::FenceCircle;
pub use polygon::FencePolygon;

use serde_json::{Map, Value};

use crate::geo::GeoCoordinate;
use crate::schema::ParseError;

/// Common behavior of everything a `ShapeSet` can hold.
///
/// `dirty` tracks persisted content only. `interactive` is a selection
/// flag and never marks a shape dirty.
pub trait FenceShape: Clone {
    /// Human readable kind, used in error messages and logs.
    const KIND: &'static str;

    fn is_dirty(&self) -> bool;

    fn set_dirty(&mut self, dirty: bool);

    fn is_interactive(&self) -> bool;

    fn set_interactive(&mut self, interactive: bool);

    /// True for keep-in, false for keep-out.
    fn is_inclusion(&self) -> bool;

    fn set_inclusion(&mut self, inclusion: bool);

    /// Ground-side preview of whether `point` lies inside the shape.
    fn contains(&self, point: &GeoCoordinate) -> bool;

    /// Serialize into a wire schema entry.
    fn to_json(&self) -> Map<String, Value>;

    /// Parse a wire schema entry.
    fn from_json(obj: &Map<String, Value>) -> Result<Self, ParseError>
    where
        Self: Sized;
}
