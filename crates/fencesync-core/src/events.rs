//! Change notifications for presentation layers.
//!
//! Components queue events as they mutate; consumers drain them with
//! `poll_events()` on the coordinator.

use crate::geo::GeoCoordinate;

#[derive(Debug, Clone, PartialEq)]
pub enum FenceEvent {
    /// Aggregate document dirty flag changed.
    DirtyChanged(bool),
    BreachReturnChanged(Option<GeoCoordinate>),
    BreachAltitudeChanged(f64),
    PolygonCountChanged(usize),
    CircleCountChanged(usize),
    ContainsItemsChanged(bool),
    /// A document was loaded from a file/wire value.
    Loaded { breach_return: Option<GeoCoordinate> },
    /// Local state was reconciled from the vehicle.
    LoadComplete,
    /// The vehicle finished (or failed) storing a sent fence.
    SendComplete { error: bool },
    RemoveAllComplete { error: bool },
    SyncInProgressChanged(bool),
    SupportedChanged(bool),
    LegacyFenceRadiusChanged(f64),
}

/// FIFO of pending events.
#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    events: Vec<FenceEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: FenceEvent) {
        self.events.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take all pending events in order.
    pub fn drain(&mut self) -> Vec<FenceEvent> {
        std::mem::take(&mut self.events)
    }
}
