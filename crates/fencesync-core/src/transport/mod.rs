//! Vehicle transports: the asynchronous peer holding onboard fence storage.
//!
//! Requests are fire-and-forget; completion is reported later through
//! `poll_events()` on the same thread.

mod link;
mod memory;

pub use link::{ConnectionState, LinkTransport};
pub use memory::{MemoryTransport, RequestCounts};

use crate::capability::PeerInfo;
use crate::geo::GeoCoordinate;
use crate::shapes::{FenceCircle, FencePolygon};
use thiserror::Error;

/// Transport errors reported when a request cannot be issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Another request is already in progress")]
    Busy,
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Completion and status events from a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A load finished; `breach_return_point`/`polygons`/`circles` hold the
    /// vehicle's fence.
    LoadComplete,
    SendComplete { error: bool },
    RemoveAllComplete { error: bool },
    InProgressChanged(bool),
    /// A (new) vehicle announced itself.
    PeerConnected(PeerInfo),
    CapabilityBitsChanged(u64),
    ProtocolVersionChanged(u32),
    ParameterChanged { name: String, value: f64 },
}

/// The remote peer holding the vehicle's onboard fence.
pub trait FenceTransport {
    /// Request the onboard fence.
    fn load_from_vehicle(&mut self) -> Result<(), TransportError>;

    /// Replace the onboard fence.
    fn send_to_vehicle(
        &mut self,
        breach_return: Option<GeoCoordinate>,
        polygons: &[FencePolygon],
        circles: &[FenceCircle],
    ) -> Result<(), TransportError>;

    /// Clear the onboard fence.
    fn remove_all(&mut self) -> Result<(), TransportError>;

    /// A request is outstanding.
    fn in_progress(&self) -> bool;

    /// The first load after connecting has finished.
    fn initial_load_complete(&self) -> bool;

    /// Last known onboard breach return point.
    fn breach_return_point(&self) -> Option<GeoCoordinate>;

    /// Last known onboard polygons.
    fn polygons(&self) -> &[FencePolygon];

    /// Last known onboard circles.
    fn circles(&self) -> &[FenceCircle];

    /// Take pending events (non-blocking).
    fn poll_events(&mut self) -> Vec<TransportEvent>;
}
