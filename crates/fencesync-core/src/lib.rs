//! FenceSync Core Library
//!
//! Geofence document model and its synchronization with a vehicle's
//! onboard fence storage.

pub mod capability;
pub mod config;
pub mod coordinator;
pub mod document;
pub mod events;
pub mod geo;
pub mod protocol;
pub mod schema;
pub mod shape_set;
pub mod shapes;
pub mod storage;
pub mod transport;

pub use capability::{CapabilityGate, PeerInfo, VehiclePeer};
pub use config::{AltitudeSettings, FenceConfig};
pub use coordinator::{OperatingMode, ReloadOutcome, Session, SyncCoordinator};
pub use document::{AltitudeError, FenceDocument};
pub use events::FenceEvent;
pub use geo::GeoCoordinate;
pub use schema::{FenceSnapshot, ParseError};
pub use shape_set::{ShapeSet, ShapeSetError};
pub use shapes::{FenceCircle, FencePolygon, FenceShape};
pub use transport::{ConnectionState, FenceTransport, LinkTransport, MemoryTransport, TransportError, TransportEvent};
