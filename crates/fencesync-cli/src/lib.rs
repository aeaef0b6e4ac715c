//! FenceSync command-line ground station.

mod station;

pub use station::{Station, StationError, describe};
