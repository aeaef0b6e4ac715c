//! Ground station: drives a [`SyncCoordinator`] to completion from a
//! blocking command-line flow.

use fencesync_core::config::ConfigError;
use fencesync_core::storage::StorageError;
use fencesync_core::transport::{FenceTransport, LinkTransport, TransportError};
use fencesync_core::{FenceConfig, FenceDocument, FenceEvent, FenceShape, ParseError, Session, SyncCoordinator};
use serde_json::Value;
use std::fmt::Write as _;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum StationError {
    #[error("Vehicle link: {0}")]
    Link(#[from] TransportError),
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("{0} was not issued; the vehicle is busy or offline")]
    NotIssued(&'static str),
    #[error("Vehicle reported an error during {0}")]
    Vehicle(&'static str),
    #[error("Storage: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid plan: {0}")]
    Plan(#[from] ParseError),
    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),
}

pub struct Station<T: FenceTransport> {
    sync: SyncCoordinator<T>,
    timeout: Duration,
}

impl Station<LinkTransport> {
    /// Open a link to the configured vehicle, starting from `document`.
    pub fn connect(config: &FenceConfig, document: FenceDocument) -> Result<Self, StationError> {
        let mut link = LinkTransport::new();
        link.connect(&config.vehicle_url)?;
        let sync = SyncCoordinator::new(document, link, Session::default());
        Ok(Self::new(sync, Duration::from_secs(config.sync_timeout_secs)))
    }
}

impl<T: FenceTransport> Station<T> {
    pub fn new(sync: SyncCoordinator<T>, timeout: Duration) -> Self {
        Self { sync, timeout }
    }

    pub fn sync(&self) -> &SyncCoordinator<T> {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut SyncCoordinator<T> {
        &mut self.sync
    }

    pub fn document(&self) -> &FenceDocument {
        self.sync.document()
    }

    /// Pump events until `done` says so or the timeout runs out.
    pub fn wait_until(
        &mut self,
        what: &'static str,
        mut done: impl FnMut(&SyncCoordinator<T>, &[FenceEvent]) -> bool,
    ) -> Result<(), StationError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            self.sync.update();
            let events = self.sync.poll_events();
            for event in &events {
                log::debug!("{:?}", event);
            }
            if done(&self.sync, &events) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(StationError::Timeout(what));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Wait for the load the vehicle link issues on connect.
    pub fn wait_for_initial_load(&mut self) -> Result<(), StationError> {
        self.wait_until("initial fence load", |sync, _| {
            sync.transport().initial_load_complete() && !sync.sync_in_progress()
        })
    }

    /// Replace the document with a stored plan once the link's initial
    /// load has landed, so that load cannot overwrite the plan.
    pub fn install_plan(&mut self, plan: &Value) -> Result<(), StationError> {
        self.wait_for_initial_load()?;
        self.sync.document_mut().load(plan)?;
        Ok(())
    }

    /// Replace the document with the vehicle's fence.
    pub fn pull(&mut self) -> Result<(), StationError> {
        self.wait_for_initial_load()?;
        if !self.sync.load_from_vehicle() {
            return Err(StationError::NotIssued("load"));
        }
        self.wait_until("fence load", |_, events| events.contains(&FenceEvent::LoadComplete))
    }

    /// Store the document on the vehicle.
    pub fn push(&mut self) -> Result<(), StationError> {
        self.wait_for_initial_load()?;
        if !self.sync.send_to_vehicle() {
            return Err(StationError::NotIssued("send"));
        }
        let mut error = false;
        self.wait_until("fence send", |_, events| {
            events.iter().any(|event| match event {
                FenceEvent::SendComplete { error: e } => {
                    error = *e;
                    true
                }
                _ => false,
            })
        })?;
        if error {
            return Err(StationError::Vehicle("send"));
        }
        Ok(())
    }

    /// Clear the vehicle's fence; the document follows once confirmed.
    pub fn clear(&mut self) -> Result<(), StationError> {
        self.wait_for_initial_load()?;
        if !self.sync.remove_all_from_vehicle() {
            return Err(StationError::NotIssued("remove all"));
        }
        let mut error = false;
        self.wait_until("fence removal", |_, events| {
            events.iter().any(|event| match event {
                FenceEvent::RemoveAllComplete { error: e } => {
                    error = *e;
                    true
                }
                _ => false,
            })
        })?;
        if error {
            return Err(StationError::Vehicle("remove all"));
        }
        Ok(())
    }
}

/// Human readable summary of a document.
pub fn describe(document: &FenceDocument) -> String {
    let mut out = String::new();
    match document.breach_return() {
        Some(point) => {
            let _ = writeln!(
                out,
                "Breach return: {:.6}, {:.6} at {} m",
                point.latitude,
                point.longitude,
                document.breach_altitude()
            );
        }
        None => out.push_str("Breach return: none\n"),
    }

    let _ = writeln!(out, "Polygons: {}", document.polygons().len());
    for (index, polygon) in document.polygons().iter().enumerate() {
        let _ = write!(
            out,
            "  [{}] {} {} vertices",
            index,
            kind(polygon.is_inclusion()),
            polygon.vertex_count()
        );
        if !polygon.is_complete() {
            out.push_str(" (incomplete)");
        }
        out.push('\n');
    }

    let _ = writeln!(out, "Circles: {}", document.circles().len());
    for (index, circle) in document.circles().iter().enumerate() {
        let center = circle.center();
        let _ = writeln!(
            out,
            "  [{}] {} center {:.6}, {:.6} radius {} m",
            index,
            kind(circle.is_inclusion()),
            center.latitude,
            center.longitude,
            circle.radius()
        );
    }
    out
}

fn kind(inclusion: bool) -> &'static str {
    if inclusion { "inclusion" } else { "exclusion" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fencesync_core::transport::MemoryTransport;
    use fencesync_core::{FenceCircle, FencePolygon, FenceSnapshot, GeoCoordinate};
    use serde_json::json;

    fn station(onboard: FenceSnapshot) -> Station<MemoryTransport> {
        let mut transport = MemoryTransport::with_onboard(onboard);
        transport.set_initial_load_complete(true);
        let sync = SyncCoordinator::new(FenceDocument::default(), transport, Session::default());
        Station::new(sync, Duration::from_millis(50))
    }

    fn circle_fence() -> FenceSnapshot {
        FenceSnapshot {
            breach_return: None,
            polygons: Vec::new(),
            circles: vec![FenceCircle::new(GeoCoordinate::new(47.25, 8.5), 80.0, true)],
        }
    }

    #[test]
    fn test_wait_times_out() {
        let mut station = station(FenceSnapshot::default());
        let result = station.wait_until("nothing", |_, _| false);
        assert!(matches!(result, Err(StationError::Timeout("nothing"))));
    }

    #[test]
    fn test_push_reports_vehicle_error() {
        let mut station = station(FenceSnapshot::default());
        station.sync_mut().document_mut().append_circle(circle_fence().circles[0].clone());
        station.sync_mut().send_to_vehicle();
        station.sync_mut().transport_mut().fail();

        let mut error = None;
        station
            .wait_until("send", |_, events| {
                error = events.iter().find_map(|e| match e {
                    FenceEvent::SendComplete { error } => Some(*error),
                    _ => None,
                });
                error.is_some()
            })
            .unwrap();
        assert_eq!(error, Some(true));
    }

    #[test]
    fn test_push_busy_is_not_issued() {
        let mut station = station(FenceSnapshot::default());
        station.sync_mut().transport_mut().remove_all().unwrap();
        // The outstanding request never finishes, so the initial wait fails.
        assert!(matches!(station.push(), Err(StationError::Timeout(_))));
    }

    #[test]
    fn test_pull_without_completion_times_out() {
        let mut station = station(circle_fence());
        assert!(matches!(station.pull(), Err(StationError::Timeout("fence load"))));
        assert!(station.sync().sync_in_progress());
    }

    /// Vehicle whose connect-time load has finished but not yet been
    /// seen by the coordinator, like a fresh link.
    fn linked_station(onboard: FenceSnapshot) -> Station<MemoryTransport> {
        let mut transport = MemoryTransport::with_onboard(onboard);
        transport.load_from_vehicle().unwrap();
        transport.complete();
        let sync = SyncCoordinator::new(FenceDocument::default(), transport, Session::default());
        Station::new(sync, Duration::from_millis(50))
    }

    #[test]
    fn test_empty_plan_push_clears_vehicle() {
        let mut station = linked_station(circle_fence());
        station
            .install_plan(&json!({ "version": 2, "polygons": [], "circles": [] }))
            .unwrap();
        assert!(station.document().is_empty());

        assert!(station.sync_mut().send_to_vehicle());
        assert!(station.sync_mut().transport_mut().complete());
        station.sync_mut().update();
        assert!(station.sync().transport().onboard().circles.is_empty());
    }

    #[test]
    fn test_legacy_plan_push_clears_vehicle() {
        let mut station = linked_station(circle_fence());
        station.install_plan(&json!({ "version": 1 })).unwrap();
        assert!(station.document().circles().is_empty());

        assert!(station.sync_mut().send_to_vehicle());
        assert!(station.sync_mut().transport_mut().complete());
        assert_eq!(station.sync().transport().onboard(), &FenceSnapshot::default());
    }

    #[test]
    fn test_install_plan_rejects_bad_plan() {
        let mut station = linked_station(FenceSnapshot::default());
        let result = station.install_plan(&json!({ "version": 3 }));
        assert!(matches!(result, Err(StationError::Plan(_))));
    }

    #[test]
    fn test_describe() {
        let mut document = FenceDocument::default();
        document.append_polygon(FencePolygon::from_vertices(vec![GeoCoordinate::new(1.0, 2.0)], false));
        document.append_circle(FenceCircle::new(GeoCoordinate::new(47.25, 8.5), 80.0, true));

        let text = describe(&document);
        assert!(text.contains("Breach return: none"));
        assert!(text.contains("[0] exclusion 1 vertices (incomplete)"));
        assert!(text.contains("[0] inclusion center 47.250000, 8.500000 radius 80 m"));
    }
}
