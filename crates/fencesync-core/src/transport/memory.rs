//! In-process simulated vehicle.

use super::{FenceTransport, TransportError, TransportEvent};
use crate::geo::GeoCoordinate;
use crate::schema::FenceSnapshot;
use crate::shapes::{FenceCircle, FencePolygon};

/// Number of requests issued through a `MemoryTransport`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCounts {
    pub loads: usize,
    pub sends: usize,
    pub remove_alls: usize,
}

#[derive(Debug, Clone)]
enum Pending {
    Load,
    Send(FenceSnapshot),
    RemoveAll,
}

/// A vehicle living in memory, for tests and offline use.
///
/// Requests stay outstanding until [`complete`](Self::complete) or
/// [`fail`](Self::fail) is called, which lets callers drive the exact
/// interleaving of requests and completions.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    /// Fence stored onboard.
    onboard: FenceSnapshot,
    /// Fence as last reported to the ground.
    reported: FenceSnapshot,
    pending: Option<Pending>,
    connected: bool,
    initial_load_complete: bool,
    counts: RequestCounts,
    events: Vec<TransportEvent>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Connected vehicle with an empty onboard fence.
    pub fn new() -> Self {
        Self::with_onboard(FenceSnapshot::default())
    }

    /// Connected vehicle storing `onboard`. Nothing has been reported yet.
    pub fn with_onboard(onboard: FenceSnapshot) -> Self {
        Self {
            onboard,
            reported: FenceSnapshot::default(),
            pending: None,
            connected: true,
            initial_load_complete: false,
            counts: RequestCounts::default(),
            events: Vec::new(),
        }
    }

    pub fn onboard(&self) -> &FenceSnapshot {
        &self.onboard
    }

    /// Change the onboard fence behind the ground's back.
    pub fn set_onboard(&mut self, onboard: FenceSnapshot) {
        self.onboard = onboard;
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn set_initial_load_complete(&mut self, complete: bool) {
        self.initial_load_complete = complete;
    }

    pub fn request_counts(&self) -> RequestCounts {
        self.counts
    }

    /// Queue a vehicle report (peer identity, capabilities, parameters).
    pub fn push_event(&mut self, event: TransportEvent) {
        self.events.push(event);
    }

    /// Finish the outstanding request successfully.
    /// Returns false if nothing was pending.
    pub fn complete(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        self.events.push(TransportEvent::InProgressChanged(false));
        match pending {
            Pending::Load => {
                self.reported = self.onboard.clone();
                self.initial_load_complete = true;
                self.events.push(TransportEvent::LoadComplete);
            }
            Pending::Send(fence) => {
                self.onboard = fence.clone();
                self.reported = fence;
                self.events.push(TransportEvent::SendComplete { error: false });
            }
            Pending::RemoveAll => {
                self.onboard = FenceSnapshot::default();
                self.reported = FenceSnapshot::default();
                self.events.push(TransportEvent::RemoveAllComplete { error: false });
            }
        }
        true
    }

    /// Finish the outstanding request with an error. Onboard storage is
    /// left unchanged; a failed load still reports completion with the
    /// previously known fence.
    pub fn fail(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };
        self.events.push(TransportEvent::InProgressChanged(false));
        let event = match pending {
            Pending::Load => {
                self.initial_load_complete = true;
                TransportEvent::LoadComplete
            }
            Pending::Send(_) => TransportEvent::SendComplete { error: true },
            Pending::RemoveAll => TransportEvent::RemoveAllComplete { error: true },
        };
        self.events.push(event);
        true
    }

    fn begin(&mut self, pending: Pending) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.pending.is_some() {
            return Err(TransportError::Busy);
        }
        self.pending = Some(pending);
        self.events.push(TransportEvent::InProgressChanged(true));
        Ok(())
    }
}

impl FenceTransport for MemoryTransport {
    fn load_from_vehicle(&mut self) -> Result<(), TransportError> {
        self.begin(Pending::Load)?;
        self.counts.loads += 1;
        Ok(())
    }

    fn send_to_vehicle(
        &mut self,
        breach_return: Option<GeoCoordinate>,
        polygons: &[FencePolygon],
        circles: &[FenceCircle],
    ) -> Result<(), TransportError> {
        let fence = FenceSnapshot {
            breach_return,
            polygons: polygons.to_vec(),
            circles: circles.to_vec(),
        };
        self.begin(Pending::Send(fence))?;
        self.counts.sends += 1;
        Ok(())
    }

    fn remove_all(&mut self) -> Result<(), TransportError> {
        self.begin(Pending::RemoveAll)?;
        self.counts.remove_alls += 1;
        Ok(())
    }

    fn in_progress(&self) -> bool {
        self.pending.is_some()
    }

    fn initial_load_complete(&self) -> bool {
        self.initial_load_complete
    }

    fn breach_return_point(&self) -> Option<GeoCoordinate> {
        self.reported.breach_return
    }

    fn polygons(&self) -> &[FencePolygon] {
        &self.reported.polygons
    }

    fn circles(&self) -> &[FenceCircle] {
        &self.reported.circles
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.events)
    }
}
