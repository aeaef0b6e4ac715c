//! Synchronization between the fence document and a vehicle.
//!
//! The coordinator issues load/send/remove-all requests against a
//! [`FenceTransport`] and folds the transport's completion events back into
//! the [`FenceDocument`]. At most one request is outstanding at a time; the
//! transport's own progress flag is the sync state.

use crate::capability::{CapabilityGate, VehiclePeer};
use crate::document::FenceDocument;
use crate::events::{EventQueue, FenceEvent};
use crate::schema::FenceSnapshot;
use crate::transport::{FenceTransport, TransportEvent};

/// What the ground station is doing with the fence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OperatingMode {
    /// Flying: the view always mirrors the vehicle.
    Live,
    /// Planning: local edits take priority over unsolicited vehicle data.
    #[default]
    Editing,
}

/// Session context the coordinator consults before talking to a vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    /// Planning without a vehicle link.
    pub offline: bool,
    pub mode: OperatingMode,
}

impl Session {
    pub fn offline() -> Self {
        Self {
            offline: true,
            mode: OperatingMode::Editing,
        }
    }

    pub fn live() -> Self {
        Self {
            offline: false,
            mode: OperatingMode::Live,
        }
    }
}

/// Result of [`SyncCoordinator::show_plan_from_vehicle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Nothing more to do now: either offline, or a completion event will
    /// arrive later and reconcile then.
    Handled,
    /// The document was reconciled immediately from the transport's
    /// current data.
    Reconciled,
}

impl ReloadOutcome {
    pub fn is_handled(self) -> bool {
        self == ReloadOutcome::Handled
    }
}

pub struct SyncCoordinator<T: FenceTransport> {
    document: FenceDocument,
    transport: T,
    session: Session,
    capability: CapabilityGate,
    /// A reload was explicitly asked for; the next load completion must
    /// reconcile even over local edits.
    items_requested: bool,
    events: EventQueue,
}

impl<T: FenceTransport> SyncCoordinator<T> {
    /// Bind `document` to the vehicle reached through `transport`.
    pub fn new(document: FenceDocument, transport: T, session: Session) -> Self {
        let mut capability = CapabilityGate::new();
        let peer = session.offline.then(VehiclePeer::offline_editing);
        capability.set_active_peer(peer);
        Self {
            document,
            transport,
            session,
            capability,
            items_requested: false,
            events: EventQueue::new(),
        }
    }

    pub fn document(&self) -> &FenceDocument {
        &self.document
    }

    /// Direct edits of the document.
    pub fn document_mut(&mut self) -> &mut FenceDocument {
        &mut self.document
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn set_session(&mut self, session: Session) {
        self.session = session;
    }

    pub fn capability(&self) -> &CapabilityGate {
        &self.capability
    }

    pub fn sync_in_progress(&self) -> bool {
        self.transport.in_progress()
    }

    pub fn supported(&self) -> bool {
        self.capability.supported()
    }

    pub fn legacy_fence_radius(&self) -> f64 {
        self.capability.legacy_fence_radius()
    }

    /// Replace the vehicle: new transport, new peer. Returns the old
    /// transport. Outstanding requests on the old transport are forgotten.
    pub fn switch_vehicle(&mut self, transport: T, peer: Option<VehiclePeer>) -> T {
        log::debug!("Switching vehicle");
        let previous = std::mem::replace(&mut self.transport, transport);
        self.items_requested = false;
        self.capability.set_active_peer(peer);
        previous
    }

    /// Request the vehicle's fence. Ignored while offline or syncing.
    ///
    /// Returns true if a request was issued.
    pub fn load_from_vehicle(&mut self) -> bool {
        if self.rejected("load_from_vehicle") {
            return false;
        }
        self.items_requested = true;
        match self.transport.load_from_vehicle() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("load_from_vehicle failed: {}", e);
                self.items_requested = false;
                false
            }
        }
    }

    /// Send the document to the vehicle. Ignored while offline or syncing.
    ///
    /// The document is marked clean as soon as the transport accepts the
    /// request. Returns true if a request was issued.
    pub fn send_to_vehicle(&mut self) -> bool {
        if self.rejected("send_to_vehicle") {
            return false;
        }
        let fence = self.document.snapshot();
        match self
            .transport
            .send_to_vehicle(fence.breach_return, &fence.polygons, &fence.circles)
        {
            Ok(()) => {
                self.document.set_dirty(false);
                true
            }
            Err(e) => {
                log::warn!("send_to_vehicle failed: {}", e);
                false
            }
        }
    }

    /// Clear the vehicle's fence. The local document is only cleared once
    /// the vehicle confirms. Ignored while offline or syncing.
    ///
    /// Returns true if a request was issued.
    pub fn remove_all_from_vehicle(&mut self) -> bool {
        if self.rejected("remove_all_from_vehicle") {
            return false;
        }
        match self.transport.remove_all() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("remove_all_from_vehicle failed: {}", e);
                false
            }
        }
    }

    /// Make the document show what the vehicle holds.
    pub fn show_plan_from_vehicle(&mut self) -> ReloadOutcome {
        log::debug!("show_plan_from_vehicle mode {:?}", self.session.mode);
        if self.session.offline {
            log::warn!("show_plan_from_vehicle called while offline");
            return ReloadOutcome::Handled;
        }

        self.items_requested = true;
        if !self.transport.initial_load_complete() {
            log::debug!("show_plan_from_vehicle: initial load pending, waiting for completion");
            ReloadOutcome::Handled
        } else if self.transport.in_progress() {
            log::debug!("show_plan_from_vehicle: sync in progress, waiting for completion");
            ReloadOutcome::Handled
        } else {
            log::debug!("show_plan_from_vehicle: reconciling from current vehicle data");
            self.load_complete();
            ReloadOutcome::Reconciled
        }
    }

    /// Process transport events. Call regularly from the owning loop.
    pub fn update(&mut self) {
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::LoadComplete => self.load_complete(),
                TransportEvent::SendComplete { error } => {
                    self.events.push(FenceEvent::SendComplete { error });
                    if !error && self.session.mode == OperatingMode::Live {
                        self.show_plan_from_vehicle();
                    }
                }
                TransportEvent::RemoveAllComplete { error } => {
                    self.events.push(FenceEvent::RemoveAllComplete { error });
                    if !error {
                        self.show_plan_from_vehicle();
                    }
                }
                TransportEvent::InProgressChanged(in_progress) => {
                    self.events.push(FenceEvent::SyncInProgressChanged(in_progress));
                }
                TransportEvent::PeerConnected(info) => {
                    self.capability.set_active_peer(Some(info.into()));
                }
                TransportEvent::CapabilityBitsChanged(bits) => self.capability.report_capability_bits(bits),
                TransportEvent::ProtocolVersionChanged(version) => self.capability.report_protocol_version(version),
                TransportEvent::ParameterChanged { name, value } => self.capability.set_parameter(&name, value),
            }
        }
    }

    /// Take all pending notifications: document first, then capability,
    /// then sync.
    pub fn poll_events(&mut self) -> Vec<FenceEvent> {
        let mut events = self.document.drain_events();
        events.extend(self.capability.drain_events());
        events.extend(self.events.drain());
        events
    }

    fn load_complete(&mut self) {
        let live = self.session.mode == OperatingMode::Live;
        if live || self.items_requested || self.document.is_empty() {
            let fence = FenceSnapshot {
                breach_return: self.transport.breach_return_point(),
                polygons: self.transport.polygons().to_vec(),
                circles: self.transport.circles().to_vec(),
            };
            self.document.reconcile(fence);
            self.events.push(FenceEvent::LoadComplete);
        } else {
            log::debug!("Keeping local edits over unsolicited vehicle fence");
        }
        self.items_requested = false;
    }

    fn rejected(&self, operation: &str) -> bool {
        if self.session.offline {
            log::warn!("{} called while offline", operation);
            true
        } else if self.transport.in_progress() {
            log::warn!("{} called while sync in progress", operation);
            true
        } else {
            false
        }
    }
}
