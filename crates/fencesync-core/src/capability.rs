//! Vehicle capability detection and the legacy circular fence parameter.

use crate::events::{EventQueue, FenceEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capability bit advertising mission-protocol fence support.
pub const MISSION_FENCE: u64 = 1 << 4;

/// Protocol versions are reported as `major * 100`.
pub const MIN_PROTOCOL_VERSION: u32 = 200;

/// Single-radius fence parameter understood by peers without shape support.
pub const LEGACY_FENCE_RADIUS_PARAM: &str = "GF_MAX_HOR_DIST";

/// Identity and capabilities announced by a vehicle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub vehicle_id: String,
    pub capability_bits: u64,
    pub max_protocol_version: u32,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

/// Handle for a parameter change subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Parameter values of one vehicle, with change subscriptions.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    values: BTreeMap<String, f64>,
    subscriptions: BTreeMap<SubscriptionId, String>,
    next_id: u64,
    notifications: Vec<SubscriptionId>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: BTreeMap<String, f64>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Set a value, notifying subscribers of `name` if it changed.
    pub fn set(&mut self, name: &str, value: f64) {
        if self.values.get(name) == Some(&value) {
            return;
        }
        self.values.insert(name.to_string(), value);
        for (id, subscribed) in &self.subscriptions {
            if subscribed == name {
                self.notifications.push(*id);
            }
        }
    }

    pub fn subscribe(&mut self, name: &str) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.insert(id, name.to_string());
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.notifications.retain(|pending| *pending != id);
        self.subscriptions.remove(&id).is_some()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Take pending change notifications.
    pub fn drain_notifications(&mut self) -> Vec<SubscriptionId> {
        std::mem::take(&mut self.notifications)
    }
}

/// A vehicle as seen by the capability gate.
#[derive(Debug, Clone, Default)]
pub struct VehiclePeer {
    pub capability_bits: u64,
    pub max_protocol_version: u32,
    /// Planning-only stand-in vehicle with no real link.
    pub offline_editing: bool,
    pub parameters: ParameterStore,
}

impl VehiclePeer {
    pub fn new(capability_bits: u64, max_protocol_version: u32) -> Self {
        Self {
            capability_bits,
            max_protocol_version,
            offline_editing: false,
            parameters: ParameterStore::new(),
        }
    }

    /// Stand-in vehicle used while planning offline.
    pub fn offline_editing() -> Self {
        Self {
            offline_editing: true,
            ..Self::default()
        }
    }
}

impl From<PeerInfo> for VehiclePeer {
    fn from(info: PeerInfo) -> Self {
        Self {
            capability_bits: info.capability_bits,
            max_protocol_version: info.max_protocol_version,
            offline_editing: false,
            parameters: ParameterStore::from_values(info.parameters),
        }
    }
}

/// Decides whether the active vehicle supports fence shapes, and exposes
/// the legacy single-radius fence for vehicles that don't.
///
/// Capability bits and protocol version arrive asynchronously, so
/// `supported()` is computed on every call and every report queues a
/// `SupportedChanged` event.
#[derive(Debug, Default)]
pub struct CapabilityGate {
    peer: Option<VehiclePeer>,
    radius_subscription: Option<SubscriptionId>,
    events: EventQueue,
}

impl CapabilityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer(&self) -> Option<&VehiclePeer> {
        self.peer.as_ref()
    }

    /// Switch the active vehicle, returning the previous one.
    ///
    /// The old parameter subscription is dropped and a new one made.
    /// `LegacyFenceRadiusChanged` and `SupportedChanged` are always queued.
    pub fn set_active_peer(&mut self, peer: Option<VehiclePeer>) -> Option<VehiclePeer> {
        self.drop_subscription();
        let previous = std::mem::replace(&mut self.peer, peer);
        if self.peer.is_none() {
            log::warn!("Capability gate has no active vehicle");
        }
        self.parameters_ready();
        let supported = self.supported();
        self.events.push(FenceEvent::SupportedChanged(supported));
        previous
    }

    /// Re-subscribe to the legacy radius parameter after the vehicle's
    /// parameter set changed.
    pub fn parameters_ready(&mut self) {
        self.drop_subscription();
        if let Some(peer) = self.peer.as_mut() {
            if !peer.offline_editing && peer.parameters.exists(LEGACY_FENCE_RADIUS_PARAM) {
                self.radius_subscription = Some(peer.parameters.subscribe(LEGACY_FENCE_RADIUS_PARAM));
            }
        }
        let radius = self.legacy_fence_radius();
        self.events.push(FenceEvent::LegacyFenceRadiusChanged(radius));
    }

    /// Mission fence capability bit set and protocol version at least 2.
    pub fn supported(&self) -> bool {
        self.peer.as_ref().is_some_and(|peer| {
            peer.capability_bits & MISSION_FENCE != 0 && peer.max_protocol_version >= MIN_PROTOCOL_VERSION
        })
    }

    /// Value of the legacy radius parameter, 0 when unavailable.
    pub fn legacy_fence_radius(&self) -> f64 {
        match self.peer.as_ref() {
            Some(peer) if !peer.offline_editing => {
                peer.parameters.get(LEGACY_FENCE_RADIUS_PARAM).unwrap_or(0.0)
            }
            _ => 0.0,
        }
    }

    pub fn report_capability_bits(&mut self, capability_bits: u64) {
        if let Some(peer) = self.peer.as_mut() {
            peer.capability_bits = capability_bits;
        }
        let supported = self.supported();
        self.events.push(FenceEvent::SupportedChanged(supported));
    }

    pub fn report_protocol_version(&mut self, max_protocol_version: u32) {
        if let Some(peer) = self.peer.as_mut() {
            peer.max_protocol_version = max_protocol_version;
        }
        let supported = self.supported();
        self.events.push(FenceEvent::SupportedChanged(supported));
    }

    /// Record a parameter value reported by the active vehicle.
    pub fn set_parameter(&mut self, name: &str, value: f64) {
        let Some(peer) = self.peer.as_mut() else {
            log::debug!("Dropping parameter {} with no active vehicle", name);
            return;
        };
        let appeared = !peer.parameters.exists(name);
        peer.parameters.set(name, value);
        if appeared && name == LEGACY_FENCE_RADIUS_PARAM {
            self.parameters_ready();
        }
    }

    /// Take queued notifications, including subscribed parameter changes.
    pub fn drain_events(&mut self) -> Vec<FenceEvent> {
        if let Some(peer) = self.peer.as_mut() {
            let changed = peer
                .parameters
                .drain_notifications()
                .into_iter()
                .any(|id| Some(id) == self.radius_subscription);
            if changed {
                let radius = self.legacy_fence_radius();
                self.events.push(FenceEvent::LegacyFenceRadiusChanged(radius));
            }
        }
        self.events.drain()
    }

    fn drop_subscription(&mut self) {
        if let Some(id) = self.radius_subscription.take() {
            if let Some(peer) = self.peer.as_mut() {
                peer.parameters.unsubscribe(id);
            }
        }
    }
}
