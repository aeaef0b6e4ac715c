//! Onboard state of one simulated vehicle.

use fencesync_core::capability::{LEGACY_FENCE_RADIUS_PARAM, MISSION_FENCE, PeerInfo};
use fencesync_core::protocol::{LinkRequest, LinkResponse};
use fencesync_core::schema::{self, Decoded, FenceSnapshot};
use serde_json::Value;
use std::collections::BTreeMap;

/// Protocol version announced before the ground asks for the real one.
pub const INITIAL_PROTOCOL_VERSION: u32 = 100;

/// What every simulated vehicle is created with.
#[derive(Debug, Clone)]
pub struct VehicleOptions {
    pub capability_bits: u64,
    pub max_protocol_version: u32,
    pub parameters: BTreeMap<String, f64>,
}

impl Default for VehicleOptions {
    fn default() -> Self {
        Self {
            capability_bits: MISSION_FENCE,
            max_protocol_version: 200,
            parameters: BTreeMap::new(),
        }
    }
}

impl VehicleOptions {
    /// Also expose the single-radius fence parameter.
    pub fn with_fence_radius(mut self, radius: f64) -> Self {
        self.parameters.insert(LEGACY_FENCE_RADIUS_PARAM.to_string(), radius);
        self
    }
}

/// Reply to a request, split by audience.
#[derive(Debug, Default, PartialEq)]
pub struct Reply {
    /// Sent to the requesting link only, in order.
    pub direct: Vec<LinkResponse>,
    /// Sent to every link attached to the vehicle.
    pub broadcast: Option<LinkResponse>,
}

impl Reply {
    fn direct(response: LinkResponse) -> Self {
        Self {
            direct: vec![response],
            broadcast: None,
        }
    }
}

/// A vehicle with onboard fence storage and a parameter set.
#[derive(Debug, Clone)]
pub struct Vehicle {
    id: String,
    fence: Value,
    capability_bits: u64,
    max_protocol_version: u32,
    parameters: BTreeMap<String, f64>,
}

impl Vehicle {
    pub fn new(id: &str, options: &VehicleOptions) -> Self {
        Self {
            id: id.to_string(),
            fence: schema::encode(&FenceSnapshot::default()),
            capability_bits: options.capability_bits,
            max_protocol_version: options.max_protocol_version,
            parameters: options.parameters.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stored fence, in wire form.
    pub fn fence(&self) -> &Value {
        &self.fence
    }

    fn supports_fence(&self) -> bool {
        self.capability_bits & MISSION_FENCE != 0
    }

    /// Greeting sent when a link attaches.
    pub fn hello(&self) -> LinkResponse {
        LinkResponse::Hello {
            peer: PeerInfo {
                vehicle_id: self.id.clone(),
                capability_bits: self.capability_bits,
                max_protocol_version: INITIAL_PROTOCOL_VERSION.min(self.max_protocol_version),
                parameters: self.parameters.clone(),
            },
        }
    }

    pub fn handle(&mut self, request: LinkRequest) -> Reply {
        match request {
            // Capabilities are re-reported with the real protocol version.
            LinkRequest::RequestProtocolVersion => Reply {
                direct: vec![
                    LinkResponse::ProtocolVersion {
                        max_protocol_version: self.max_protocol_version,
                    },
                    LinkResponse::CapabilityBits {
                        capability_bits: self.capability_bits,
                    },
                ],
                broadcast: None,
            },
            LinkRequest::Load => Reply::direct(LinkResponse::Fence {
                fence: self.fence.clone(),
            }),
            LinkRequest::Send { fence } => Reply::direct(LinkResponse::SendAck {
                error: self.store(&fence).err(),
            }),
            LinkRequest::RemoveAll => {
                self.fence = schema::encode(&FenceSnapshot::default());
                Reply::direct(LinkResponse::RemoveAllAck { error: None })
            }
            LinkRequest::SetParameter { name, value } => {
                self.parameters.insert(name.clone(), value);
                Reply {
                    direct: Vec::new(),
                    broadcast: Some(LinkResponse::ParameterChanged { name, value }),
                }
            }
        }
    }

    /// Validate and keep a sent fence. The stored copy is re-encoded so
    /// loads always return the current schema version.
    fn store(&mut self, fence: &Value) -> Result<(), String> {
        if !self.supports_fence() {
            return Err("Vehicle does not support fence shapes".to_string());
        }
        let snapshot = match schema::decode(fence).map_err(|e| e.to_string())? {
            Decoded::Fence(snapshot) => snapshot,
            Decoded::Legacy => FenceSnapshot::default(),
        };
        self.fence = schema::encode(&snapshot);
        Ok(())
    }
}
