//! Messages exchanged with a vehicle over the websocket link.
//!
//! All messages are JSON text frames tagged by `type`. Fence payloads use
//! the document schema from [`crate::schema`].

use crate::capability::PeerInfo;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent to the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkRequest {
    /// Ask for the highest protocol version the vehicle speaks.
    RequestProtocolVersion,
    /// Read the onboard fence.
    Load,
    /// Replace the onboard fence.
    Send { fence: Value },
    /// Clear the onboard fence.
    RemoveAll,
    /// Write a parameter.
    SetParameter { name: String, value: f64 },
}

/// Messages received from the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkResponse {
    /// First message after connecting.
    Hello {
        #[serde(flatten)]
        peer: PeerInfo,
    },
    ProtocolVersion { max_protocol_version: u32 },
    CapabilityBits { capability_bits: u64 },
    /// Reply to `Load`.
    Fence { fence: Value },
    SendAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    RemoveAllAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ParameterChanged { name: String, value: f64 },
    /// The request could not be understood.
    Error { message: String },
}
