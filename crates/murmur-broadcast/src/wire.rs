//! Wire bodies for the broadcast protocol.

use crate::topology::Topology;
use murmur_core::messages::{ok_body, TYPE_FIELD};
use murmur_core::{Envelope, MessageValue, MurmurError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const BROADCAST: &str = "broadcast";
pub const BROADCAST_OK: &str = "broadcast_ok";
pub const READ: &str = "read";
pub const READ_OK: &str = "read_ok";
pub const TOPOLOGY: &str = "topology";
pub const TOPOLOGY_OK: &str = "topology_ok";

/// Raw `broadcast` body as it arrives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastRequest {
    /// Single value from a client or a forwarding peer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageValue>,
    /// Batched values from the leader
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<MessageValue>>,
}

/// What a `broadcast` request carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastPayload {
    /// One value
    Single(MessageValue),
    /// A leader batch; flows leader → followers only
    Batch(Vec<MessageValue>),
}

impl BroadcastPayload {
    /// Decode the payload of a `broadcast` envelope
    pub fn decode(envelope: &Envelope) -> Result<Self> {
        envelope.decode_body::<BroadcastRequest>()?.try_into()
    }

    /// Render as a `broadcast` request body
    pub fn to_body(&self) -> Value {
        match self {
            BroadcastPayload::Single(value) => json!({ TYPE_FIELD: BROADCAST, "message": value }),
            BroadcastPayload::Batch(values) => {
                json!({ TYPE_FIELD: BROADCAST, "messages": values })
            }
        }
    }
}

impl TryFrom<BroadcastRequest> for BroadcastPayload {
    type Error = MurmurError;

    fn try_from(request: BroadcastRequest) -> Result<Self> {
        match (request.message, request.messages) {
            (Some(value), _) => Ok(BroadcastPayload::Single(value)),
            (None, Some(values)) => Ok(BroadcastPayload::Batch(values)),
            (None, None) => Err(MurmurError::malformed(
                "broadcast carries neither `message` nor `messages`",
            )),
        }
    }
}

/// `topology` request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyRequest {
    /// Adjacency for the whole cluster
    pub topology: Topology,
}

/// `read_ok` reply body
pub fn read_ok(messages: &[MessageValue]) -> Value {
    json!({ TYPE_FIELD: READ_OK, "messages": messages })
}

pub fn broadcast_ok() -> Value {
    ok_body(BROADCAST_OK)
}

pub fn topology_ok() -> Value {
    ok_body(TOPOLOGY_OK)
}
