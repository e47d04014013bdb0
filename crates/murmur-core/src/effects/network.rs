//! Network effects trait definitions
//!
//! This is the contract the dissemination core consumes from the messaging
//! substrate. Implementations live outside the core: the stdio runtime in
//! `murmur-node` and the in-memory cluster in `murmur-testkit`.

use crate::errors::ErrorCode;
use crate::identifiers::NodeId;
use crate::identity::NodeIdentity;
use crate::messages::Envelope;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Network operation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetworkError {
    /// Failed to hand the message to the substrate
    #[error("Failed to send message to {peer}: {reason}")]
    SendFailed {
        /// Destination of the failed send
        peer: NodeId,
        /// Reason for the failure
        reason: String,
    },
    /// No reply arrived in time
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    OperationTimeout {
        /// The operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },
    /// Destination is not reachable
    #[error("Peer unreachable: {peer}")]
    PeerUnreachable {
        /// Identifier of the unreachable peer
        peer: NodeId,
    },
    /// The remote node answered with an `error` body
    #[error("Remote error {code:?} from {peer}: {text}")]
    Remote {
        /// Node that produced the error
        peer: NodeId,
        /// Protocol error code
        code: ErrorCode,
        /// Error text supplied by the remote handler
        text: String,
    },
    /// The local node cannot address anyone yet
    #[error("Node identity not initialized")]
    NotInitialized,
    /// The substrate connection is gone
    #[error("Network closed")]
    Closed,
    /// Serialization failed while preparing a network payload
    #[error("Serialization failed: {error}")]
    SerializationFailed {
        /// Serialization error message
        error: String,
    },
}

impl NetworkError {
    /// Build a timeout error for an RPC to `peer`
    pub fn rpc_timeout(peer: &NodeId, timeout: Duration) -> Self {
        Self::OperationTimeout {
            operation: format!("rpc to {peer}"),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Messaging substrate operations used by the dissemination core
#[async_trait]
pub trait NetworkEffects: Send + Sync {
    /// Identity and membership readiness signal for the local node
    fn identity(&self) -> NodeIdentity;

    /// Fire-and-forget send
    async fn send(&self, dest: &NodeId, body: Value) -> Result<(), NetworkError>;

    /// Send a request and wait at most `timeout` for the reply body.
    ///
    /// A reply of type `error` is reported as [`NetworkError::Remote`].
    async fn rpc(&self, dest: &NodeId, body: Value, timeout: Duration)
        -> Result<Value, NetworkError>;

    /// Answer a specific inbound request
    async fn reply(&self, request: &Envelope, body: Value) -> Result<(), NetworkError>;
}
