//! Recording network used by unit tests in this crate.

use async_trait::async_trait;
use murmur_core::{Envelope, Membership, NetworkEffects, NetworkError, NodeId, NodeIdentity};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub(crate) struct RpcCall {
    pub dest: NodeId,
    pub body: Value,
    pub at: Instant,
}

/// Answers every RPC with `broadcast_ok` unless told to fail
pub(crate) struct MockNetwork {
    identity: NodeIdentity,
    failing: AtomicBool,
    pub rpcs: Mutex<Vec<RpcCall>>,
    pub replies: Mutex<Vec<(NodeId, Value)>>,
}

impl MockNetwork {
    pub fn new(node_id: &str, node_ids: &[&str]) -> Self {
        let membership = Membership::new(
            node_id.into(),
            node_ids.iter().map(|id| NodeId::from(*id)).collect(),
        );
        Self {
            identity: NodeIdentity::ready_with(membership),
            failing: AtomicBool::new(false),
            rpcs: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
        }
    }

    /// Network whose identity has not been published yet
    pub fn uninitialized() -> Self {
        Self {
            identity: NodeIdentity::new(),
            failing: AtomicBool::new(false),
            rpcs: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_rpcs(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn rpc_dests(&self) -> Vec<NodeId> {
        let mut dests: Vec<_> = self.rpcs.lock().iter().map(|c| c.dest.clone()).collect();
        dests.sort();
        dests
    }

    pub fn rpc_count(&self) -> usize {
        self.rpcs.lock().len()
    }
}

#[async_trait]
impl NetworkEffects for MockNetwork {
    fn identity(&self) -> NodeIdentity {
        self.identity.clone()
    }

    async fn send(&self, _dest: &NodeId, _body: Value) -> Result<(), NetworkError> {
        Ok(())
    }

    async fn rpc(
        &self,
        dest: &NodeId,
        body: Value,
        _timeout: Duration,
    ) -> Result<Value, NetworkError> {
        self.rpcs.lock().push(RpcCall {
            dest: dest.clone(),
            body,
            at: Instant::now(),
        });
        if self.failing.load(Ordering::SeqCst) {
            return Err(NetworkError::PeerUnreachable { peer: dest.clone() });
        }
        Ok(json!({"type": "broadcast_ok"}))
    }

    async fn reply(&self, request: &Envelope, body: Value) -> Result<(), NetworkError> {
        self.replies.lock().push((request.src.clone(), body));
        Ok(())
    }
}
