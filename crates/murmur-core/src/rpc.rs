//! Request/reply correlation shared by runtime implementations.
//!
//! Outbound requests get a node-local `msg_id`; the matching reply carries it
//! back as `in_reply_to`. [`PendingReplies`] hands out ids and routes replies
//! to whoever is waiting on them.

use crate::effects::NetworkError;
use crate::identifiers::NodeId;
use crate::messages::ErrorBody;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

/// Outstanding requests waiting for a reply
#[derive(Debug, Default)]
pub struct PendingReplies {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
}

impl PendingReplies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh message id (ids start at 1)
    pub fn next_msg_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Allocate an id and register interest in its reply
    pub fn register(&self) -> (u64, oneshot::Receiver<Value>) {
        let id = self.next_msg_id();
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().insert(id, tx);
        (id, rx)
    }

    /// Deliver a reply. Returns `false` if nobody is waiting for `in_reply_to`.
    pub fn resolve(&self, in_reply_to: u64, body: Value) -> bool {
        let Some(tx) = self.waiting.lock().remove(&in_reply_to) else {
            return false;
        };
        tx.send(body).is_ok()
    }

    /// Stop waiting for a reply
    pub fn forget(&self, id: u64) {
        self.waiting.lock().remove(&id);
    }

    /// Number of requests still waiting
    pub fn outstanding(&self) -> usize {
        self.waiting.lock().len()
    }

    /// Wait for the reply to request `id` from `peer`, bounded by `timeout`.
    ///
    /// `error` replies are surfaced as [`NetworkError::Remote`].
    pub async fn wait(
        &self,
        peer: &NodeId,
        id: u64,
        rx: oneshot::Receiver<Value>,
        timeout: Duration,
    ) -> Result<Value, NetworkError> {
        let body = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(body)) => body,
            Ok(Err(_)) => {
                self.forget(id);
                return Err(NetworkError::Closed);
            }
            Err(_) => {
                self.forget(id);
                return Err(NetworkError::rpc_timeout(peer, timeout));
            }
        };

        match ErrorBody::from_body(&body) {
            Some(error) => Err(NetworkError::Remote {
                peer: peer.clone(),
                code: error.code,
                text: error.text,
            }),
            None => Ok(body),
        }
    }
}
