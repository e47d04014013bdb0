//! Node identity readiness signal
//!
//! The substrate assigns the node its identity asynchronously (through the
//! `init` message). Background workers that depend on it wait on
//! [`NodeIdentity::ready`] instead of polling.

use crate::identifiers::NodeId;
use std::sync::Arc;
use tokio::sync::watch;

/// This node's identity and the fixed cluster membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Identity of the local node
    pub node_id: NodeId,
    /// Every cluster member, including the local node
    pub node_ids: Vec<NodeId>,
}

impl Membership {
    /// Create a membership record
    pub fn new(node_id: NodeId, node_ids: Vec<NodeId>) -> Self {
        Self { node_id, node_ids }
    }

    /// All members except the given one
    pub fn others(&self, exclude: &NodeId) -> impl Iterator<Item = &NodeId> + '_ {
        let exclude = exclude.clone();
        self.node_ids.iter().filter(move |id| **id != exclude)
    }

    /// Whether the local node carries the given id
    pub fn is(&self, id: &NodeId) -> bool {
        self.node_id == *id
    }
}

/// One-shot readiness signal carrying the node's [`Membership`].
///
/// Cloning shares the underlying signal.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    tx: Arc<watch::Sender<Option<Arc<Membership>>>>,
}

impl NodeIdentity {
    /// Create an identity that is not yet known
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Create an identity that is already known
    pub fn ready_with(membership: Membership) -> Self {
        let identity = Self::new();
        identity.set(membership);
        identity
    }

    /// Publish the membership, waking every waiter.
    ///
    /// Returns `false` if an identity had already been published; the new
    /// value replaces it.
    pub fn set(&self, membership: Membership) -> bool {
        let previous = self.tx.send_replace(Some(Arc::new(membership)));
        if let Some(previous) = &previous {
            tracing::warn!(previous = %previous.node_id, "Node identity re-initialized");
        }
        previous.is_none()
    }

    /// Current membership, if published
    pub fn get(&self) -> Option<Arc<Membership>> {
        self.tx.borrow().clone()
    }

    /// Local node id, if published
    pub fn node_id(&self) -> Option<NodeId> {
        self.get().map(|m| m.node_id.clone())
    }

    /// Wait until the membership is published
    pub async fn ready(&self) -> Arc<Membership> {
        let mut rx = self.tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(membership) = current {
                return membership;
            }
            // The sender lives in `self`, so the channel cannot close while we wait.
            if rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn membership(id: &str) -> Membership {
        Membership::new(id.into(), vec!["n0".into(), "n1".into(), "n2".into()])
    }

    #[tokio::test]
    async fn ready_resolves_after_set() {
        let identity = NodeIdentity::new();
        assert!(identity.get().is_none());

        let waiter = {
            let identity = identity.clone();
            tokio::spawn(async move { identity.ready().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        assert!(identity.set(membership("n1")));
        let resolved = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.node_id, NodeId::from("n1"));
    }

    #[tokio::test]
    async fn ready_returns_immediately_when_known() {
        let identity = NodeIdentity::ready_with(membership("n2"));
        let resolved = tokio::time::timeout(Duration::from_millis(50), identity.ready())
            .await
            .unwrap();
        assert_eq!(identity.node_id(), Some(NodeId::from("n2")));
        assert_eq!(resolved.node_ids.len(), 3);
    }

    #[test]
    fn second_set_reports_reinitialization() {
        let identity = NodeIdentity::new();
        assert!(identity.set(membership("n0")));
        assert!(!identity.set(membership("n1")));
        assert_eq!(identity.node_id(), Some(NodeId::from("n1")));
    }

    #[test]
    fn others_excludes_given_member() {
        let m = membership("n0");
        let others: Vec<_> = m.others(&"n0".into()).cloned().collect();
        assert_eq!(others, vec![NodeId::from("n1"), NodeId::from("n2")]);
    }
}
