//! In-memory messaging substrate
//!
//! [`SimNetwork`] routes envelopes between [`SimEndpoint`]s inside one
//! process. Links between cluster members can be severed and healed; an
//! envelope crossing a severed link is dropped silently, so requests on it
//! time out exactly as they would over a lossy network. Clients are never
//! partitioned.

use async_trait::async_trait;
use murmur_core::messages::with_ids;
use murmur_core::{
    dispatch_or_reply, Envelope, ErrorBody, ErrorCode, HandlerRegistry, Membership,
    NetworkEffects, NetworkError, NodeId, NodeIdentity, PendingReplies, ShutdownReport,
    TaskRegistry,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Key for per-link message counters: (src, dest, message type)
type LinkKey = (NodeId, NodeId, String);

#[derive(Default)]
struct Counters {
    delivered: HashMap<LinkKey, u64>,
    dropped: HashMap<LinkKey, u64>,
}

/// Shared hub connecting every endpoint of a simulated cluster
#[derive(Default)]
pub struct SimNetwork {
    endpoints: RwLock<HashMap<NodeId, Arc<SimEndpoint>>>,
    registries: RwLock<HashMap<NodeId, HandlerRegistry>>,
    severed: RwLock<HashSet<(NodeId, NodeId)>>,
    counters: Mutex<Counters>,
    clients: PendingReplies,
    deliveries: TaskRegistry,
}

impl SimNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create the endpoint for `node_id`. Its identity stays unset until [`SimEndpoint::init`].
    pub fn add_endpoint(self: &Arc<Self>, node_id: NodeId) -> Arc<SimEndpoint> {
        let endpoint = Arc::new(SimEndpoint {
            node_id: node_id.clone(),
            identity: NodeIdentity::new(),
            pending: PendingReplies::new(),
            network: Arc::downgrade(self),
        });
        self.endpoints.write().insert(node_id, endpoint.clone());
        endpoint
    }

    /// Route inbound requests for `node_id` to `registry`
    pub fn register_handlers(&self, node_id: NodeId, registry: HandlerRegistry) {
        self.registries.write().insert(node_id, registry);
    }

    fn is_member(&self, id: &NodeId) -> bool {
        self.endpoints.read().contains_key(id)
    }

    fn link_key(a: &NodeId, b: &NodeId) -> (NodeId, NodeId) {
        if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        }
    }

    /// Drop everything exchanged between `a` and `b` until healed
    pub fn sever(&self, a: &NodeId, b: &NodeId) {
        self.severed.write().insert(Self::link_key(a, b));
    }

    pub fn heal(&self, a: &NodeId, b: &NodeId) {
        self.severed.write().remove(&Self::link_key(a, b));
    }

    /// Sever every link between `node` and the other members
    pub fn isolate(&self, node: &NodeId) {
        let others: Vec<NodeId> = self
            .endpoints
            .read()
            .keys()
            .filter(|id| *id != node)
            .cloned()
            .collect();
        let mut severed = self.severed.write();
        for other in others {
            severed.insert(Self::link_key(node, &other));
        }
    }

    /// Heal every link touching `node`
    pub fn rejoin(&self, node: &NodeId) {
        self.severed.write().retain(|(a, b)| a != node && b != node);
    }

    pub fn link_up(&self, a: &NodeId, b: &NodeId) -> bool {
        !self.severed.read().contains(&Self::link_key(a, b))
    }

    /// Messages of `msg_type` delivered anywhere
    pub fn delivered(&self, msg_type: &str) -> u64 {
        Self::sum(&self.counters.lock().delivered, msg_type)
    }

    /// Messages of `msg_type` delivered from `src` to `dest`
    pub fn delivered_between(&self, src: &NodeId, dest: &NodeId, msg_type: &str) -> u64 {
        let key = (src.clone(), dest.clone(), msg_type.to_string());
        self.counters.lock().delivered.get(&key).copied().unwrap_or(0)
    }

    /// Messages of `msg_type` lost to severed links
    pub fn dropped(&self, msg_type: &str) -> u64 {
        Self::sum(&self.counters.lock().dropped, msg_type)
    }

    pub fn dropped_between(&self, src: &NodeId, dest: &NodeId, msg_type: &str) -> u64 {
        let key = (src.clone(), dest.clone(), msg_type.to_string());
        self.counters.lock().dropped.get(&key).copied().unwrap_or(0)
    }

    fn sum(counts: &HashMap<LinkKey, u64>, msg_type: &str) -> u64 {
        counts
            .iter()
            .filter(|((_, _, t), _)| t == msg_type)
            .map(|(_, n)| n)
            .sum()
    }

    fn count(&self, envelope: &Envelope, delivered: bool) {
        let key = (
            envelope.src.clone(),
            envelope.dest.clone(),
            envelope.msg_type().unwrap_or("?").to_string(),
        );
        let mut counters = self.counters.lock();
        let map = if delivered {
            &mut counters.delivered
        } else {
            &mut counters.dropped
        };
        *map.entry(key).or_default() += 1;
    }

    /// Issue a request from an external client and wait for its reply
    pub async fn client_request(
        self: &Arc<Self>,
        client: &NodeId,
        node: &NodeId,
        body: Value,
        timeout: Duration,
    ) -> Result<Value, NetworkError> {
        let (id, rx) = self.clients.register();
        self.route(Envelope::new(client.clone(), node.clone(), with_ids(body, Some(id), None)));
        self.clients.wait(node, id, rx, timeout).await
    }

    fn route(self: &Arc<Self>, envelope: Envelope) {
        let both_members = self.is_member(&envelope.src) && self.is_member(&envelope.dest);
        if both_members && !self.link_up(&envelope.src, &envelope.dest) {
            tracing::trace!(src = %envelope.src, dest = %envelope.dest, "Dropped on severed link");
            self.count(&envelope, false);
            return;
        }

        if envelope.dest.is_client() {
            self.count(&envelope, true);
            if let Some(in_reply_to) = envelope.in_reply_to() {
                self.clients.resolve(in_reply_to, envelope.body);
            }
            return;
        }

        let endpoint = self.endpoints.read().get(&envelope.dest).cloned();
        let Some(endpoint) = endpoint else {
            self.reject_unknown(envelope);
            return;
        };
        self.count(&envelope, true);

        if let Some(in_reply_to) = envelope.in_reply_to() {
            endpoint.pending.resolve(in_reply_to, envelope.body);
            return;
        }

        let registry = self.registries.read().get(&envelope.dest).cloned().unwrap_or_default();
        self.deliveries.spawn(async move {
            dispatch_or_reply(&registry, endpoint.as_ref(), &envelope).await;
        });
    }

    fn reject_unknown(self: &Arc<Self>, envelope: Envelope) {
        tracing::debug!(dest = %envelope.dest, "No such node");
        let Some(msg_id) = envelope.msg_id() else {
            return;
        };
        let error = ErrorBody::new(ErrorCode::NodeNotFound, format!("node {} does not exist", envelope.dest));
        self.route(Envelope::new(
            envelope.dest,
            envelope.src,
            with_ids(error.to_body(), None, Some(msg_id)),
        ));
    }

    /// Stop routing, draining in-flight handler invocations for `grace`
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.deliveries.shutdown(grace).await
    }
}

/// One node's attachment to a [`SimNetwork`]
pub struct SimEndpoint {
    node_id: NodeId,
    identity: NodeIdentity,
    pending: PendingReplies,
    network: Weak<SimNetwork>,
}

impl SimEndpoint {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Publish this node's identity, as the `init` message would
    pub fn init(&self, node_ids: Vec<NodeId>) {
        self.identity.set(Membership::new(self.node_id.clone(), node_ids));
    }

    /// RPCs still waiting for a reply
    pub fn outstanding(&self) -> usize {
        self.pending.outstanding()
    }

    fn network(&self) -> Result<Arc<SimNetwork>, NetworkError> {
        self.network.upgrade().ok_or(NetworkError::Closed)
    }
}

#[async_trait]
impl NetworkEffects for SimEndpoint {
    fn identity(&self) -> NodeIdentity {
        self.identity.clone()
    }

    async fn send(&self, dest: &NodeId, body: Value) -> Result<(), NetworkError> {
        self.network()?
            .route(Envelope::new(self.node_id.clone(), dest.clone(), body));
        Ok(())
    }

    async fn rpc(
        &self,
        dest: &NodeId,
        body: Value,
        timeout: Duration,
    ) -> Result<Value, NetworkError> {
        let network = self.network()?;
        let (id, rx) = self.pending.register();
        network.route(Envelope::new(
            self.node_id.clone(),
            dest.clone(),
            with_ids(body, Some(id), None),
        ));
        self.pending.wait(dest, id, rx, timeout).await
    }

    async fn reply(&self, request: &Envelope, body: Value) -> Result<(), NetworkError> {
        let Some(msg_id) = request.msg_id() else {
            return Ok(());
        };
        let body = with_ids(body, Some(self.pending.next_msg_id()), Some(msg_id));
        self.network()?
            .route(Envelope::new(self.node_id.clone(), request.src.clone(), body));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_core::{MessageHandler, MurmurError};
    use serde_json::json;

    struct Echo {
        endpoint: Arc<SimEndpoint>,
    }

    #[async_trait]
    impl MessageHandler for Echo {
        async fn handle(&self, request: &Envelope) -> murmur_core::Result<()> {
            if request.body.get("boom").is_some() {
                return Err(MurmurError::invalid("boom"));
            }
            self.endpoint.reply(request, json!({"type": "echo_ok"})).await?;
            Ok(())
        }
    }

    fn two_nodes() -> (Arc<SimNetwork>, Arc<SimEndpoint>, Arc<SimEndpoint>) {
        let network = SimNetwork::new();
        let a = network.add_endpoint("n0".into());
        let b = network.add_endpoint("n1".into());
        for endpoint in [&a, &b] {
            let mut registry = HandlerRegistry::new();
            registry.register("echo", Arc::new(Echo { endpoint: endpoint.clone() }));
            network.register_handlers(endpoint.node_id().clone(), registry);
        }
        (network, a, b)
    }

    #[tokio::test]
    async fn rpc_round_trip_counts_both_directions() {
        let (network, a, b) = two_nodes();

        let reply = a
            .rpc(b.node_id(), json!({"type": "echo"}), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(reply["type"], "echo_ok");
        assert_eq!(network.delivered_between(a.node_id(), b.node_id(), "echo"), 1);
        assert_eq!(network.delivered("echo_ok"), 1);
        assert_eq!(a.outstanding(), 0);
    }

    #[tokio::test]
    async fn severed_links_drop_requests_until_healed() {
        let (network, a, b) = two_nodes();
        network.sever(a.node_id(), b.node_id());

        let err = a
            .rpc(b.node_id(), json!({"type": "echo"}), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::OperationTimeout { .. }));
        assert_eq!(network.dropped("echo"), 1);

        network.heal(b.node_id(), a.node_id());
        assert!(a
            .rpc(b.node_id(), json!({"type": "echo"}), Duration::from_secs(1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn handler_errors_come_back_as_remote_errors() {
        let (_network, a, b) = two_nodes();
        let err = a
            .rpc(b.node_id(), json!({"type": "echo", "boom": true}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Remote { code: ErrorCode::Abort, .. }));
    }

    #[tokio::test]
    async fn unknown_destinations_are_rejected() {
        let (_network, a, _b) = two_nodes();
        let err = a
            .rpc(&"n9".into(), json!({"type": "echo"}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NetworkError::Remote { code: ErrorCode::NodeNotFound, .. }));
    }

    #[tokio::test]
    async fn clients_bypass_partitions() {
        let (network, a, b) = two_nodes();
        network.isolate(b.node_id());
        assert!(!network.link_up(a.node_id(), b.node_id()));

        let reply = network
            .client_request(&"c1".into(), b.node_id(), json!({"type": "echo"}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply["in_reply_to"], 1);

        network.rejoin(b.node_id());
        assert!(network.link_up(a.node_id(), b.node_id()));
    }
}
