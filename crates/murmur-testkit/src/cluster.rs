//! Whole-cluster harness built on [`SimNetwork`].

use crate::network::{SimEndpoint, SimNetwork};
use murmur_broadcast::{BroadcastNode, Topology};
use murmur_core::{MessageValue, NetworkError, NodeConfig, NodeId, ShutdownReport};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied to client requests
const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);
/// Interval between predicate checks in [`SimulatedCluster::wait_until`]
const POLL_INTERVAL: Duration = Duration::from_millis(5);

struct SimNode {
    endpoint: Arc<SimEndpoint>,
    node: BroadcastNode,
}

/// A running cluster of [`BroadcastNode`]s talking over an in-memory network.
///
/// All nodes share one [`NodeConfig`]. Client traffic comes from `c1` and is
/// never subject to link failures.
pub struct SimulatedCluster {
    network: Arc<SimNetwork>,
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, SimNode>,
    client: NodeId,
}

impl SimulatedCluster {
    /// Build, initialize and start one node per id. Must be called inside a Tokio runtime.
    pub fn start<I, S>(node_ids: I, config: &NodeConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        let order: Vec<NodeId> = node_ids.into_iter().map(Into::into).collect();
        let network = SimNetwork::new();

        let mut nodes = HashMap::new();
        for id in &order {
            let endpoint = network.add_endpoint(id.clone());
            let node = BroadcastNode::new(config, endpoint.clone());
            network.register_handlers(id.clone(), node.handlers());
            nodes.insert(id.clone(), SimNode { endpoint, node });
        }

        for id in &order {
            if let Some(sim) = nodes.get(id) {
                sim.endpoint.init(order.clone());
                sim.node.start();
            }
        }
        tracing::debug!(nodes = order.len(), strategy = %config.strategy, "Simulated cluster started");

        Self {
            network,
            order,
            nodes,
            client: NodeId::from("c1"),
        }
    }

    pub fn network(&self) -> &Arc<SimNetwork> {
        &self.network
    }

    /// Member ids in start order
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn node(&self, id: &NodeId) -> Option<&BroadcastNode> {
        self.nodes.get(id).map(|sim| &sim.node)
    }

    /// Send `body` from the client to `node` and return the reply body
    pub async fn client_request(&self, node: &NodeId, body: Value) -> Result<Value, NetworkError> {
        self.network
            .client_request(&self.client, node, body, CLIENT_TIMEOUT)
            .await
    }

    /// Broadcast `value` at `node`, expecting `broadcast_ok`
    pub async fn broadcast(&self, node: &NodeId, value: i64) -> Result<(), NetworkError> {
        let reply = self
            .client_request(node, json!({"type": "broadcast", "message": value}))
            .await?;
        expect_type(node, &reply, "broadcast_ok")
    }

    /// Read `node`'s values through the protocol, sorted
    pub async fn read(&self, node: &NodeId) -> Result<Vec<MessageValue>, NetworkError> {
        let reply = self.client_request(node, json!({"type": "read"})).await?;
        expect_type(node, &reply, "read_ok")?;
        let mut values: Vec<MessageValue> = serde_json::from_value(reply["messages"].clone())
            .map_err(|e| NetworkError::SerializationFailed { error: e.to_string() })?;
        values.sort();
        Ok(values)
    }

    /// Send `topology` to every node
    pub async fn set_topology(&self, topology: &Topology) -> Result<(), NetworkError> {
        for node in &self.order {
            let reply = self
                .client_request(node, json!({"type": "topology", "topology": topology}))
                .await?;
            expect_type(node, &reply, "topology_ok")?;
        }
        Ok(())
    }

    /// Line topology following start order: `n0 - n1 - ... - nk`
    pub fn line_topology(&self) -> Topology {
        let mut topology: Topology = self.order.iter().map(|id| (id.clone(), Vec::new())).collect();
        for pair in self.order.windows(2) {
            if let [a, b] = pair {
                topology.entry(a.clone()).or_default().push(b.clone());
                topology.entry(b.clone()).or_default().push(a.clone());
            }
        }
        topology
    }

    /// Ring topology following start order
    pub fn ring_topology(&self) -> Topology {
        let mut topology = self.line_topology();
        if let (Some(first), Some(last)) = (self.order.first(), self.order.last()) {
            if self.order.len() > 2 {
                topology.entry(first.clone()).or_default().push(last.clone());
                topology.entry(last.clone()).or_default().push(first.clone());
            }
        }
        topology
    }

    pub fn sever(&self, a: &NodeId, b: &NodeId) {
        self.network.sever(a, b);
    }

    pub fn heal(&self, a: &NodeId, b: &NodeId) {
        self.network.heal(a, b);
    }

    pub fn isolate(&self, node: &NodeId) {
        self.network.isolate(node);
    }

    pub fn rejoin(&self, node: &NodeId) {
        self.network.rejoin(node);
    }

    /// Values stored at `node`, sorted, read directly from its store
    pub fn values_at(&self, node: &NodeId) -> Vec<MessageValue> {
        let mut values = self
            .node(node)
            .map(|n| n.store().snapshot())
            .unwrap_or_default();
        values.sort();
        values
    }

    /// Whether every node has stored every one of `values`
    pub fn all_hold(&self, values: &[i64]) -> bool {
        self.nodes.values().all(|sim| {
            values
                .iter()
                .all(|v| sim.node.store().exists(MessageValue(*v)))
        })
    }

    /// Background tasks still running across all nodes
    pub fn in_flight(&self) -> usize {
        self.nodes.values().map(|sim| sim.node.tasks().in_flight()).sum()
    }

    /// Poll `predicate` until it holds or `timeout` passes; returns its final value
    pub async fn wait_until<F>(&self, mut predicate: F, timeout: Duration) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(self) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Shut every node down with `grace`, then stop the network
    pub async fn shutdown_with(&self, grace: Duration) -> Vec<ShutdownReport> {
        let mut reports = Vec::with_capacity(self.order.len());
        for id in &self.order {
            if let Some(sim) = self.nodes.get(id) {
                reports.push(sim.node.shutdown_with(grace).await);
            }
        }
        self.network.shutdown(grace).await;
        reports
    }

    /// Shut down using each node's configured grace period
    pub async fn shutdown(&self) -> Vec<ShutdownReport> {
        let mut reports = Vec::with_capacity(self.order.len());
        for id in &self.order {
            if let Some(sim) = self.nodes.get(id) {
                reports.push(sim.node.shutdown().await);
            }
        }
        self.network.shutdown(Duration::ZERO).await;
        reports
    }
}

fn expect_type(node: &NodeId, reply: &Value, expected: &str) -> Result<(), NetworkError> {
    match reply.get("type").and_then(Value::as_str) {
        Some(t) if t == expected => Ok(()),
        other => Err(NetworkError::SendFailed {
            peer: node.clone(),
            reason: format!("expected `{expected}` reply, got {other:?}"),
        }),
    }
}
