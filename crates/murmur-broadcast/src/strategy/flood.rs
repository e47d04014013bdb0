use super::DisseminationStrategy;
use crate::sender::RetryingSender;
use crate::store::DedupStore;
use crate::topology::TopologyStore;
use crate::wire::BroadcastPayload;
use async_trait::async_trait;
use murmur_core::{MessageValue, NodeIdentity, NodeId, Result, StrategyKind};

/// Direct flooding over the configured topology.
///
/// A value is forwarded only on its first sighting at this node, which bounds
/// propagation to one wave per value per node.
#[derive(Debug, Clone)]
pub struct FloodStrategy {
    identity: NodeIdentity,
    store: DedupStore,
    topology: TopologyStore,
    sender: RetryingSender,
}

impl FloodStrategy {
    pub fn new(
        identity: NodeIdentity,
        store: DedupStore,
        topology: TopologyStore,
        sender: RetryingSender,
    ) -> Self {
        Self {
            identity,
            store,
            topology,
            sender,
        }
    }

    fn flood(&self, me: &NodeId, from: &NodeId, value: MessageValue) {
        let body = BroadcastPayload::Single(value).to_body();

        for neighbor in self.topology.neighbors(me) {
            if neighbor == *from {
                continue;
            }
            tracing::debug!(peer = %neighbor, %value, "Flooding value");
            self.sender.send_with_retry(neighbor, body.clone());
        }
    }
}

#[async_trait]
impl DisseminationStrategy for FloodStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Flood
    }

    async fn on_single(&self, from: &NodeId, value: MessageValue) -> Result<()> {
        let me = self.identity.ready().await;
        if self.store.store(value) {
            self.flood(&me.node_id, from, value);
        }
        Ok(())
    }

    async fn on_batch(&self, from: &NodeId, values: Vec<MessageValue>) -> Result<()> {
        let me = self.identity.ready().await;
        for value in self.store.store_all(values) {
            self.flood(&me.node_id, from, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNetwork;
    use murmur_core::{Membership, NetworkEffects, RetryPolicy, TaskRegistry};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn flood_at(node: &str) -> (FloodStrategy, Arc<MockNetwork>, Arc<TaskRegistry>) {
        let network = Arc::new(MockNetwork::new(node, &["n0", "n1", "n2", "n3"]));
        let tasks = Arc::new(TaskRegistry::new());
        let sender = RetryingSender::new(network.clone(), RetryPolicy::linear(), tasks.clone());
        let topology = TopologyStore::new();
        topology.set_topology(HashMap::from([
            ("n0".into(), vec!["n1".into()]),
            ("n1".into(), vec!["n0".into(), "n2".into(), "n3".into()]),
        ]));
        let strategy = FloodStrategy::new(network.identity(), DedupStore::new(), topology, sender);
        (strategy, network, tasks)
    }

    #[tokio::test]
    async fn forwards_to_neighbors_except_sender() {
        let (strategy, network, tasks) = flood_at("n1");

        strategy.on_single(&"n2".into(), MessageValue(5)).await.unwrap();
        tasks.shutdown(Duration::from_secs(1)).await;

        assert_eq!(network.rpc_dests(), vec![NodeId::from("n0"), NodeId::from("n3")]);
    }

    #[tokio::test]
    async fn duplicate_delivery_triggers_one_wave() {
        let (strategy, network, tasks) = flood_at("n1");

        strategy.on_single(&"c1".into(), MessageValue(5)).await.unwrap();
        strategy.on_single(&"n0".into(), MessageValue(5)).await.unwrap();
        tasks.shutdown(Duration::from_secs(1)).await;

        assert_eq!(network.rpc_count(), 3);
        assert_eq!(strategy.store.snapshot(), vec![MessageValue(5)]);
    }

    #[tokio::test]
    async fn batches_flood_only_new_values() {
        let (strategy, network, tasks) = flood_at("n0");
        strategy.on_single(&"c1".into(), MessageValue(1)).await.unwrap();

        strategy
            .on_batch(&"n2".into(), vec![MessageValue(1), MessageValue(2)])
            .await
            .unwrap();
        tasks.shutdown(Duration::from_secs(1)).await;

        let bodies: Vec<_> = network.rpcs.lock().iter().map(|c| c.body.clone()).collect();
        assert_eq!(bodies.len(), 2);
        assert_eq!(strategy.store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn values_wait_for_identity_before_flooding() {
        let network = Arc::new(MockNetwork::uninitialized());
        let tasks = Arc::new(TaskRegistry::new());
        let sender = RetryingSender::new(network.clone(), RetryPolicy::linear(), tasks.clone());
        let topology = TopologyStore::new();
        topology.set_topology(HashMap::from([("n1".into(), vec!["n0".into(), "n2".into()])]));
        let strategy = FloodStrategy::new(network.identity(), DedupStore::new(), topology, sender);

        let pending = {
            let strategy = strategy.clone();
            tokio::spawn(async move { strategy.on_single(&"c1".into(), MessageValue(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(strategy.store.is_empty());
        assert_eq!(network.rpc_count(), 0);

        network.identity().set(Membership::new(
            "n1".into(),
            vec!["n0".into(), "n1".into(), "n2".into()],
        ));
        pending.await.unwrap().unwrap();
        tasks.shutdown(Duration::from_secs(1)).await;

        assert!(strategy.store.exists(MessageValue(1)));
        assert_eq!(network.rpc_dests(), vec![NodeId::from("n0"), NodeId::from("n2")]);
    }
}
