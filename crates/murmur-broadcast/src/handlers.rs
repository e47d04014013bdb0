//! Protocol handlers for `broadcast`, `read` and `topology`.

use crate::store::DedupStore;
use crate::strategy::DisseminationStrategy;
use crate::topology::TopologyStore;
use crate::wire::{self, BroadcastPayload, TopologyRequest};
use async_trait::async_trait;
use murmur_core::{Envelope, MessageHandler, NetworkEffects, Result, TaskRegistry};
use serde_json::Value;
use std::sync::Arc;

/// Handles `broadcast`: acknowledge first, then hand the payload to the strategy.
pub struct BroadcastHandler {
    network: Arc<dyn NetworkEffects>,
    tasks: Arc<TaskRegistry>,
    strategy: Arc<dyn DisseminationStrategy>,
}

impl BroadcastHandler {
    pub fn new(
        network: Arc<dyn NetworkEffects>,
        tasks: Arc<TaskRegistry>,
        strategy: Arc<dyn DisseminationStrategy>,
    ) -> Self {
        Self {
            network,
            tasks,
            strategy,
        }
    }

    /// Send the ack on its own task so storage and fan-out never wait on it
    fn acknowledge(&self, request: &Envelope, body: Value) {
        if request.msg_id().is_none() {
            return;
        }
        let network = self.network.clone();
        let request = request.clone();
        self.tasks.spawn(async move {
            if let Err(e) = network.reply(&request, body).await {
                tracing::warn!(dest = %request.src, error = %e, "Failed to acknowledge broadcast");
            }
        });
    }
}

#[async_trait]
impl MessageHandler for BroadcastHandler {
    async fn handle(&self, request: &Envelope) -> Result<()> {
        let payload = BroadcastPayload::decode(request)?;
        self.acknowledge(request, wire::broadcast_ok());

        match payload {
            BroadcastPayload::Single(value) => {
                tracing::debug!(src = %request.src, %value, "Broadcast received");
                self.strategy.on_single(&request.src, value).await
            }
            BroadcastPayload::Batch(values) => {
                tracing::debug!(src = %request.src, size = values.len(), "Batch received");
                self.strategy.on_batch(&request.src, values).await
            }
        }
    }
}

pub struct ReadHandler {
    network: Arc<dyn NetworkEffects>,
    store: DedupStore,
}

impl ReadHandler {
    pub fn new(network: Arc<dyn NetworkEffects>, store: DedupStore) -> Self {
        Self { network, store }
    }
}

#[async_trait]
impl MessageHandler for ReadHandler {
    async fn handle(&self, request: &Envelope) -> Result<()> {
        let snapshot = self.store.snapshot();
        self.network.reply(request, wire::read_ok(&snapshot)).await?;
        Ok(())
    }
}

/// Records the adjacency. Leader-batch mode accepts it but fans out by membership.
pub struct TopologyHandler {
    network: Arc<dyn NetworkEffects>,
    topology: TopologyStore,
}

impl TopologyHandler {
    pub fn new(network: Arc<dyn NetworkEffects>, topology: TopologyStore) -> Self {
        Self { network, topology }
    }
}

#[async_trait]
impl MessageHandler for TopologyHandler {
    async fn handle(&self, request: &Envelope) -> Result<()> {
        let TopologyRequest { topology } = request.decode_body()?;
        tracing::debug!(nodes = topology.len(), "Topology received");
        self.topology.set_topology(topology);
        self.network.reply(request, wire::topology_ok()).await?;
        Ok(())
    }
}
