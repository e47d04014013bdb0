//! Assembly of a broadcast node over a [`NetworkEffects`] implementation.

use crate::handlers::{BroadcastHandler, ReadHandler, TopologyHandler};
use crate::sender::RetryingSender;
use crate::store::DedupStore;
use crate::strategy::{DisseminationStrategy, FloodStrategy, LeaderBatchStrategy};
use crate::topology::TopologyStore;
use crate::wire;
use murmur_core::{
    HandlerRegistry, NetworkEffects, NodeConfig, ShutdownReport, StrategyKind, TaskRegistry,
};
use std::sync::Arc;
use std::time::Duration;

/// A node of the dissemination engine.
///
/// Owns the dedup and topology stores, the background task registry and the
/// configured strategy. The hosting runtime registers the node's handlers,
/// calls [`BroadcastNode::start`] and eventually [`BroadcastNode::shutdown`].
pub struct BroadcastNode {
    network: Arc<dyn NetworkEffects>,
    store: DedupStore,
    topology: TopologyStore,
    tasks: Arc<TaskRegistry>,
    strategy: Arc<dyn DisseminationStrategy>,
    shutdown_grace: Duration,
}

impl BroadcastNode {
    pub fn new(config: &NodeConfig, network: Arc<dyn NetworkEffects>) -> Self {
        let store = DedupStore::new();
        let topology = TopologyStore::new();
        let tasks = Arc::new(TaskRegistry::new());
        let sender = RetryingSender::new(network.clone(), config.retry_policy(), tasks.clone());

        let strategy: Arc<dyn DisseminationStrategy> = match config.strategy {
            StrategyKind::Flood => Arc::new(FloodStrategy::new(
                network.identity(),
                store.clone(),
                topology.clone(),
                sender,
            )),
            StrategyKind::LeaderBatch => Arc::new(LeaderBatchStrategy::new(
                network.identity(),
                config.leader.clone(),
                config.flush_interval(),
                store.clone(),
                sender,
            )),
        };

        Self {
            network,
            store,
            topology,
            tasks,
            strategy,
            shutdown_grace: config.shutdown_grace(),
        }
    }

    /// Bind the `broadcast`, `read` and `topology` handlers
    pub fn register_handlers(&self, registry: &mut HandlerRegistry) {
        registry.register(
            wire::BROADCAST,
            Arc::new(BroadcastHandler::new(
                self.network.clone(),
                self.tasks.clone(),
                self.strategy.clone(),
            )),
        );
        registry.register(
            wire::READ,
            Arc::new(ReadHandler::new(self.network.clone(), self.store.clone())),
        );
        registry.register(
            wire::TOPOLOGY,
            Arc::new(TopologyHandler::new(self.network.clone(), self.topology.clone())),
        );
    }

    /// Registry containing only this node's handlers
    pub fn handlers(&self) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        self.register_handlers(&mut registry);
        registry
    }

    /// Launch the strategy's background workers
    pub fn start(&self) {
        tracing::info!(strategy = %self.strategy.kind(), "Broadcast node starting");
        self.strategy.start();
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    pub fn topology(&self) -> &TopologyStore {
        &self.topology
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    /// Shut down with the configured grace period
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_with(self.shutdown_grace).await
    }

    /// Stop the flush worker, let in-flight sends drain for `grace`, then abort the rest
    pub async fn shutdown_with(&self, grace: Duration) -> ShutdownReport {
        self.tasks.shutdown(grace).await
    }
}

impl std::fmt::Debug for BroadcastNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastNode")
            .field("strategy", &self.strategy.kind())
            .field("stored", &self.store.len())
            .finish_non_exhaustive()
    }
}
