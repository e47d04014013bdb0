//! Neighbor adjacency supplied by the `topology` control message.

use murmur_core::NodeId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Adjacency mapping node id → neighbor ids
pub type Topology = HashMap<NodeId, Vec<NodeId>>;

/// Holds the most recently supplied topology.
///
/// Setting it again replaces the previous mapping wholesale.
#[derive(Debug, Clone, Default)]
pub struct TopologyStore {
    adjacency: Arc<RwLock<Option<Topology>>>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_topology(&self, topology: Topology) {
        *self.adjacency.write() = Some(topology);
    }

    /// Neighbors of `node`; empty when unknown
    pub fn neighbors(&self, node: &NodeId) -> Vec<NodeId> {
        self.adjacency
            .read()
            .as_ref()
            .and_then(|t| t.get(node).cloned())
            .unwrap_or_default()
    }

    pub fn is_set(&self) -> bool {
        self.adjacency.read().is_some()
    }
}
