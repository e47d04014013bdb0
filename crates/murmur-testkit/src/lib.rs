//! # Murmur Testkit
//!
//! In-process harness for exercising broadcast nodes as a cluster.
//!
//! - [`SimNetwork`] / [`SimEndpoint`]: a [`NetworkEffects`] substrate with
//!   link failure injection and per-link delivery counters
//! - [`SimulatedCluster`]: starts a node per id, drives client requests and
//!   waits for convergence
//!
//! ```rust,ignore
//! let cluster = SimulatedCluster::start(["n0", "n1", "n2"], &NodeConfig::default());
//! cluster.set_topology(&cluster.line_topology()).await?;
//! cluster.broadcast(&"n1".into(), 5).await?;
//! assert!(cluster.wait_until(|c| c.all_hold(&[5]), Duration::from_secs(1)).await);
//! ```
//!
//! [`NetworkEffects`]: murmur_core::NetworkEffects

pub mod cluster;
pub mod network;

pub use cluster::SimulatedCluster;
pub use network::{SimEndpoint, SimNetwork};

use murmur_core::{NodeConfig, RetryConfig, StrategyKind};

/// Configuration with retry timings short enough for tests
pub fn fast_config(strategy: StrategyKind) -> NodeConfig {
    NodeConfig {
        strategy,
        shutdown_grace_ms: 500,
        retry: RetryConfig {
            max_attempts: 20,
            attempt_timeout_ms: 50,
            backoff_unit_ms: 10,
        },
        ..NodeConfig::default()
    }
}
