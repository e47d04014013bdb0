#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
#![forbid(unsafe_code)]
//! # Murmur Broadcast
//!
//! Dissemination engine delivering every broadcast value to every node of a
//! fixed-membership cluster.
//!
//! ## Components
//!
//! - [`DedupStore`]: monotonic set of observed values
//! - [`TopologyStore`]: neighbor adjacency for flooding
//! - [`RetryingSender`]: tracked background delivery with linear backoff
//! - [`FloodStrategy`] and [`LeaderBatchStrategy`]: the two fan-out modes
//! - [`BroadcastNode`]: wires the above to a `NetworkEffects` substrate and
//!   exposes the `broadcast`, `read` and `topology` handlers
//!
//! Inbound broadcasts are acknowledged before they are stored or forwarded.
//! Outbound failures are retried per destination and never block the ack.

pub mod handlers;
pub mod node;
pub mod pending;
pub mod sender;
pub mod store;
pub mod strategy;
pub mod topology;
pub mod wire;

#[cfg(test)]
mod testing;

pub use node::BroadcastNode;
pub use pending::PendingBatch;
pub use sender::RetryingSender;
pub use store::DedupStore;
pub use strategy::{DisseminationStrategy, FloodStrategy, LeaderBatchStrategy};
pub use topology::{Topology, TopologyStore};
pub use wire::BroadcastPayload;
