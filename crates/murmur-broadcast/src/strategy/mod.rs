//! Fan-out strategies
//!
//! A strategy decides where a newly observed value goes next. Both strategies
//! share the dedup store and push through the [`RetryingSender`](crate::sender::RetryingSender):
//!
//! - [`FloodStrategy`]: forward to topology neighbors except the sender
//! - [`LeaderBatchStrategy`]: followers forward to a static leader, which
//!   periodically flushes accumulated values to everyone else

mod flood;
mod leader;

pub use flood::FloodStrategy;
pub use leader::LeaderBatchStrategy;

use async_trait::async_trait;
use murmur_core::{MessageValue, NodeId, Result, StrategyKind};

#[async_trait]
pub trait DisseminationStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// A single value arrived from `from` (a client or a peer)
    async fn on_single(&self, from: &NodeId, value: MessageValue) -> Result<()>;

    /// A leader batch arrived from `from`
    async fn on_batch(&self, from: &NodeId, values: Vec<MessageValue>) -> Result<()>;

    /// Launch long-lived background workers, if the strategy has any
    fn start(&self) {}
}
