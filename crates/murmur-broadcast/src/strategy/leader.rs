use super::DisseminationStrategy;
use crate::pending::PendingBatch;
use crate::sender::RetryingSender;
use crate::store::DedupStore;
use crate::wire::BroadcastPayload;
use async_trait::async_trait;
use murmur_core::{Membership, MessageValue, NodeId, NodeIdentity, Result, StrategyKind};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Leader-aggregated batched fan-out.
///
/// Followers forward first sightings to the leader. The leader queues them and
/// a flush worker sends the accumulated set to every other member once per
/// interval. Batches flow from the leader to followers only.
#[derive(Debug, Clone)]
pub struct LeaderBatchStrategy {
    identity: NodeIdentity,
    leader: NodeId,
    flush_interval: Duration,
    store: DedupStore,
    pending: PendingBatch,
    sender: RetryingSender,
}

impl LeaderBatchStrategy {
    pub fn new(
        identity: NodeIdentity,
        leader: NodeId,
        flush_interval: Duration,
        store: DedupStore,
        sender: RetryingSender,
    ) -> Self {
        Self {
            identity,
            leader,
            flush_interval,
            store,
            pending: PendingBatch::new(),
            sender,
        }
    }

    pub fn leader(&self) -> &NodeId {
        &self.leader
    }

    /// Values waiting for the next flush
    pub fn pending(&self) -> &PendingBatch {
        &self.pending
    }

    /// Flush the pending queue now, returning how many peers were sent a batch.
    ///
    /// Does nothing on followers, before the identity is known, or when the
    /// queue is empty.
    pub fn flush(&self) -> usize {
        match self.identity.get() {
            Some(membership) if membership.is(&self.leader) => self.flush_to(&membership),
            _ => 0,
        }
    }

    fn flush_to(&self, membership: &Membership) -> usize {
        let batch = self.pending.take();
        if batch.is_empty() {
            return 0;
        }

        let size = batch.len();
        let body = BroadcastPayload::Batch(batch).to_body();
        let mut peers = 0;
        for peer in membership.others(&self.leader) {
            if self.sender.send_with_retry(peer.clone(), body.clone()) {
                peers += 1;
            }
        }
        tracing::debug!(size, peers, "Flushed batch");
        peers
    }

    async fn run_flush_worker(self) {
        let membership = self.identity.ready().await;
        if !membership.is(&self.leader) {
            tracing::debug!(node = %membership.node_id, leader = %self.leader, "Not the leader; flush worker exiting");
            return;
        }

        let interval_ms = u64::try_from(self.flush_interval.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(interval_ms, "Leader flush worker started");
        let mut ticker = tokio::time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.flush_to(&membership);
        }
    }
}

#[async_trait]
impl DisseminationStrategy for LeaderBatchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LeaderBatch
    }

    async fn on_single(&self, from: &NodeId, value: MessageValue) -> Result<()> {
        let membership = self.identity.ready().await;
        if !self.store.store(value) {
            return Ok(());
        }

        if membership.is(&self.leader) {
            self.pending.enqueue(value);
        } else if *from != self.leader {
            self.sender
                .send_with_retry(self.leader.clone(), BroadcastPayload::Single(value).to_body());
        }
        Ok(())
    }

    async fn on_batch(&self, from: &NodeId, values: Vec<MessageValue>) -> Result<()> {
        self.identity.ready().await;
        let fresh = self.store.store_all(values);
        tracing::debug!(src = %from, fresh = fresh.len(), "Stored batch");
        Ok(())
    }

    fn start(&self) {
        let worker = self.clone();
        self.sender
            .tasks()
            .spawn_cancellable(async move { worker.run_flush_worker().await });
    }
}
