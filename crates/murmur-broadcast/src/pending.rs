//! Leader-side queue of values awaiting the next batch flush.

use murmur_core::MessageValue;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Values accumulated since the last flush.
///
/// [`PendingBatch::take`] swaps the queue for an empty one under a single
/// write lock, so a value lands in exactly one flushed snapshot.
#[derive(Debug, Clone, Default)]
pub struct PendingBatch {
    queue: Arc<RwLock<HashSet<MessageValue>>>,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `value` for the next flush; `false` if it is already queued
    pub fn enqueue(&self, value: MessageValue) -> bool {
        self.queue.write().insert(value)
    }

    /// Atomically empty the queue, returning its contents in no particular order
    pub fn take(&self) -> Vec<MessageValue> {
        let drained = std::mem::take(&mut *self.queue.write());
        drained.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.queue.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_empties_queue() {
        let batch = PendingBatch::new();
        assert!(batch.enqueue(MessageValue(1)));
        assert!(batch.enqueue(MessageValue(2)));
        assert!(!batch.enqueue(MessageValue(2)));

        let mut taken = batch.take();
        taken.sort();
        assert_eq!(taken, vec![MessageValue(1), MessageValue(2)]);
        assert!(batch.is_empty());
        assert!(batch.take().is_empty());
    }

    #[test]
    fn values_enqueued_after_take_wait_for_next_cycle() {
        let batch = PendingBatch::new();
        batch.enqueue(MessageValue(1));
        let first = batch.take();
        batch.enqueue(MessageValue(3));

        assert_eq!(first, vec![MessageValue(1)]);
        assert_eq!(batch.take(), vec![MessageValue(3)]);
    }
}
