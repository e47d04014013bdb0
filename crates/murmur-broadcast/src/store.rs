//! Deduplicated message storage.
//!
//! The store is monotonic: values are only ever added. Inserting is
//! idempotent, and [`DedupStore::store`] reports whether the value was new so
//! strategies propagate each message at most once per node.

use murmur_core::MessageValue;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

/// Concurrency-safe set of delivered message values.
///
/// Clones share the same underlying set.
#[derive(Debug, Clone, Default)]
pub struct DedupStore {
    values: Arc<RwLock<HashSet<MessageValue>>>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `value` has been stored
    pub fn exists(&self, value: MessageValue) -> bool {
        self.values.read().contains(&value)
    }

    /// Insert `value`, returning `true` if it was not already present.
    ///
    /// The check and the insert happen under one write lock, so concurrent
    /// first sightings of the same value yield exactly one `true`.
    pub fn store(&self, value: MessageValue) -> bool {
        self.values.write().insert(value)
    }

    /// Insert every value, returning the ones that were new
    pub fn store_all<I>(&self, values: I) -> Vec<MessageValue>
    where
        I: IntoIterator<Item = MessageValue>,
    {
        let mut set = self.values.write();
        values.into_iter().filter(|v| set.insert(*v)).collect()
    }

    /// Point-in-time copy of every stored value, in no particular order
    pub fn snapshot(&self) -> Vec<MessageValue> {
        self.values.read().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}
