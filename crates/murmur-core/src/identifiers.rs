//! Node and message identifiers
//!
//! Both identifiers are thin newtypes over their wire representation so they
//! serialize transparently into protocol bodies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a cluster member (`n0`, `n1`, ...) or an external client (`c1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Client identifiers are assigned by the messaging substrate and start with `c`.
    pub fn is_client(&self) -> bool {
        self.0.starts_with('c')
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A broadcast message value.
///
/// Messages carry no identity beyond their value: two equal values are the
/// same message for deduplication purposes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct MessageValue(pub i64);

impl MessageValue {
    /// Get the raw integer
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageValue {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<MessageValue> for i64 {
    fn from(value: MessageValue) -> Self {
        value.0
    }
}
