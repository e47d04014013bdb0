//! # Murmur Node
//!
//! Hosts a [`murmur_broadcast::BroadcastNode`] behind the JSON-lines stdio
//! protocol. The `murmur` binary is a thin CLI over [`StdioRuntime`].

#![forbid(unsafe_code)]

pub mod runtime;

pub use runtime::{StdioNetwork, StdioRuntime};
