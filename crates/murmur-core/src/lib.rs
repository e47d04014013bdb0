#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
#![forbid(unsafe_code)]
//! # Murmur Core
//!
//! Foundation types shared by the dissemination engine and the runtimes that
//! host it:
//!
//! - Identifiers (`NodeId`, `MessageValue`) and the unified `MurmurError`
//! - Message envelopes and protocol bodies
//! - `NetworkEffects`: the messaging substrate contract the engine consumes
//! - `RetryPolicy`: bounded retry with linear backoff
//! - `NodeIdentity`: one-shot readiness signal for the node's identity
//! - `TaskRegistry`: tracked background work with drain/cancel shutdown
//! - `HandlerRegistry` and `PendingReplies`: plumbing for runtime adapters
//! - `NodeConfig`: TOML + environment configuration

pub mod config;
pub mod effects;
pub mod errors;
pub mod handler;
pub mod identifiers;
pub mod identity;
pub mod messages;
pub mod rpc;
pub mod tasks;

pub use config::{NodeConfig, RetryConfig, StrategyKind};
pub use effects::{NetworkEffects, NetworkError, RetryPolicy, RetryResult};
pub use errors::{ErrorCode, MurmurError, Result};
pub use handler::{dispatch_or_reply, HandlerRegistry, MessageHandler};
pub use identifiers::{MessageValue, NodeId};
pub use identity::{Membership, NodeIdentity};
pub use messages::{Envelope, ErrorBody, InitRequest};
pub use rpc::PendingReplies;
pub use tasks::{ShutdownReport, TaskRegistry};
