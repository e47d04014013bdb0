//! Effect interfaces consumed by the dissemination core
//!
//! - `network`: the messaging substrate contract (`NetworkEffects`)
//! - `reliability`: bounded retry with linear backoff

pub mod network;
pub mod reliability;

pub use network::{NetworkEffects, NetworkError};
pub use reliability::{RetryPolicy, RetryResult};
