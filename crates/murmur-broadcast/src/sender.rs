//! Bounded-retry delivery of broadcast requests.
//!
//! Each outbound send runs as its own tracked background task. Attempts are
//! strictly sequential per destination and bounded by the policy's per-attempt
//! timeout; failures of any kind are retried with the policy's backoff. When
//! the attempts run out the sequence ends quietly with a warning.

use murmur_core::{NetworkEffects, NetworkError, NodeId, RetryPolicy, RetryResult, TaskRegistry};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct RetryingSender {
    network: Arc<dyn NetworkEffects>,
    policy: RetryPolicy,
    tasks: Arc<TaskRegistry>,
}

impl RetryingSender {
    pub fn new(network: Arc<dyn NetworkEffects>, policy: RetryPolicy, tasks: Arc<TaskRegistry>) -> Self {
        Self {
            network,
            policy,
            tasks,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    /// Deliver `body` to `dest` in the background without blocking the caller.
    ///
    /// Returns `false` if the node is shutting down and the send was dropped.
    pub fn send_with_retry(&self, dest: NodeId, body: Value) -> bool {
        let sender = self.clone();
        self.tasks.spawn(async move {
            sender.deliver(&dest, body).await;
        })
    }

    /// Run the full retry sequence for one destination
    pub async fn deliver(&self, dest: &NodeId, body: Value) -> RetryResult<Value, NetworkError> {
        let timeout = self.policy.attempt_timeout;

        let outcome = self
            .policy
            .execute_with_context(|attempt| {
                let body = body.clone();
                async move {
                    let result = tokio::time::timeout(timeout, self.network.rpc(dest, body, timeout))
                        .await
                        .unwrap_or_else(|_| Err(NetworkError::rpc_timeout(dest, timeout)));
                    if let Err(e) = &result {
                        tracing::debug!(peer = %dest, attempt, error = %e, "Broadcast attempt failed");
                    }
                    result
                }
            })
            .await;

        match &outcome.result {
            Ok(_) if outcome.had_retries() => {
                tracing::debug!(peer = %dest, attempts = outcome.attempts, "Broadcast delivered after retries");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    peer = %dest,
                    attempts = outcome.attempts,
                    error = %e,
                    "Giving up on broadcast delivery"
                );
            }
        }
        outcome
    }
}

impl std::fmt::Debug for RetryingSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingSender")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
