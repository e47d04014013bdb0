//! Message handler registration and dispatch
//!
//! Runtimes own a [`HandlerRegistry`] binding message-type tags to handlers.
//! Handler failures never escape the runtime: [`dispatch_or_reply`] turns
//! them into protocol `error` replies.

use crate::effects::NetworkEffects;
use crate::errors::{MurmurError, Result};
use crate::messages::{Envelope, ErrorBody};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Handler for one inbound message type
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process an inbound request. Replies are sent by the handler itself.
    async fn handle(&self, request: &Envelope) -> Result<()>;
}

/// Registry mapping message-type tags to handlers
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `msg_type` to `handler`, returning any handler it replaces
    pub fn register(
        &mut self,
        msg_type: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.insert(msg_type.into(), handler)
    }

    pub fn contains(&self, msg_type: &str) -> bool {
        self.handlers.contains_key(msg_type)
    }

    /// Registered message types, sorted
    pub fn message_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Route a request to its handler
    pub async fn dispatch(&self, request: &Envelope) -> Result<()> {
        let msg_type = request
            .msg_type()
            .ok_or_else(|| MurmurError::malformed("body has no `type` field"))?;
        let handler = self
            .handlers
            .get(msg_type)
            .ok_or_else(|| MurmurError::not_supported(format!("no handler for `{msg_type}`")))?;
        handler.handle(request).await
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("message_types", &self.message_types())
            .finish()
    }
}

/// Dispatch `request`, answering it with an `error` body if the handler fails.
///
/// Requests without a `msg_id` expect no reply, so their failures are only logged.
pub async fn dispatch_or_reply(
    registry: &HandlerRegistry,
    network: &dyn NetworkEffects,
    request: &Envelope,
) {
    let Err(err) = registry.dispatch(request).await else {
        return;
    };

    tracing::warn!(
        src = %request.src,
        msg_type = request.msg_type().unwrap_or("?"),
        error = %err,
        "Handler failed"
    );

    if request.msg_id().is_none() {
        return;
    }
    if let Err(e) = network
        .reply(request, ErrorBody::from(&err).to_body())
        .await
    {
        tracing::warn!(src = %request.src, error = %e, "Failed to send error reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::NetworkError;
    use crate::errors::ErrorCode;
    use crate::identity::NodeIdentity;
    use crate::NodeId;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl MessageHandler for Echo {
        async fn handle(&self, request: &Envelope) -> Result<()> {
            if request.body.get("fail").is_some() {
                return Err(MurmurError::malformed("asked to fail"));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNetwork {
        replies: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl NetworkEffects for RecordingNetwork {
        fn identity(&self) -> NodeIdentity {
            NodeIdentity::new()
        }

        async fn send(&self, _dest: &NodeId, _body: Value) -> std::result::Result<(), NetworkError> {
            Ok(())
        }

        async fn rpc(
            &self,
            dest: &NodeId,
            _body: Value,
            timeout: Duration,
        ) -> std::result::Result<Value, NetworkError> {
            Err(NetworkError::rpc_timeout(dest, timeout))
        }

        async fn reply(
            &self,
            _request: &Envelope,
            body: Value,
        ) -> std::result::Result<(), NetworkError> {
            self.replies.lock().push(body);
            Ok(())
        }
    }

    fn request(body: Value) -> Envelope {
        Envelope::new("c1".into(), "n0".into(), body)
    }

    #[tokio::test]
    async fn unknown_types_are_not_supported() {
        let registry = HandlerRegistry::new();
        let err = registry
            .dispatch(&request(json!({"type": "cas", "msg_id": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);
    }

    #[tokio::test]
    async fn handler_failures_become_error_replies() {
        let mut registry = HandlerRegistry::new();
        registry.register("echo", Arc::new(Echo));
        let network = RecordingNetwork::default();

        dispatch_or_reply(
            &registry,
            &network,
            &request(json!({"type": "echo", "msg_id": 5, "fail": true})),
        )
        .await;
        dispatch_or_reply(&registry, &network, &request(json!({"type": "echo", "msg_id": 6}))).await;

        let replies = network.replies.lock();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["type"], "error");
        assert_eq!(replies[0]["code"], 12);
    }

    #[tokio::test]
    async fn failures_without_msg_id_are_not_answered() {
        let registry = HandlerRegistry::new();
        let network = RecordingNetwork::default();

        dispatch_or_reply(&registry, &network, &request(json!({"type": "gossip"}))).await;
        assert!(network.replies.lock().is_empty());
    }

    #[test]
    fn message_types_are_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register("read", Arc::new(Echo));
        registry.register("broadcast", Arc::new(Echo));
        assert!(registry.register("read", Arc::new(Echo)).is_some());
        assert_eq!(registry.message_types(), vec!["broadcast", "read"]);
    }
}
