//! JSON-lines stdio runtime
//!
//! Each input line is one envelope `{"src", "dest", "body"}`. The runtime
//! answers `init` itself, routes replies (`in_reply_to`) to waiting RPCs and
//! dispatches every other request to the node's handlers on its own task.
//! Output goes through a single writer task so lines never interleave.

use async_trait::async_trait;
use murmur_broadcast::BroadcastNode;
use murmur_core::messages::{with_ids, INIT, INIT_OK};
use murmur_core::{
    dispatch_or_reply, Envelope, ErrorBody, HandlerRegistry, InitRequest, Membership, MurmurError,
    NetworkEffects, NetworkError, NodeConfig, NodeId, NodeIdentity, PendingReplies, ShutdownReport,
    TaskRegistry,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

/// [`NetworkEffects`] over the process's stdout
pub struct StdioNetwork {
    identity: NodeIdentity,
    pending: PendingReplies,
    outbound: mpsc::UnboundedSender<Envelope>,
}

impl StdioNetwork {
    fn new(outbound: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            identity: NodeIdentity::new(),
            pending: PendingReplies::new(),
            outbound,
        }
    }

    fn local_id(&self) -> Result<NodeId, NetworkError> {
        self.identity.node_id().ok_or(NetworkError::NotInitialized)
    }

    fn emit(&self, envelope: Envelope) -> Result<(), NetworkError> {
        self.outbound.send(envelope).map_err(|_| NetworkError::Closed)
    }

    /// Route a reply to whoever is waiting on it
    fn resolve(&self, envelope: Envelope) {
        let Some(in_reply_to) = envelope.in_reply_to() else {
            return;
        };
        if !self.pending.resolve(in_reply_to, envelope.body) {
            tracing::debug!(src = %envelope.src, in_reply_to, "Reply for unknown or expired request");
        }
    }
}

#[async_trait]
impl NetworkEffects for StdioNetwork {
    fn identity(&self) -> NodeIdentity {
        self.identity.clone()
    }

    async fn send(&self, dest: &NodeId, body: Value) -> Result<(), NetworkError> {
        let src = self.local_id()?;
        self.emit(Envelope::new(src, dest.clone(), body))
    }

    async fn rpc(
        &self,
        dest: &NodeId,
        body: Value,
        timeout: Duration,
    ) -> Result<Value, NetworkError> {
        let src = self.local_id()?;
        let (id, rx) = self.pending.register();
        if let Err(e) = self.emit(Envelope::new(src, dest.clone(), with_ids(body, Some(id), None))) {
            self.pending.forget(id);
            return Err(e);
        }
        self.pending.wait(dest, id, rx, timeout).await
    }

    async fn reply(&self, request: &Envelope, body: Value) -> Result<(), NetworkError> {
        let src = self.local_id()?;
        let body = with_ids(body, Some(self.pending.next_msg_id()), request.msg_id());
        self.emit(Envelope::new(src, request.src.clone(), body))
    }
}

/// A broadcast node wired to a line-oriented reader and writer
pub struct StdioRuntime {
    network: Arc<StdioNetwork>,
    node: BroadcastNode,
    handlers: HandlerRegistry,
    requests: Arc<TaskRegistry>,
    outbound_rx: mpsc::UnboundedReceiver<Envelope>,
    grace: Duration,
}

impl StdioRuntime {
    pub fn new(config: &NodeConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let network = Arc::new(StdioNetwork::new(outbound_tx));
        let node = BroadcastNode::new(config, network.clone());
        let handlers = node.handlers();

        Self {
            network,
            node,
            handlers,
            requests: Arc::new(TaskRegistry::new()),
            outbound_rx,
            grace: config.shutdown_grace(),
        }
    }

    pub fn node(&self) -> &BroadcastNode {
        &self.node
    }

    /// Serve until `reader` reaches EOF or `shutdown` resolves, then shut the node down.
    ///
    /// The node is shut down in every case. An input read failure or an
    /// output write failure is returned after that.
    pub async fn run<R, W, S>(self, reader: R, writer: W, shutdown: S) -> Result<ShutdownReport, MurmurError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        let Self {
            network,
            node,
            handlers,
            requests,
            outbound_rx,
            grace,
        } = self;
        let handlers = Arc::new(handlers);

        let (stop_tx, stop_rx) = oneshot::channel();
        let writer_task = tokio::spawn(write_loop(outbound_rx, writer, stop_rx));

        node.start();

        let mut input_error = None;
        let mut lines = reader.lines();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => handle_line(&network, &handlers, &requests, &line),
                    Ok(None) => {
                        tracing::info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read input");
                        input_error = Some(e);
                        break;
                    }
                },
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
            }
        }

        let in_progress = requests.shutdown(grace).await;
        let mut report = node.shutdown_with(grace).await;
        report.drained += in_progress.drained;
        report.aborted += in_progress.aborted;

        // Ignored: the writer may already have exited on an I/O error
        let _ = stop_tx.send(());
        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Output writer failed");
                return Err(e.into());
            }
            Err(e) => return Err(MurmurError::internal(format!("output writer panicked: {e}"))),
        }
        match input_error {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }
}

fn handle_line(
    network: &Arc<StdioNetwork>,
    handlers: &Arc<HandlerRegistry>,
    requests: &TaskRegistry,
    line: &str,
) {
    if line.trim().is_empty() {
        return;
    }
    let envelope = match Envelope::from_json_line(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "Discarding unparseable line");
            return;
        }
    };

    if envelope.in_reply_to().is_some() {
        network.resolve(envelope);
        return;
    }

    if envelope.msg_type() == Some(INIT) {
        handle_init(network, &envelope);
        return;
    }

    let network = network.clone();
    let handlers = handlers.clone();
    requests.spawn(async move {
        dispatch_or_reply(&handlers, network.as_ref(), &envelope).await;
    });
}

fn handle_init(network: &StdioNetwork, envelope: &Envelope) {
    let body = match envelope.decode_body::<InitRequest>() {
        Ok(InitRequest { node_id, node_ids }) => {
            tracing::info!(node = %node_id, members = node_ids.len(), "Node initialized");
            network.identity.set(Membership::new(node_id, node_ids));
            with_ids(json!({"type": INIT_OK}), None, envelope.msg_id())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Invalid init message");
            with_ids(ErrorBody::from(&e).to_body(), None, envelope.msg_id())
        }
    };

    let src = envelope.dest.clone();
    if let Err(e) = network.emit(Envelope::new(src, envelope.src.clone(), body)) {
        tracing::warn!(error = %e, "Failed to answer init");
    }
}

async fn write_loop<W>(
    mut outbound: mpsc::UnboundedReceiver<Envelope>,
    mut writer: W,
    mut stop: oneshot::Receiver<()>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            Some(envelope) = outbound.recv() => write_envelope(&mut writer, &envelope).await?,
            _ = &mut stop => break,
        }
    }
    while let Ok(envelope) = outbound.try_recv() {
        write_envelope(&mut writer, &envelope).await?;
    }
    writer.flush().await
}

async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = match envelope.to_json_line() {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(dest = %envelope.dest, error = %e, "Dropping unserializable message");
            return Ok(());
        }
    };
    tracing::trace!(%line, "Sending");
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
