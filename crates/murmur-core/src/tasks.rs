//! Task registry for node background work.
//!
//! Every detached unit of work (acknowledgments, retry sequences, the flush
//! worker, per-request handlers) is spawned through a [`TaskRegistry`] so that
//! shutdown can drain or cancel it instead of leaking it.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` for JoinHandle storage because:
//! 1. Operations are O(n) retain/push or drain (shutdown only)
//! 2. Lock is never held across `.await` points
//! 3. No I/O or async work inside lock scope

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Outcome of [`TaskRegistry::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that finished within the grace period
    pub drained: usize,
    /// Tasks still running at the deadline, which were aborted
    pub aborted: usize,
}

#[derive(Debug)]
pub struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn drainable work: on shutdown it gets the grace period to finish.
    ///
    /// Returns `false` without spawning once shutdown has begun.
    pub fn spawn<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutting_down() {
            tracing::debug!("Task registry shutting down; dropping new task");
            return false;
        }
        let handle = tokio::spawn(fut);
        self.track(handle);
        true
    }

    /// Spawn work that stops as soon as shutdown begins.
    pub fn spawn_cancellable<F>(&self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutting_down() {
            return false;
        }
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_shutdown(shutdown_rx) => {}
                _ = fut => {}
            }
        });
        self.track(handle);
        true
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of tracked tasks that have not finished
    pub fn in_flight(&self) -> usize {
        self.handles
            .lock()
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Stop accepting work, cancel long-lived workers, give in-flight work
    /// `grace` to finish, then abort whatever is left.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.shutdown_tx.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();

        let deadline = Instant::now() + grace;
        let mut report = ShutdownReport::default();
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(_) => report.drained += 1,
                Err(_) => {
                    handle.abort();
                    report.aborted += 1;
                }
            }
        }

        tracing::info!(
            drained = report.drained,
            aborted = report.aborted,
            "Background tasks shut down"
        );
        report
    }
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}
