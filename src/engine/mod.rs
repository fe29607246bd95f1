// FILE: src/engine/mod.rs
pub mod archiver;
pub mod hasher;

use crate::error::{KeeperError, Result};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One progress notification: `completed` of `total` items done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Completion in `[0, 1]`. An empty run counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.completed.min(self.total) as f64) / (self.total as f64)
        }
    }
}

/// Sending half of a progress stream. Sends never block; if nobody is
/// listening the notification is dropped.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: mpsc::UnboundedSender<Progress>,
}

impl Reporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Progress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, completed: usize, total: usize) {
        let _ = self.tx.send(Progress { completed, total });
    }
}

/// Handle to a background pass: its progress stream, a cancellation
/// switch, and the final result.
pub struct Operation<T> {
    label: &'static str,
    progress: mpsc::UnboundedReceiver<Progress>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Operation<T> {
    /// Run `work` on the runtime's blocking pool.
    pub(crate) fn spawn<F>(runtime: &Handle, label: &'static str, cancel: CancellationToken, work: F) -> Self
    where
        F: FnOnce(&Reporter, &CancellationToken) -> Result<T> + Send + 'static,
    {
        let (reporter, progress) = Reporter::channel();
        let token = cancel.clone();

        let handle = runtime.spawn_blocking(move || {
            tracing::debug!("[{}] Worker started", label);
            let result = work(&reporter, &token);
            if let Err(e) = &result {
                tracing::debug!("[{}] Worker finished with error: {}", label, e);
            }
            result
        });

        Self { label, progress, cancel, handle }
    }

    /// Next progress notification, or `None` once the worker is done.
    pub async fn next_progress(&mut self) -> Option<Progress> {
        self.progress.recv().await
    }

    /// Non-blocking poll for callers that drive their own event loop.
    pub fn try_progress(&mut self) -> Option<Progress> {
        self.progress.try_recv().ok()
    }

    /// Ask the worker to stop after the item it is working on.
    pub fn cancel(&self) {
        tracing::info!("[{}] Cancellation requested", self.label);
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the result, discarding any progress not yet read.
    pub async fn wait(self) -> Result<T> {
        let label = self.label;
        self.handle.await.map_err(|e| {
            if e.is_panic() {
                KeeperError::Other(anyhow::anyhow!("{} task panic: {}", label, e))
            } else {
                KeeperError::Other(anyhow::anyhow!("{} task aborted before finishing: {}", label, e))
            }
        })?
    }

    /// Feed every progress notification to `on_progress`, then return the result.
    pub async fn finish(mut self, mut on_progress: impl FnMut(Progress)) -> Result<T> {
        while let Some(progress) = self.progress.recv().await {
            on_progress(progress);
        }
        self.wait().await
    }
}
