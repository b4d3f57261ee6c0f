//! ============================================================================
//! Debounced Saver - Coalesces bursts of ownership toggles into one write
//! ============================================================================
//! Each toggle hands the worker a snapshot of the overlay and restarts the
//! quiet-period timer. When the timer runs out the latest snapshot is
//! written. A single worker task performs every write, so saves complete in
//! the order they were requested and an older snapshot can never land after
//! a newer one.
//! ============================================================================

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::storage::{PersistenceArbiter, SaveTarget};
use crate::types::{CollectionResult, OwnershipOverlay};

/// Default quiet period before a scheduled save fires
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Destination of debounced writes
#[async_trait]
pub trait OverlaySink: Send + Sync + 'static {
    async fn persist(&self, overlay: &OwnershipOverlay) -> CollectionResult<SaveTarget>;
}

#[async_trait]
impl OverlaySink for PersistenceArbiter {
    async fn persist(&self, overlay: &OwnershipOverlay) -> CollectionResult<SaveTarget> {
        self.save_overlay(overlay).await
    }
}

/// Outcome of a write, as reported to callers waiting on it
pub type SaveOutcome = Result<Option<SaveTarget>, String>;

enum Command {
    /// Debounced: restart the timer with this snapshot
    Schedule(OwnershipOverlay),
    /// Write this snapshot now, dropping any pending one
    Immediate(OwnershipOverlay, oneshot::Sender<SaveOutcome>),
    /// Write the pending snapshot now, if any
    Flush(oneshot::Sender<SaveOutcome>),
}

/// Handle to the background save worker
pub struct SaveScheduler {
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
}

impl SaveScheduler {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(sink: Arc<dyn OverlaySink>, quiet: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(sink, quiet, rx));
        Self { tx, worker }
    }

    /// Queue a debounced save of `overlay`
    pub fn schedule(&self, overlay: OwnershipOverlay) {
        if self.tx.send(Command::Schedule(overlay)).is_err() {
            error!("Save worker is gone; ownership change not persisted");
        }
    }

    /// Save `overlay` right away (import/reset) and wait for the result
    pub async fn save_now(&self, overlay: OwnershipOverlay) -> SaveOutcome {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Immediate(overlay, ack))
            .map_err(|_| "save worker stopped".to_string())?;
        done.await.map_err(|_| "save worker stopped".to_string())?
    }

    /// Fire the pending debounced save, if any, and wait for it
    pub async fn flush(&self) -> SaveOutcome {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack))
            .map_err(|_| "save worker stopped".to_string())?;
        done.await.map_err(|_| "save worker stopped".to_string())?
    }

    /// Flush and stop the worker
    pub async fn shutdown(self) -> SaveOutcome {
        let outcome = self.flush().await;
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!("Save worker ended abnormally: {}", e);
        }
        outcome
    }
}

async fn write(sink: &dyn OverlaySink, overlay: &OwnershipOverlay) -> SaveOutcome {
    match sink.persist(overlay).await {
        Ok(target) => {
            debug!("Ownership saved ({:?})", target);
            Ok(Some(target))
        }
        Err(e) => {
            // In-memory state stays as the user left it
            error!("Failed to save ownership data: {}", e);
            Err(e.to_string())
        }
    }
}

async fn run(sink: Arc<dyn OverlaySink>, quiet: Duration, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut pending: Option<OwnershipOverlay> = None;

    loop {
        let next = if pending.is_some() {
            match timeout(quiet, rx.recv()).await {
                Ok(cmd) => cmd,
                Err(_) => {
                    if let Some(snapshot) = pending.take() {
                        let _ = write(sink.as_ref(), &snapshot).await;
                    }
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match next {
            Some(Command::Schedule(snapshot)) => {
                pending = Some(snapshot);
            }
            Some(Command::Immediate(snapshot, ack)) => {
                pending = None;
                let outcome = write(sink.as_ref(), &snapshot).await;
                let _ = ack.send(outcome);
            }
            Some(Command::Flush(ack)) => {
                let outcome = match pending.take() {
                    Some(snapshot) => write(sink.as_ref(), &snapshot).await,
                    None => Ok(None),
                };
                let _ = ack.send(outcome);
            }
            None => {
                if let Some(snapshot) = pending.take() {
                    let _ = write(sink.as_ref(), &snapshot).await;
                }
                break;
            }
        }
    }

    debug!("Save worker stopped");
}
