//! Event-driven sync scheduling: reconnects and manual refreshes feed a
//! bounded single-slot queue in front of the engine's single-flight guard.
//! A trigger arriving while a slot is already occupied is coalesced away;
//! the in-flight pass ends with an authoritative refresh anyway.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::sync::{SyncEngine, SyncOutcome};

#[derive(Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<()>,
}

impl SyncTrigger {
    /// Request a sync pass. Returns false if the slot was already occupied
    /// (the request is dropped, not queued).
    pub fn trigger(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Spawn the background task that runs one pass per trigger.
pub fn spawn_scheduler(engine: Arc<SyncEngine>) -> (SyncTrigger, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(1);
    let handle = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            match engine.sync().await {
                Ok(SyncOutcome::Completed(report)) => {
                    info!(?report, "scheduled sync pass completed");
                }
                Ok(SyncOutcome::AlreadyRunning) => {}
                Err(e) => warn!(error = %e, "scheduled sync pass failed"),
            }
        }
    });
    (SyncTrigger { tx }, handle)
}
