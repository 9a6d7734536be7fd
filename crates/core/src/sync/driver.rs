//! Periodic reconciliation driver: a background loop that drains the
//! failure queue on a fixed cadence and on host signals (became visible,
//! regained network).

use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use super::engine::SyncEngine;
use super::scheduler::{DRAIN_DEBOUNCE_SECS, RECONCILE_INTERVAL_SECS};

/// Owns the background drain task. Start is idempotent; a finished task is
/// respawned. Guest sessions make every pass a no-op (the identity check
/// lives in `drain_queue`).
pub struct ReconciliationDriver {
    engine: Arc<SyncEngine>,
    background_task: Mutex<Option<JoinHandle<()>>>,
    wake: Arc<Notify>,
}

impl ReconciliationDriver {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            background_task: Mutex::new(None),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Request an immediate drain, e.g. when the host reports the app became
    /// visible or the network came back. Debounced against the interval loop.
    pub fn request_drain(&self) {
        self.wake.notify_one();
    }

    /// Spawn the drain loop if it is not already running.
    pub async fn start(&self) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let engine = Arc::clone(&self.engine);
        let wake = Arc::clone(&self.wake);
        let handle = tokio::spawn(async move {
            let mut last_drain: Option<Instant> = None;
            loop {
                let woken = tokio::select! {
                    _ = sleep(Duration::from_secs(RECONCILE_INTERVAL_SECS)) => false,
                    _ = wake.notified() => true,
                };

                if woken {
                    if let Some(at) = last_drain {
                        if at.elapsed() < Duration::from_secs(DRAIN_DEBOUNCE_SECS) {
                            debug!("[Sync] Drain signal inside debounce window; coalescing");
                            continue;
                        }
                    }
                    debug!("[Sync] Host signal triggered a drain");
                }

                let cleared = engine.drain_queue().await;
                if cleared > 0 {
                    info!("[Sync] Reconciliation cleared {} queued write(s)", cleared);
                }
                last_drain = Some(Instant::now());
            }
        });
        *guard = Some(handle);
    }

    /// Abort the drain loop.
    pub async fn stop(&self) {
        if let Some(handle) = self.background_task.lock().await.take() {
            handle.abort();
        }
    }
}
