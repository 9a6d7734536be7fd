//! Sync engine: load/save/update orchestration over the snapshot store and
//! the remote record, with retry, failure queuing, and drain.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, timeout};

use crate::appdata::AppData;

use super::queue::{prune_expired, prune_superseded, FailedSyncRecord};
use super::retry::{backoff_delay, REPLAY_MAX_ATTEMPTS, SAVE_MAX_ATTEMPTS};
use super::scheduler::{QUEUE_MAX_AGE_HOURS, REMOTE_ATTEMPT_TIMEOUT_SECS};
use super::status::SyncStatus;
use super::stores::{IdentityProvider, RemoteRecordStore, SnapshotStore};

/// Coordinates the local snapshot store (durability floor) with the remote
/// per-user record (best-effort mirror).
///
/// Constructed explicitly by the application entry point; all collaborators
/// are injected, none are ambient.
pub struct SyncEngine {
    snapshots: Arc<dyn SnapshotStore>,
    remote: Arc<dyn RemoteRecordStore>,
    identity: Arc<dyn IdentityProvider>,
    drain_lock: Mutex<()>,
    status_tx: watch::Sender<SyncStatus>,
}

impl SyncEngine {
    pub fn new(
        snapshots: Arc<dyn SnapshotStore>,
        remote: Arc<dyn RemoteRecordStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::default());
        Self {
            snapshots,
            remote,
            identity,
            drain_lock: Mutex::new(()),
            status_tx,
        }
    }

    /// Observe sync health: last successful remote write, queued-write count,
    /// last error.
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Load the current document. Remote is the source of truth whenever
    /// reachable: a successful fetch overwrites the local snapshot. On a
    /// miss (absent row, offline, error) the local value is returned and
    /// pushed back to self-heal a missing remote row.
    pub async fn load(&self) -> AppData {
        let Some(user_id) = self.identity.current_user_id() else {
            debug!("[Sync] Guest session; loading local snapshot only");
            return self.snapshots.read();
        };

        match timeout(attempt_timeout(), self.remote.fetch(&user_id)).await {
            Ok(Some(mut remote)) => {
                remote.normalize();
                self.snapshots.write(&remote);
                debug!("[Sync] Remote document loaded for user {}", user_id);
                remote
            }
            Ok(None) | Err(_) => {
                let local = self.snapshots.read();
                debug!("[Sync] Remote unreachable or empty; serving local snapshot");
                // Best-effort push of the local value; outcome intentionally ignored.
                let _ = timeout(attempt_timeout(), self.remote.upsert(&user_id, &local)).await;
                local
            }
        }
    }

    /// Persist `data`. The local write always happens first and cannot fail
    /// observably, so the returned flag only reports the remote mirror.
    /// Guest saves are complete once local storage has the data.
    pub async fn save(&self, data: &AppData) -> bool {
        self.snapshots.write(data);

        let Some(user_id) = self.identity.current_user_id() else {
            return true;
        };

        let saved_at = Utc::now();
        match self
            .push_with_retry(&user_id, data, SAVE_MAX_ATTEMPTS)
            .await
        {
            Ok(()) => {
                self.drop_superseded(&user_id, saved_at);
                self.publish_success();
                true
            }
            Err(error) => {
                warn!(
                    "[Sync] Remote write for user {} failed after {} attempt(s): {}",
                    user_id, SAVE_MAX_ATTEMPTS, error
                );
                self.enqueue_failure(&user_id, data.clone(), saved_at, error);
                false
            }
        }
    }

    /// The only mutation entrypoint: re-derive the whole document through
    /// `transform` and save it. Not atomic across concurrent callers; the
    /// last writer wins at the save level.
    pub async fn update<F>(&self, transform: F) -> AppData
    where
        F: FnOnce(AppData) -> AppData,
    {
        let current = self.load().await;
        let mut next = transform(current);
        next.normalize();
        self.save(&next).await;
        next
    }

    /// Sign-in hook: reconcile with the remote record, then replay anything
    /// still parked in the failure queue.
    pub async fn bootstrap(&self) -> AppData {
        let data = self.load().await;
        self.drain_queue().await;
        data
    }

    /// Replay queued failed writes for the current identity. Records past
    /// the age limit are dropped without a retry attempt. Returns how many
    /// records a successful retry cleared. No-op for guests.
    pub async fn drain_queue(&self) -> usize {
        let Some(user_id) = self.identity.current_user_id() else {
            return 0;
        };
        let _guard = self.drain_lock.lock().await;

        let mut queue = self.snapshots.load_failure_queue();
        let expired = prune_expired(&mut queue, Utc::now(), QUEUE_MAX_AGE_HOURS);
        if expired > 0 {
            info!("[Sync] Dropped {} expired queued write(s)", expired);
            self.snapshots.store_failure_queue(&queue);
        }

        let mut eligible: Vec<FailedSyncRecord> = queue
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        eligible.sort_by_key(|record| record.timestamp);

        let mut cleared = 0;
        for record in eligible {
            match self
                .push_with_retry(&user_id, &record.data, REPLAY_MAX_ATTEMPTS)
                .await
            {
                Ok(()) => {
                    self.drop_superseded(&user_id, record.timestamp);
                    self.publish_success();
                    cleared += 1;
                }
                Err(error) => {
                    debug!("[Sync] Queued write {} still failing: {}", record.id, error);
                }
            }
        }

        let pending = self.snapshots.load_failure_queue().len();
        self.status_tx
            .send_modify(|status| status.pending_queue_len = pending);
        cleared
    }

    /// Upsert with up to `max_attempts` tries, each raced against the
    /// attempt timeout, with backoff between attempts. A timeout, an
    /// explicit error, and an unexpected status all retry identically.
    async fn push_with_retry(
        &self,
        user_id: &str,
        data: &AppData,
        max_attempts: u32,
    ) -> Result<(), String> {
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match timeout(attempt_timeout(), self.remote.upsert(user_id, data)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(error)) => last_error = error,
                Err(_) => last_error = "remote write timed out".to_string(),
            }
            debug!(
                "[Sync] Upsert attempt {}/{} for user {} failed: {}",
                attempt, max_attempts, user_id, last_error
            );
            if attempt < max_attempts {
                sleep(backoff_delay(attempt)).await;
            }
        }
        Err(last_error)
    }

    fn enqueue_failure(
        &self,
        user_id: &str,
        data: AppData,
        timestamp: DateTime<Utc>,
        error: String,
    ) {
        let mut queue = self.snapshots.load_failure_queue();
        queue.push(FailedSyncRecord::new(user_id, data, timestamp, error.clone()));
        self.snapshots.store_failure_queue(&queue);

        let pending = queue.len();
        self.status_tx.send_modify(|status| {
            status.pending_queue_len = pending;
            status.last_error = Some(error);
        });
    }

    fn drop_superseded(&self, user_id: &str, as_of: DateTime<Utc>) {
        let mut queue = self.snapshots.load_failure_queue();
        if prune_superseded(&mut queue, user_id, as_of) > 0 {
            self.snapshots.store_failure_queue(&queue);
        }
    }

    fn publish_success(&self) {
        let pending = self.snapshots.load_failure_queue().len();
        self.status_tx.send_modify(|status| {
            status.last_success_at = Some(Utc::now());
            status.pending_queue_len = pending;
            status.last_error = None;
        });
    }
}

fn attempt_timeout() -> Duration {
    Duration::from_secs(REMOTE_ATTEMPT_TIMEOUT_SECS)
}
