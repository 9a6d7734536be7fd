//! Trait seams between the sync engine and its collaborators: on-device
//! snapshot storage, the remote per-user record, and the identity boundary.

use async_trait::async_trait;
use std::sync::{PoisonError, RwLock};

use crate::appdata::AppData;
use crate::sync::queue::FailedSyncRecord;

/// On-device persistent storage for the app-data document and the failure
/// queue. Synchronous, no network.
///
/// Local storage problems never surface to callers: `read` substitutes the
/// per-field defaults and `write` drops the failing slot, so every method is
/// infallible at this boundary.
pub trait SnapshotStore: Send + Sync {
    /// Read the current document; missing or corrupt slots yield defaults.
    fn read(&self) -> AppData;

    /// Persist the whole document, one slot per top-level field.
    fn write(&self, data: &AppData);

    /// Load the durable queue of remote writes that exhausted their retries.
    fn load_failure_queue(&self) -> Vec<FailedSyncRecord>;

    /// Replace the durable failure queue.
    fn store_failure_queue(&self, queue: &[FailedSyncRecord]);
}

/// Remote per-user record keyed by user id, holding the whole document.
#[async_trait]
pub trait RemoteRecordStore: Send + Sync {
    /// Read the record for `user_id`. Any error (network, auth, absent row)
    /// collapses to `None`.
    async fn fetch(&self, user_id: &str) -> Option<AppData>;

    /// Insert-or-replace the record for `user_id`, stamping an updated-at
    /// time remotely. An acknowledged write is `Ok`; anything else is an
    /// error message for the failure queue.
    async fn upsert(&self, user_id: &str, data: &AppData) -> Result<(), String>;
}

/// The single capability consumed from the authentication subsystem.
pub trait IdentityProvider: Send + Sync {
    /// Current authenticated user id, or `None` for guest sessions.
    fn current_user_id(&self) -> Option<String>;
}

/// Session-scoped identity handle owned by the application entry point and
/// shared by reference with the engine. Replaces ambient session globals.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    user_id: RwLock<Option<String>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self
            .user_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *self
            .user_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
