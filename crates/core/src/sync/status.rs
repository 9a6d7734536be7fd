//! Observable sync health exposed to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lightweight sync status published by the engine after every remote leg.
///
/// A permanently failing remote is otherwise silent (the app keeps running
/// from local state); this signal is how a shell surfaces the gap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub last_success_at: Option<DateTime<Utc>>,
    pub pending_queue_len: usize,
    pub last_error: Option<String>,
}
