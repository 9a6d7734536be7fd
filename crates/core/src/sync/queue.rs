//! Durable queue of remote writes that exhausted their retries.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::appdata::AppData;

/// A remote write whose retries were exhausted, parked durably until the
/// reconciliation driver replays it or it ages out.
///
/// Each record carries a unique id; removal on success is by supersession
/// (same user, timestamp at or before the write that succeeded) rather than
/// a time-window guess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedSyncRecord {
    pub id: Uuid,
    pub user_id: String,
    pub data: AppData,
    pub timestamp: DateTime<Utc>,
    pub error: String,
}

impl FailedSyncRecord {
    pub fn new(
        user_id: impl Into<String>,
        data: AppData,
        timestamp: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            data,
            timestamp,
            error: error.into(),
        }
    }
}

/// Drop records older than `max_age_hours`; returns how many were removed.
/// Expiry is terminal regardless of whether a retry would now succeed.
pub fn prune_expired(
    queue: &mut Vec<FailedSyncRecord>,
    now: DateTime<Utc>,
    max_age_hours: i64,
) -> usize {
    let cutoff = now - Duration::hours(max_age_hours);
    let before = queue.len();
    queue.retain(|record| record.timestamp > cutoff);
    before - queue.len()
}

/// Drop every record for `user_id` superseded by a whole-document write that
/// succeeded with document timestamp `as_of`; returns how many were removed.
/// Newer queued records still carry data the remote has not seen and survive.
pub fn prune_superseded(
    queue: &mut Vec<FailedSyncRecord>,
    user_id: &str,
    as_of: DateTime<Utc>,
) -> usize {
    let before = queue.len();
    queue.retain(|record| record.user_id != user_id || record.timestamp > as_of);
    before - queue.len()
}
