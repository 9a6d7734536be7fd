//! Cadence constants for the reconciliation driver.

/// Background drain cadence in seconds.
pub const RECONCILE_INTERVAL_SECS: u64 = 30;

/// Minimum gap between a completed drain and a signal-triggered one;
/// wakes inside this window are coalesced into the next interval tick.
pub const DRAIN_DEBOUNCE_SECS: u64 = 5;

/// Failure-queue records older than this are dropped without a retry.
pub const QUEUE_MAX_AGE_HOURS: i64 = 24;

/// Application-level timeout raced against every remote attempt.
pub const REMOTE_ATTEMPT_TIMEOUT_SECS: u64 = 10;
