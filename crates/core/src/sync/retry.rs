//! Retry policy for remote writes.

use std::time::Duration;

/// Attempt budget for interactive saves.
pub const SAVE_MAX_ATTEMPTS: u32 = 3;

/// Reduced attempt budget when replaying queued failed writes.
pub const REPLAY_MAX_ATTEMPTS: u32 = 2;

/// Fixed base delay multiplied by the attempt index between retries.
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Backoff before the retry that follows `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(RETRY_BASE_DELAY_MS.saturating_mul(u64::from(attempt)))
}
