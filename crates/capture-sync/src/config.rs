use std::time::Duration;

use capture_shared::constants::{CALL_TIMEOUT_SECS, DRAIN_DEADLINE_SECS, MAX_ATTEMPTS};

/// Tuning for the queue coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Limit on each upload and each field update.
    pub call_timeout: Duration,

    /// A drain stops starting new attempts once it has run this long.
    pub drain_deadline: Duration,

    /// Failed attempts after which an item is parked as `needs_attention`.
    pub max_attempts: u32,

    /// First delay before an automatic re-drain after failures.
    pub retry_min_delay: Duration,

    /// Cap on the automatic re-drain delay.
    pub retry_max_delay: Duration,

    /// Automatic re-drains in a row before waiting for the next reconnect.
    pub retry_max_times: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(CALL_TIMEOUT_SECS),
            drain_deadline: Duration::from_secs(DRAIN_DEADLINE_SECS),
            max_attempts: MAX_ATTEMPTS,
            retry_min_delay: Duration::from_secs(5),
            retry_max_delay: Duration::from_secs(300),
            retry_max_times: 10,
        }
    }
}
