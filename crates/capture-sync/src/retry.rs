//! Backoff between automatic re-drains.
//!
//! After a pass that leaves retryable failures behind, the coordinator
//! schedules another drain after the next delay of an exponential
//! sequence. A clean pass resets the sequence; an exhausted sequence
//! stops automatic retries until the next reconnect or manual sync.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use tokio::task::JoinHandle;

use crate::config::SyncConfig;

pub(crate) struct RetrySchedule {
    builder: ExponentialBuilder,
    backoff: Option<ExponentialBackoff>,
    pending: Option<JoinHandle<()>>,
}

impl RetrySchedule {
    pub(crate) fn new(config: &SyncConfig) -> Self {
        let builder = ExponentialBuilder::default()
            .with_min_delay(config.retry_min_delay)
            .with_max_delay(config.retry_max_delay)
            .with_max_times(config.retry_max_times);
        Self {
            builder,
            backoff: None,
            pending: None,
        }
    }

    /// Next delay, or `None` once the sequence is used up. Using it up
    /// also resets it so the next reconnect starts from the minimum.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if self.backoff.is_none() {
            self.backoff = Some(self.builder.clone().build());
        }
        let delay = self.backoff.as_mut().and_then(|b| b.next());
        if delay.is_none() {
            self.backoff = None;
        }
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.backoff = None;
        self.cancel();
    }

    /// Replace the scheduled re-drain, if any.
    pub(crate) fn set_pending(&mut self, handle: JoinHandle<()>) {
        self.cancel();
        self.pending = Some(handle);
    }

    /// Forget the scheduled re-drain without aborting it. Called by the
    /// re-drain itself once it starts.
    pub(crate) fn clear_pending(&mut self) {
        self.pending = None;
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SyncConfig {
        SyncConfig {
            retry_min_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(3),
            retry_max_times: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let mut schedule = RetrySchedule::new(&config());
        let delays: Vec<_> = std::iter::from_fn(|| schedule.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(3),
            ]
        );
    }

    #[test]
    fn test_reset_starts_over() {
        let mut schedule = RetrySchedule::new(&config());
        schedule.next_delay();
        schedule.next_delay();
        schedule.reset();
        assert_eq!(schedule.next_delay(), Some(Duration::from_secs(1)));
    }
}
