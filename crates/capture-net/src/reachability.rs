//! Reachability tracking.
//!
//! [`ReachabilityMonitor`] keeps the last observed online/offline value and
//! calls subscribers only when it flips. Observations come from two
//! sources feeding the same state: periodic probes ([`spawn_polling`]) and
//! platform connectivity events ([`report_platform_change`]). The first
//! observation only establishes the baseline.
//!
//! [`spawn_polling`]: ReachabilityMonitor::spawn_polling
//! [`report_platform_change`]: ReachabilityMonitor::report_platform_change

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::probe::Probe;

type Callback = Arc<dyn Fn(bool) + Send + Sync>;

struct Inner {
    probe: Arc<dyn Probe>,
    last: Mutex<Option<bool>>,
    subscribers: Mutex<BTreeMap<u64, Callback>>,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct ReachabilityMonitor {
    inner: Arc<Inner>,
}

/// Keeps a reachability callback registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            if let Ok(mut subs) = inner.subscribers.lock() {
                subs.remove(&self.id);
            }
        }
    }
}

impl ReachabilityMonitor {
    pub fn new(probe: Arc<dyn Probe>) -> Self {
        Self {
            inner: Arc::new(Inner {
                probe,
                last: Mutex::new(None),
                subscribers: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Last observed value; `false` until something has been observed.
    pub fn is_online(&self) -> bool {
        self.inner
            .last
            .lock()
            .map(|last| last.unwrap_or(false))
            .unwrap_or(false)
    }

    /// Probe now, record the result, and return it.
    pub async fn check_now(&self) -> bool {
        let online = self.inner.probe.probe().await;
        self.observe(online);
        online
    }

    /// Feed a connectivity change reported by the host platform.
    pub fn report_platform_change(&self, online: bool) {
        self.observe(online);
    }

    /// Register `callback` for flips of the observed value.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut subs) = self.inner.subscribers.lock() {
            subs.insert(id, Arc::new(callback));
        }
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Probe every `interval` in a background task.
    pub fn spawn_polling(&self, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.check_now().await;
            }
        })
    }

    fn observe(&self, online: bool) {
        let previous = match self.inner.last.lock() {
            Ok(mut last) => last.replace(online),
            Err(_) => return,
        };

        match previous {
            None => {
                info!(online, "Initial reachability");
                return;
            }
            Some(prev) if prev == online => {
                debug!(online, "Reachability unchanged");
                return;
            }
            Some(_) => info!(online, "Reachability changed"),
        }

        // Call outside the lock so callbacks may subscribe or unsubscribe.
        let callbacks: Vec<Callback> = match self.inner.subscribers.lock() {
            Ok(subs) => subs.values().cloned().collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(online);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    struct ScriptedProbe {
        answers: Mutex<VecDeque<bool>>,
    }

    impl ScriptedProbe {
        fn new(answers: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.iter().copied().collect()),
            })
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self) -> bool {
            self.answers.lock().unwrap().pop_front().unwrap_or(false)
        }
    }

    fn recorder(monitor: &ReachabilityMonitor) -> (Subscription, Arc<Mutex<Vec<bool>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = monitor.subscribe(move |online| sink.lock().unwrap().push(online));
        (sub, seen)
    }

    #[tokio::test]
    async fn test_callbacks_fire_only_on_flips() {
        let monitor = ReachabilityMonitor::new(ScriptedProbe::new(&[
            false, false, true, true, true, false, true,
        ]));
        let (_sub, seen) = recorder(&monitor);

        for _ in 0..7 {
            monitor.check_now().await;
        }

        assert_eq!(*seen.lock().unwrap(), vec![true, false, true]);
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_first_observation_is_baseline() {
        let monitor = ReachabilityMonitor::new(ScriptedProbe::new(&[true]));
        let (_sub, seen) = recorder(&monitor);

        assert!(!monitor.is_online());
        assert!(monitor.check_now().await);
        assert!(seen.lock().unwrap().is_empty());
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_platform_events_share_state_with_probes() {
        let monitor = ReachabilityMonitor::new(ScriptedProbe::new(&[false, true]));
        let (_sub, seen) = recorder(&monitor);

        monitor.check_now().await;
        monitor.report_platform_change(true);
        // The probe agrees with the platform event: no second flip.
        monitor.check_now().await;

        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let monitor = ReachabilityMonitor::new(ScriptedProbe::new(&[]));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = monitor.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(monitor.subscriber_count(), 1);

        monitor.report_platform_change(false);
        monitor.report_platform_change(true);
        sub.unsubscribe();
        monitor.report_platform_change(false);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_drives_probes() {
        let monitor = ReachabilityMonitor::new(ScriptedProbe::new(&[false, true, true, true]));
        let (_sub, seen) = recorder(&monitor);

        // Ticks at 0s, 30s and 60s.
        let handle = monitor.spawn_polling(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(75)).await;
        handle.abort();

        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }
}
