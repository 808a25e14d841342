//! Fixed-interval poller owned by a single widget instance.
//!
//! DESIGN
//! ======
//! `start` spawns one timer task; each tick spawns the callback as its own
//! task. The first tick fires immediately, then every `interval`.
//!
//! TRADE-OFFS
//! ==========
//! Overlapping ticks are not suppressed: if a fetch takes longer than the
//! interval, two may be in flight at once. The reconcilers merge
//! idempotently, so the cost is at most a duplicate fetch. Stopping aborts
//! the timer only; callbacks already running finish and are expected to
//! check their liveness token before touching view state.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Smallest interval accepted; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub struct Poller {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    /// Run `callback` now and then every `interval`, replacing any schedule
    /// already running on this poller.
    pub fn start<F, Fut>(&mut self, interval: Duration, callback: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();
        let interval = interval.max(MIN_INTERVAL);
        let name = self.name;
        debug!(poller = name, interval_ms = interval.as_millis(), "poller started");

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tokio::spawn(callback());
            }
        }));
    }

    /// Cancel the schedule. Safe to call repeatedly or before `start`.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(poller = self.name, "poller stopped");
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "poller_test.rs"]
mod tests;
