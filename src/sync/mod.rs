//! Polling synchronization shared by every widget.
//!
//! ARCHITECTURE
//! ============
//! Each widget implements [`Reconcile`]: fetch from the server and merge the
//! result into its [`view::ViewStore`]. A [`SyncLoop`] pairs that reconciler
//! with a [`poller::Poller`] and a [`liveness::Liveness`] guard, so the three
//! widgets share one timer, one cancellation story and one failure policy.
//!
//! ERROR HANDLING
//! ==============
//! A failed tick is logged and otherwise ignored; the next tick is the
//! retry. There is no backoff.
//!
//! TRADE-OFFS
//! ==========
//! The liveness check runs inside the view write, but `stop` does not take
//! the view lock. On a multi-threaded runtime a completion that passed the
//! check can still land just after `stop` returns. Widgets are driven from
//! one task in practice, where that window does not exist.

pub mod events;
pub mod liveness;
pub mod poller;
pub mod view;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, warn};

use crate::net::api::ApiError;
use liveness::{LiveToken, Liveness};
use poller::Poller;

/// One fetch-and-merge pass for a widget.
#[async_trait::async_trait]
pub trait Reconcile: Send + Sync + 'static {
    /// Fetch server state and merge it into the view if `token` is still live.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the failed fetch; the caller logs it and
    /// waits for the next tick.
    async fn reconcile(&self, token: LiveToken) -> Result<(), ApiError>;
}

/// Log a failed reconciliation at a level matching its kind.
pub fn log_tick_failure(widget: &str, err: &ApiError) {
    match err {
        ApiError::NotJson { content_type } => {
            debug!(widget, %content_type, "non-JSON response; skipping this tick");
        }
        _ => {
            warn!(widget, code = err.error_code(), retryable = err.retryable(), error = %err, "reconcile failed");
        }
    }
}

pub struct SyncLoop {
    name: &'static str,
    interval: Duration,
    poller: Mutex<Poller>,
    liveness: Liveness,
}

impl SyncLoop {
    #[must_use]
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self { name, interval, poller: Mutex::new(Poller::new(name)), liveness: Liveness::new() }
    }

    fn poller(&self) -> MutexGuard<'_, Poller> {
        self.poller
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Start polling `target`. Each tick takes a fresh token, so a tick that
    /// outlives a later `stop` or `advance` cannot write.
    pub fn start<R: Reconcile>(&self, target: Arc<R>) {
        if self.liveness.is_closed() {
            return;
        }
        let name = self.name;
        let liveness = self.liveness.clone();
        self.poller().start(self.interval, move || {
            let target = target.clone();
            let token = liveness.token();
            async move {
                if let Err(err) = target.reconcile(token).await {
                    log_tick_failure(name, &err);
                }
            }
        });
    }

    /// Cancel the timer and invalidate in-flight ticks. The loop may be
    /// started again.
    pub fn stop(&self) {
        self.poller().stop();
        self.liveness.advance();
    }

    /// Stop for good (widget unmounted).
    pub fn close(&self) {
        self.poller().stop();
        self.liveness.close();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.poller().is_active()
    }
}
