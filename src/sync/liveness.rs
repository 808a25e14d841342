//! Generation-counter liveness guard for async completions.
//!
//! A [`LiveToken`] is taken when a request is issued and checked when its
//! response arrives. Advancing the generation (conversation switch, widget
//! hidden) or closing the guard (widget unmounted) turns every outstanding
//! token stale, so late responses are dropped instead of resurrecting state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
struct Shared {
    generation: AtomicU64,
    closed: AtomicBool,
}

#[derive(Clone, Default)]
pub struct Liveness {
    shared: Arc<Shared>,
}

impl Liveness {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for the current generation.
    #[must_use]
    pub fn token(&self) -> LiveToken {
        LiveToken { generation: self.shared.generation.load(Ordering::SeqCst), shared: self.shared.clone() }
    }

    /// Invalidate all outstanding tokens and return one for the new generation.
    pub fn advance(&self) -> LiveToken {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        LiveToken { generation, shared: self.shared.clone() }
    }

    /// Invalidate all tokens, past and future.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct LiveToken {
    generation: u64,
    shared: Arc<Shared>,
}

impl LiveToken {
    #[must_use]
    pub fn is_live(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst) && self.shared.generation.load(Ordering::SeqCst) == self.generation
    }
}

#[cfg(test)]
#[path = "liveness_test.rs"]
mod tests;
