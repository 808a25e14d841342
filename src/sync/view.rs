//! Observable view state for one widget.
//!
//! A `watch` channel plays the role of the rendered DOM: the widget writes,
//! renderers subscribe and redraw on change. Writes from async completions
//! go through [`ViewStore::update_if_live`] so a stale response never
//! reaches the view.

use tokio::sync::watch;

use super::liveness::LiveToken;

pub struct ViewStore<V> {
    tx: watch::Sender<V>,
}

impl<V> ViewStore<V> {
    #[must_use]
    pub fn new(initial: V) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<V> {
        self.tx.subscribe()
    }

    /// Read the current view without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Unconditional local write (user action on the UI task).
    pub fn update(&self, f: impl FnOnce(&mut V)) {
        self.tx.send_modify(f);
    }

    /// Write only if `f` reports a change; subscribers are notified then.
    pub fn modify(&self, f: impl FnOnce(&mut V) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Like [`ViewStore::modify`], but a no-op once `token` is stale.
    pub fn update_if_live(&self, token: &LiveToken, f: impl FnOnce(&mut V) -> bool) -> bool {
        self.tx.send_if_modified(|view| token.is_live() && f(view))
    }
}

impl<V: Clone> ViewStore<V> {
    #[must_use]
    pub fn snapshot(&self) -> V {
        self.tx.borrow().clone()
    }
}
