//! Like counters with optimistic toggles.
//!
//! DESIGN
//! ======
//! A toggle flips the local state and adjusts the count by one before the
//! request goes out. The control is `Pending` until the response arrives;
//! further toggles on it are ignored so deltas never stack. On success the
//! server's count and liked flag replace the guess, on any failure the
//! pre-toggle state is restored as a whole.
//!
//! The background poll fetches the full like map and overwrites every
//! tracked `Idle` control that drifted. Posts missing from the map keep
//! their last known state. Pending controls are skipped: their outcome is
//! decided by the toggle response. Each control carries a version that
//! moves whenever a toggle settles or the post is re-tracked; a map fetched
//! under an older version is not applied to it, so a poll issued just
//! before a toggle cannot undo the confirmed result.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::ActionOutcome;
use crate::net::api::{Api, ApiError};
use crate::net::types::{Id, PostLikes};
use crate::sync::liveness::LiveToken;
use crate::sync::view::ViewStore;
use crate::sync::{Reconcile, SyncLoop};

const LIKED_MISMATCH: &str = "like state changed on the server";

// =============================================================================
// VIEW
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LikePhase {
    #[default]
    Idle,
    /// A toggle is in flight; the control is disabled.
    Pending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LikeState {
    pub post_id: Id,
    pub count: u64,
    pub liked_by: BTreeSet<Id>,
}

impl LikeState {
    #[must_use]
    pub fn is_liked(&self, user: Id) -> bool {
        self.liked_by.contains(&user)
    }

    fn from_server(post_id: Id, remote: &PostLikes) -> Self {
        Self { post_id, count: remote.likes, liked_by: remote.liked_by() }
    }

    fn set_liked(&mut self, user: Id, liked: bool) {
        if liked {
            self.liked_by.insert(user);
        } else {
            self.liked_by.remove(&user);
        }
    }

    /// Local guess for a toggle by `user`.
    fn flip(&mut self, user: Id) {
        if self.is_liked(user) {
            self.liked_by.remove(&user);
            self.count = self.count.saturating_sub(1);
        } else {
            self.liked_by.insert(user);
            self.count += 1;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LikeControl {
    pub state: LikeState,
    pub phase: LikePhase,
    /// Changes when a toggle settles or the post is re-tracked.
    pub version: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LikeView {
    pub posts: BTreeMap<Id, LikeControl>,
    /// Last version handed out; versions never repeat within a view.
    stamp: u64,
}

impl LikeView {
    fn next_version(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }

    fn versions(&self) -> HashMap<Id, u64> {
        self.posts.iter().map(|(post, c)| (*post, c.version)).collect()
    }

    /// Overwrite idle controls with the server map. `issued` holds each
    /// control's version when the map was requested; controls that moved
    /// since are left alone. Returns whether anything changed.
    fn apply_server_map(&mut self, map: &HashMap<Id, PostLikes>, issued: &HashMap<Id, u64>) -> bool {
        let mut changed = false;
        for (post, control) in &mut self.posts {
            if control.phase == LikePhase::Pending || issued.get(post) != Some(&control.version) {
                continue;
            }
            let Some(remote) = map.get(post) else {
                continue;
            };
            let fresh = LikeState::from_server(*post, remote);
            if control.state != fresh {
                control.state = fresh;
                changed = true;
            }
        }
        changed
    }
}

// =============================================================================
// WIDGET
// =============================================================================

struct Inner {
    api: Arc<dyn Api>,
    view: ViewStore<LikeView>,
    sync: SyncLoop,
}

#[async_trait::async_trait]
impl Reconcile for Inner {
    async fn reconcile(&self, token: LiveToken) -> Result<(), ApiError> {
        let issued = self.view.read(LikeView::versions);
        let map = self.api.post_likes().await?;
        self.view.update_if_live(&token, |v| v.apply_server_map(&map, &issued));
        Ok(())
    }
}

pub struct LikeWidget {
    inner: Arc<Inner>,
    me: Id,
}

impl LikeWidget {
    /// Mount with no tracked posts and start the background poll.
    #[must_use]
    pub fn mount(api: Arc<dyn Api>, me: Id, interval: Duration) -> Self {
        let inner = Arc::new(Inner {
            api,
            view: ViewStore::new(LikeView::default()),
            sync: SyncLoop::new("likes", interval),
        });
        inner.sync.start(inner.clone());
        Self { inner, me }
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<LikeView> {
        self.inner.view.subscribe()
    }

    #[must_use]
    pub fn view(&self) -> LikeView {
        self.inner.view.snapshot()
    }

    /// Register a post with its server-rendered count and liked flag.
    /// Re-tracking an idle post replaces its state; a pending one is left
    /// alone.
    pub fn track(&self, post: Id, count: u64, liked: bool) {
        let me = self.me;
        self.inner.view.modify(|v| {
            let previous = v.posts.get(&post);
            if previous.is_some_and(|c| c.phase == LikePhase::Pending) {
                return false;
            }
            let liked_by = if liked { BTreeSet::from([me]) } else { BTreeSet::new() };
            let state = LikeState { post_id: post, count, liked_by };
            if previous.is_some_and(|c| c.state == state) {
                return false;
            }
            let version = v.next_version();
            v.posts.insert(post, LikeControl { state, phase: LikePhase::Idle, version });
            true
        });
    }

    pub fn untrack(&self, post: Id) {
        self.inner.view.modify(|v| v.posts.remove(&post).is_some());
    }

    /// Track every post the server knows about.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; nothing is tracked then.
    pub async fn seed(&self) -> Result<usize, ApiError> {
        let token = self.inner.sync.liveness().token();
        let issued = self.inner.view.read(LikeView::versions);
        let map = self.inner.api.post_likes().await?;
        let count = map.len();
        self.inner.view.update_if_live(&token, |v| {
            v.apply_server_map(&map, &issued);
            for (post, remote) in &map {
                if !v.posts.contains_key(post) {
                    let version = v.next_version();
                    let state = LikeState::from_server(*post, remote);
                    v.posts.insert(*post, LikeControl { state, phase: LikePhase::Idle, version });
                }
            }
            true
        });
        debug!(count, "like controls seeded");
        Ok(count)
    }

    /// Fetch the like map now instead of waiting for the next tick.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the view is left untouched.
    pub async fn poll_now(&self) -> Result<(), ApiError> {
        let token = self.inner.sync.liveness().token();
        self.inner.reconcile(token).await
    }

    /// Toggle the current user's like on `post`.
    ///
    /// Ignored for untracked posts and while a previous toggle on the same
    /// post is pending.
    ///
    /// # Errors
    ///
    /// Returns the request error, the server's rejection, or a rejection
    /// when the confirmed liked flag disagrees with the guess. The control
    /// is rolled back in every error case.
    pub async fn toggle(&self, post: Id) -> Result<ActionOutcome, ApiError> {
        let me = self.me;
        let token = self.inner.sync.liveness().token();
        let mut snapshot = None;
        self.inner.view.modify(|v| {
            let Some(control) = v.posts.get_mut(&post) else {
                return false;
            };
            if control.phase == LikePhase::Pending {
                return false;
            }
            snapshot = Some(control.state.clone());
            control.state.flip(me);
            control.phase = LikePhase::Pending;
            true
        });
        let Some(snapshot) = snapshot else {
            return Ok(ActionOutcome::Ignored);
        };
        let expected = !snapshot.is_liked(me);

        let result = self
            .inner
            .api
            .toggle_like(post)
            .await
            .and_then(|confirmed| {
                if confirmed.liked == expected {
                    Ok(confirmed)
                } else {
                    Err(ApiError::Rejected(LIKED_MISMATCH.to_owned()))
                }
            });

        self.inner.view.update_if_live(&token, |v| {
            let version = v.next_version();
            let Some(control) = v.posts.get_mut(&post) else {
                return false;
            };
            control.phase = LikePhase::Idle;
            control.version = version;
            match &result {
                Ok(confirmed) => {
                    control.state.count = confirmed.likes;
                    control.state.set_liked(me, confirmed.liked);
                }
                Err(_) => control.state = snapshot,
            }
            true
        });

        match result {
            Ok(_) => Ok(ActionOutcome::Applied),
            Err(err) => {
                warn!(%post, error = %err, "like toggle failed; rolled back");
                Err(err)
            }
        }
    }

    /// Stop polling and drop late responses. Idempotent.
    pub fn unmount(&self) {
        self.inner.sync.close();
    }
}

impl Drop for LikeWidget {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
#[path = "likes_test.rs"]
mod tests;
