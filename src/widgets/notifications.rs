//! Notification badge and list.
//!
//! Every tick replaces the local list with the server snapshot; the list is
//! short and re-rendering it is idempotent. User actions are
//! write-then-reflect: nothing local changes until the server confirms, so
//! a failure needs no rollback, only a notice.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::ActionOutcome;
use crate::net::api::{Api, ApiError};
use crate::net::types::{FriendAnswer, Id, Notification};
use crate::sync::events::{EventBus, WidgetEvent};
use crate::sync::liveness::LiveToken;
use crate::sync::view::ViewStore;
use crate::sync::{Reconcile, SyncLoop};

/// Counts above this show as `"99+"`.
pub const BADGE_CAP: u32 = 99;

/// Items shown in the compact list before the "and N more" line.
pub const DEFAULT_PREVIEW_LIMIT: usize = 3;

// =============================================================================
// VIEW
// =============================================================================

/// The header badge owned outside the notification list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Badge {
    pub text: String,
    pub visible: bool,
}

impl Badge {
    #[must_use]
    pub fn from_unread(unread: u32) -> Self {
        match unread {
            0 => Self::default(),
            n if n > BADGE_CAP => Self { text: format!("{BADGE_CAP}+"), visible: true },
            n => Self { text: n.to_string(), visible: true },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotificationView {
    pub unread: u32,
    /// Most recent first.
    pub items: Vec<Notification>,
    pub badge: Badge,
    /// Error text from the last failed user action.
    pub notice: Option<String>,
    /// A mark-all-read request is in flight.
    pub marking: bool,
}

impl NotificationView {
    /// First `limit` items and how many were left out.
    #[must_use]
    pub fn preview(&self, limit: usize) -> (&[Notification], usize) {
        let shown = self.items.len().min(limit);
        (&self.items[..shown], self.items.len() - shown)
    }

    fn set_unread(&mut self, unread: u32) {
        self.unread = unread;
        self.badge = Badge::from_unread(unread);
    }
}

// =============================================================================
// WIDGET
// =============================================================================

struct Inner {
    api: Arc<dyn Api>,
    events: EventBus,
    view: ViewStore<NotificationView>,
    sync: SyncLoop,
}

#[async_trait::async_trait]
impl Reconcile for Inner {
    async fn reconcile(&self, token: LiveToken) -> Result<(), ApiError> {
        let snapshot = self.api.notifications().await?;
        self.view.update_if_live(&token, |v| {
            v.set_unread(snapshot.unread);
            v.items = snapshot.items;
            true
        });
        Ok(())
    }
}

pub struct NotificationWidget {
    inner: Arc<Inner>,
}

impl NotificationWidget {
    /// Mount the widget and start polling every `interval`.
    #[must_use]
    pub fn mount(api: Arc<dyn Api>, events: EventBus, interval: Duration) -> Self {
        let inner = Arc::new(Inner {
            api,
            events,
            view: ViewStore::new(NotificationView::default()),
            sync: SyncLoop::new("notifications", interval),
        });
        inner.sync.start(inner.clone());
        Self { inner }
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<NotificationView> {
        self.inner.view.subscribe()
    }

    #[must_use]
    pub fn view(&self) -> NotificationView {
        self.inner.view.snapshot()
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        !self.inner.sync.liveness().is_closed()
    }

    /// Fetch now instead of waiting for the next tick (panel opened).
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the view keeps its previous contents.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let token = self.inner.sync.liveness().token();
        self.inner.reconcile(token).await
    }

    /// Mark everything read. Ignored while a previous request is in flight.
    ///
    /// # Errors
    ///
    /// Returns the request error; unread count and items are left untouched
    /// and the error is shown as the view's notice.
    pub async fn mark_all_read(&self) -> Result<ActionOutcome, ApiError> {
        let token = self.inner.sync.liveness().token();
        let started = self.inner.view.modify(|v| {
            if v.marking {
                return false;
            }
            v.marking = true;
            true
        });
        if !started {
            return Ok(ActionOutcome::Ignored);
        }

        let result = self.inner.api.mark_all_read().await;
        self.inner.view.update_if_live(&token, |v| {
            v.marking = false;
            match &result {
                Ok(()) => {
                    v.set_unread(0);
                    for item in &mut v.items {
                        item.read = true;
                    }
                    v.notice = None;
                }
                Err(err) => v.notice = Some(err.user_message()),
            }
            true
        });
        match result {
            Ok(()) => Ok(ActionOutcome::Applied),
            Err(err) => {
                warn!(error = %err, "mark all read failed");
                Err(err)
            }
        }
    }

    /// Delete every notification.
    ///
    /// # Errors
    ///
    /// Returns the request error; the list is left untouched.
    pub async fn clear_all(&self) -> Result<(), ApiError> {
        let token = self.inner.sync.liveness().token();
        let result = self.inner.api.clear_all().await;
        self.inner.view.update_if_live(&token, |v| {
            match &result {
                Ok(()) => {
                    v.items.clear();
                    v.set_unread(0);
                    v.notice = None;
                }
                Err(err) => v.notice = Some(err.user_message()),
            }
            true
        });
        result.inspect_err(|err| warn!(error = %err, "clear notifications failed"))
    }

    /// Accept a friend request, refresh the list and tell other widgets that
    /// the friend list changed.
    ///
    /// # Errors
    ///
    /// Returns the request error or the server's rejection.
    pub async fn accept_friend_request(&self, requester: Id) -> Result<(), ApiError> {
        self.answer(FriendAnswer::Accept, requester).await
    }

    /// Reject a friend request and refresh the list.
    ///
    /// # Errors
    ///
    /// Returns the request error or the server's rejection.
    pub async fn reject_friend_request(&self, requester: Id) -> Result<(), ApiError> {
        self.answer(FriendAnswer::Reject, requester).await
    }

    async fn answer(&self, answer: FriendAnswer, requester: Id) -> Result<(), ApiError> {
        let token = self.inner.sync.liveness().token();
        if let Err(err) = self.inner.api.answer_friend_request(answer, requester).await {
            warn!(?answer, %requester, error = %err, "friend request answer failed");
            self.inner.view.update_if_live(&token, |v| {
                v.notice = Some(err.user_message());
                true
            });
            return Err(err);
        }

        info!(?answer, %requester, "friend request answered");
        if answer == FriendAnswer::Accept {
            self.inner.events.publish(WidgetEvent::FriendsChanged);
        }
        self.inner.view.update_if_live(&token, |v| v.notice.take().is_some());
        if let Err(err) = self.inner.reconcile(token).await {
            warn!(error = %err, "refresh after friend request answer failed");
        }
        Ok(())
    }

    /// Stop polling and drop any late responses. Idempotent.
    pub fn unmount(&self) {
        self.inner.sync.close();
    }
}

impl Drop for NotificationWidget {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
#[path = "notifications_test.rs"]
mod tests;
