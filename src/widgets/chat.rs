//! Direct-message chat with one partner at a time.
//!
//! DESIGN
//! ======
//! The transcript is keyed by message id and kept sorted; the cursor is the
//! highest id seen. A tick with no cursor is a full reload that replaces
//! the transcript, otherwise it asks for `since_id = cursor` and merges.
//! Because the merge ignores ids already present and the cursor only moves
//! to `max(id)`, batches can arrive in any order.
//!
//! Switching partner advances the liveness generation, so anything still in
//! flight for the previous partner is dropped on arrival. The transcript is
//! cleared before the new partner's history is requested.
//!
//! ERROR HANDLING
//! ==============
//! `400` from the messages endpoint means the two users are no longer
//! friends: polling stops and the chat is disabled until another partner is
//! picked. Send failures are returned and shown as the view's notice.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::net::api::{Api, ApiError};
use crate::net::types::{Id, User, WireMessage};
use crate::sync::events::{EventBus, WidgetEvent};
use crate::sync::liveness::LiveToken;
use crate::sync::view::ViewStore;
use crate::sync::{Reconcile, SyncLoop, log_tick_failure};

pub const NOT_FRIENDS_NOTICE: &str = "you are no longer friends; chat disabled";

// =============================================================================
// VIEW
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollBehavior {
    /// Incremental growth.
    Smooth,
    /// Conversation switch or full reload.
    Immediate,
}

/// Request to scroll the transcript to the bottom. `seq` increases on every
/// request so renderers can tell two equal requests apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrollRequest {
    pub seq: u64,
    pub behavior: ScrollBehavior,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatLine {
    pub id: Id,
    pub sender_id: Id,
    pub mine: bool,
    pub content: String,
    pub timestamp: String,
}

impl ChatLine {
    fn from_wire(msg: WireMessage, me: Id) -> Self {
        let timestamp = msg.timestamp_display.or(msg.timestamp).unwrap_or_default();
        Self { id: msg.id, sender_id: msg.sender_id, mine: msg.sender_id == me, content: msg.content, timestamp }
    }

    /// `HH:MM` taken from an ISO (`2025-01-01T10:15:00Z`) or display
    /// (`01/01/2025 10:15:00`) timestamp; empty if neither shape matches.
    #[must_use]
    pub fn time_label(&self) -> &str {
        let time = self
            .timestamp
            .split_once('T')
            .or_else(|| self.timestamp.split_once(' '))
            .map_or("", |(_, rest)| rest);
        match time.get(..5) {
            Some(hhmm) if hhmm.as_bytes().get(2) == Some(&b':') => hhmm,
            _ => "",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatView {
    pub open: bool,
    pub partners: Vec<User>,
    pub partners_loaded: bool,
    pub partner: Option<Id>,
    /// Sorted by id, no duplicates.
    pub messages: Vec<ChatLine>,
    /// Highest message id seen for the current partner.
    pub cursor: Option<Id>,
    /// Set when the server reports the users are no longer friends.
    pub disabled: bool,
    pub notice: Option<String>,
    pub scroll: Option<ScrollRequest>,
}

impl ChatView {
    /// Merge a fetched batch. A full reload replaces the transcript.
    /// Returns the number of lines added.
    ///
    /// A full batch that ends below the current cursor arrived after newer
    /// data and is merged instead.
    pub fn merge(&mut self, batch: Vec<WireMessage>, me: Id, full: bool) -> usize {
        let batch_max = batch.iter().map(|m| m.id).max();
        let full = full && !(self.cursor.is_some() && self.cursor > batch_max);
        if full {
            self.messages.clear();
            self.cursor = None;
        }
        let mut added = 0;
        for msg in batch {
            self.cursor = self.cursor.max(Some(msg.id));
            if let Err(pos) = self.messages.binary_search_by_key(&msg.id, |line| line.id) {
                self.messages.insert(pos, ChatLine::from_wire(msg, me));
                added += 1;
            }
        }
        if full {
            self.request_scroll(ScrollBehavior::Immediate);
        } else if added > 0 {
            self.request_scroll(ScrollBehavior::Smooth);
        }
        added
    }

    fn request_scroll(&mut self, behavior: ScrollBehavior) {
        let seq = self.scroll.map_or(1, |s| s.seq + 1);
        self.scroll = Some(ScrollRequest { seq, behavior });
    }
}

// =============================================================================
// SEND GATE
// =============================================================================

/// Client-side minimum gap between sends.
pub struct SendGate {
    gap: Duration,
    last: Option<Instant>,
}

impl SendGate {
    #[must_use]
    pub fn new(gap: Duration) -> Self {
        Self { gap, last: None }
    }

    /// Claim the send slot at `now`. The window only moves on success.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.last.is_some_and(|last| now.duration_since(last) < self.gap) {
            return false;
        }
        self.last = Some(now);
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Dropped by the send gap.
    Debounced,
    /// Empty text, no partner, or chat disabled.
    Ignored,
}

// =============================================================================
// WIDGET
// =============================================================================

struct Inner {
    api: Arc<dyn Api>,
    me: Id,
    view: ViewStore<ChatView>,
    sync: SyncLoop,
    gate: Mutex<SendGate>,
}

impl Inner {
    async fn load_partners(&self, token: LiveToken) -> Result<(), ApiError> {
        let partners = self.api.friends().await?;
        debug!(count = partners.len(), "chat partners loaded");
        self.view.update_if_live(&token, |v| {
            v.partners = partners;
            v.partners_loaded = true;
            true
        });
        Ok(())
    }

    async fn load_messages(&self, token: LiveToken, full: bool) -> Result<(), ApiError> {
        let (partner, cursor) = self.view.read(|v| (v.partner, v.cursor));
        let Some(partner) = partner else {
            return Ok(());
        };
        let since = if full { None } else { cursor };

        match self.api.messages(partner, since).await {
            Ok(batch) => {
                self.view.update_if_live(&token, |v| {
                    if v.partner != Some(partner) {
                        return false;
                    }
                    let before = (v.messages.len(), v.cursor, v.scroll);
                    v.merge(batch, self.me, full);
                    before != (v.messages.len(), v.cursor, v.scroll)
                });
                Ok(())
            }
            Err(ApiError::Status { status: 400 }) => {
                let disabled = self.view.update_if_live(&token, |v| {
                    v.disabled = true;
                    v.notice = Some(NOT_FRIENDS_NOTICE.to_owned());
                    true
                });
                if disabled {
                    info!(%partner, "partner is no longer a friend; chat polling stopped");
                    self.sync.stop();
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait::async_trait]
impl Reconcile for Inner {
    async fn reconcile(&self, token: LiveToken) -> Result<(), ApiError> {
        let (open, disabled, partners_loaded, full) =
            self.view.read(|v| (v.open, v.disabled, v.partners_loaded, v.cursor.is_none()));
        if !open || disabled {
            return Ok(());
        }
        if !partners_loaded {
            if let Err(err) = self.load_partners(token.clone()).await {
                log_tick_failure("chat", &err);
            }
        }
        self.load_messages(token, full).await
    }
}

pub struct ChatWidget {
    inner: Arc<Inner>,
    listener: JoinHandle<()>,
}

impl ChatWidget {
    /// Mount a closed chat. Nothing is polled until [`ChatWidget::open`].
    #[must_use]
    pub fn mount(api: Arc<dyn Api>, events: &EventBus, me: Id, interval: Duration, send_gap: Duration) -> Self {
        let inner = Arc::new(Inner {
            api,
            me,
            view: ViewStore::new(ChatView::default()),
            sync: SyncLoop::new("chat", interval),
            gate: Mutex::new(SendGate::new(send_gap)),
        });
        let listener = tokio::spawn(listen_for_friend_changes(Arc::downgrade(&inner), events.subscribe()));
        Self { inner, listener }
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<ChatView> {
        self.inner.view.subscribe()
    }

    #[must_use]
    pub fn view(&self) -> ChatView {
        self.inner.view.snapshot()
    }

    /// Show the chat and start polling. The first tick loads the partner
    /// list and, if a partner is selected, its full history.
    pub fn open(&self) {
        self.inner.view.update(|v| v.open = true);
        self.ensure_polling();
    }

    /// Hide the chat. Polling stops now and in-flight responses are dropped.
    pub fn close(&self) {
        self.inner.sync.stop();
        self.inner.view.update(|v| v.open = false);
    }

    /// Switch conversation: clear the transcript, reset the cursor and load
    /// the new partner's full history.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the transcript stays empty until a later
    /// tick succeeds.
    pub async fn select_partner(&self, partner: Id) -> Result<(), ApiError> {
        let token = self.inner.sync.liveness().advance();
        self.inner.view.update(|v| {
            v.partner = Some(partner);
            v.messages.clear();
            v.cursor = None;
            v.disabled = false;
            v.notice = None;
        });
        debug!(%partner, "chat partner selected");
        self.ensure_polling();
        self.inner.load_messages(token, true).await
    }

    /// Run one incremental reconcile now.
    ///
    /// # Errors
    ///
    /// Returns the fetch error.
    pub async fn poll_now(&self) -> Result<(), ApiError> {
        let token = self.inner.sync.liveness().token();
        let full = self.inner.view.read(|v| v.cursor.is_none());
        self.inner.load_messages(token, full).await
    }

    /// Send `content` to the selected partner, then fetch new messages.
    ///
    /// # Errors
    ///
    /// Returns the request error or the server's rejection; the error is
    /// also shown as the view's notice.
    pub async fn send(&self, content: &str) -> Result<SendOutcome, ApiError> {
        let text = content.trim();
        let (partner, disabled) = self.inner.view.read(|v| (v.partner, v.disabled));
        let Some(partner) = partner.filter(|_| !text.is_empty() && !disabled) else {
            return Ok(SendOutcome::Ignored);
        };

        let acquired = self
            .inner
            .gate
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .try_acquire(Instant::now());
        if !acquired {
            debug!(%partner, "send dropped by send gap");
            return Ok(SendOutcome::Debounced);
        }

        let token = self.inner.sync.liveness().token();
        if let Err(err) = self.inner.api.send_message(partner, text).await {
            warn!(%partner, error = %err, "send failed");
            self.inner.view.update_if_live(&token, |v| {
                v.notice = Some(err.user_message());
                true
            });
            return Err(err);
        }

        self.inner.view.update_if_live(&token, |v| v.notice.take().is_some());
        let full = self.inner.view.read(|v| v.cursor.is_none());
        if let Err(err) = self.inner.load_messages(token, full).await {
            log_tick_failure("chat", &err);
        }
        Ok(SendOutcome::Sent)
    }

    /// Stop polling and drop late responses for good. Idempotent.
    pub fn unmount(&self) {
        self.inner.sync.close();
        self.listener.abort();
        self.inner.view.update(|v| v.open = false);
    }

    fn ensure_polling(&self) {
        let open = self.inner.view.read(|v| v.open);
        if open && !self.inner.sync.is_active() {
            self.inner.sync.start(self.inner.clone());
        }
    }
}

impl Drop for ChatWidget {
    fn drop(&mut self) {
        self.unmount();
    }
}

async fn listen_for_friend_changes(weak: Weak<Inner>, mut rx: tokio::sync::broadcast::Receiver<WidgetEvent>) {
    loop {
        match rx.recv().await {
            Ok(WidgetEvent::FriendsChanged) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
        let Some(inner) = weak.upgrade() else {
            break;
        };
        if inner.sync.liveness().is_closed() {
            break;
        }
        inner.view.update(|v| v.partners_loaded = false);
        if !inner.view.read(|v| v.open) {
            continue;
        }
        let token = inner.sync.liveness().token();
        if let Err(err) = inner.load_partners(token).await {
            log_tick_failure("chat", &err);
        }
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
