//! In-memory [`Api`] used by widget tests.
//!
//! The mock keeps a tiny model of the server (notifications, friends,
//! messages, likes) and lets a test inject one-shot failures or hold a
//! request in flight until the test releases it. Results are computed when
//! the request is issued, before any hold, so a held response is stale by
//! the time it is delivered.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use super::api::{Api, ApiError};
use super::types::{
    FriendAnswer, Id, Notification, NotificationKind, NotificationsResponse, PostLikes, ToggleLikeResponse, User,
    WireMessage,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Notifications,
    MarkAllRead,
    ClearAll,
    FriendAnswer,
    Friends,
    Messages,
    Send,
    PostLikes,
    ToggleLike,
}

#[derive(Default)]
pub struct MockState {
    pub me: Id,
    pub notifications: Vec<Notification>,
    pub friends: Vec<User>,
    /// Conversation transcripts keyed by partner id.
    pub messages: BTreeMap<Id, Vec<WireMessage>>,
    pub next_message_id: u64,
    pub likes: BTreeMap<Id, BTreeSet<Id>>,
    pub answered: Vec<(FriendAnswer, Id)>,
    pub sent: Vec<(Id, String)>,
    failures: HashMap<Endpoint, VecDeque<ApiError>>,
}

impl MockState {
    pub fn push_notification(&mut self, id: u64, text: &str, kind: NotificationKind, actor: Option<Id>) {
        self.notifications.insert(
            0,
            Notification {
                id: Id(id),
                text: text.to_owned(),
                kind,
                actor_id: actor,
                read: false,
                timestamp_display: Some("01/01/2025 10:00".to_owned()),
                timestamp: None,
            },
        );
    }

    /// Append a message to the conversation with `partner` and return its id.
    pub fn push_message(&mut self, partner: Id, sender: Id, content: &str) -> Id {
        self.next_message_id += 1;
        let id = Id(self.next_message_id);
        self.messages.entry(partner).or_default().push(WireMessage {
            id,
            sender_id: sender,
            content: content.to_owned(),
            timestamp: Some("2025-01-01T10:15:00Z".to_owned()),
            timestamp_display: None,
        });
        id
    }

    pub fn add_friend(&mut self, id: u64, username: &str) {
        self.friends.push(User { id: Id(id), username: username.to_owned(), email: String::new() });
    }

    pub fn set_likes(&mut self, post: Id, by: &[u64]) {
        self.likes.insert(post, by.iter().copied().map(Id).collect());
    }
}

#[derive(Default)]
pub struct MockApi {
    state: Mutex<MockState>,
    holds: Mutex<HashMap<Endpoint, Arc<Notify>>>,
    calls: Mutex<HashMap<Endpoint, usize>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl MockApi {
    pub fn new(me: Id) -> Arc<Self> {
        let api = Self::default();
        lock(&api.state).me = me;
        Arc::new(api)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    /// Make the next call to `endpoint` fail with `error`.
    pub fn fail_next(&self, endpoint: Endpoint, error: ApiError) {
        lock(&self.state)
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Hold the next call to `endpoint` until the returned handle is notified.
    pub fn hold(&self, endpoint: Endpoint) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        lock(&self.holds).insert(endpoint, notify.clone());
        notify
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        lock(&self.calls).get(&endpoint).copied().unwrap_or(0)
    }

    /// Record the call, compute its result, then wait out any hold.
    async fn serve<T>(
        &self,
        endpoint: Endpoint,
        handler: impl FnOnce(&mut MockState) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        *lock(&self.calls).entry(endpoint).or_default() += 1;
        let result = {
            let mut state = lock(&self.state);
            match state.failures.get_mut(&endpoint).and_then(VecDeque::pop_front) {
                Some(err) => Err(err),
                None => handler(&mut state),
            }
        };
        let hold = lock(&self.holds).remove(&endpoint);
        if let Some(hold) = hold {
            hold.notified().await;
        }
        result
    }
}

#[async_trait::async_trait]
impl Api for MockApi {
    async fn notifications(&self) -> Result<NotificationsResponse, ApiError> {
        self.serve(Endpoint::Notifications, |s| {
            let unread = s.notifications.iter().filter(|n| !n.read).count();
            Ok(NotificationsResponse {
                unread: u32::try_from(unread).unwrap_or(u32::MAX),
                items: s.notifications.clone(),
            })
        })
        .await
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.serve(Endpoint::MarkAllRead, |s| {
            for n in &mut s.notifications {
                n.read = true;
            }
            Ok(())
        })
        .await
    }

    async fn clear_all(&self) -> Result<(), ApiError> {
        self.serve(Endpoint::ClearAll, |s| {
            s.notifications.clear();
            Ok(())
        })
        .await
    }

    async fn answer_friend_request(&self, answer: FriendAnswer, requester: Id) -> Result<(), ApiError> {
        self.serve(Endpoint::FriendAnswer, |s| {
            s.answered.push((answer, requester));
            s.notifications.retain(|n| n.actor_id != Some(requester));
            if answer == FriendAnswer::Accept {
                s.add_friend(requester.0, &format!("user{requester}"));
            }
            Ok(())
        })
        .await
    }

    async fn friends(&self) -> Result<Vec<User>, ApiError> {
        self.serve(Endpoint::Friends, |s| Ok(s.friends.clone()))
            .await
    }

    async fn messages(&self, partner: Id, since: Option<Id>) -> Result<Vec<WireMessage>, ApiError> {
        self.serve(Endpoint::Messages, |s| {
            let since = since.unwrap_or_default();
            Ok(s.messages
                .get(&partner)
                .map(|all| all.iter().filter(|m| m.id > since).cloned().collect())
                .unwrap_or_default())
        })
        .await
    }

    async fn send_message(&self, partner: Id, content: &str) -> Result<(), ApiError> {
        self.serve(Endpoint::Send, |s| {
            s.sent.push((partner, content.to_owned()));
            let me = s.me;
            s.push_message(partner, me, content);
            Ok(())
        })
        .await
    }

    async fn post_likes(&self) -> Result<HashMap<Id, PostLikes>, ApiError> {
        self.serve(Endpoint::PostLikes, |s| {
            Ok(s.likes
                .iter()
                .map(|(post, by)| {
                    let likes_by = by.iter().map(ToString::to_string).collect::<Vec<_>>().join(";");
                    (*post, PostLikes { likes: by.len() as u64, likes_by })
                })
                .collect())
        })
        .await
    }

    async fn toggle_like(&self, post: Id) -> Result<ToggleLikeResponse, ApiError> {
        self.serve(Endpoint::ToggleLike, |s| {
            let me = s.me;
            let by = s.likes.entry(post).or_default();
            let liked = if by.remove(&me) {
                false
            } else {
                by.insert(me);
                true
            };
            Ok(ToggleLikeResponse { success: true, likes: by.len() as u64, liked })
        })
        .await
    }
}
