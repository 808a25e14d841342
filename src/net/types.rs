//! Wire types for the social app's JSON endpoints.
//!
//! DESIGN
//! ======
//! The server persists rows as CSV text, so the same field may arrive as a
//! JSON number on one endpoint and a numeric string on another. Ids and
//! flags therefore deserialize leniently; everything else is plain serde.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// IDS
// =============================================================================

/// Numeric identifier for users, posts, messages and notifications.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Id(pub u64);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Id {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Id)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Bool(bool),
    Num(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawScalar::deserialize(deserializer)? {
            RawScalar::Num(n) => Ok(Id(n)),
            RawScalar::Text(s) => s
                .parse::<Id>()
                .map_err(|_| serde::de::Error::custom(format!("invalid id: {s:?}"))),
            RawScalar::Bool(b) => Err(serde::de::Error::custom(format!("invalid id: {b}"))),
        }
    }
}

/// Optional id where `null`, absent and `""` all mean "none".
fn lenient_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Id>, D::Error> {
    match Option::<RawScalar>::deserialize(deserializer)? {
        None | Some(RawScalar::Bool(_)) => Ok(None),
        Some(RawScalar::Num(n)) => Ok(Some(Id(n))),
        Some(RawScalar::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(RawScalar::Text(s)) => s
            .parse::<Id>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid id: {s:?}"))),
    }
}

/// Read flag sent as `"0"`/`"1"`, `0`/`1` or a JSON bool.
fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<RawScalar>::deserialize(deserializer)? {
        None => false,
        Some(RawScalar::Bool(b)) => b,
        Some(RawScalar::Num(n)) => n != 0,
        Some(RawScalar::Text(s)) => matches!(s.trim(), "1" | "true"),
    })
}

/// Non-negative count sent as a number or a numeric string.
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(match Option::<RawScalar>::deserialize(deserializer)? {
        Some(RawScalar::Num(n)) => n,
        Some(RawScalar::Text(s)) => s.trim().parse().unwrap_or(0),
        None | Some(RawScalar::Bool(_)) => 0,
    })
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    /// Any other server type (`dm`, `generic`, ...).
    #[default]
    #[serde(other)]
    Generic,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Id,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    /// The requesting user; only meaningful for friend requests.
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub actor_id: Option<Id>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub read: bool,
    #[serde(default)]
    pub timestamp_display: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl Notification {
    /// Best available timestamp text for display.
    #[must_use]
    pub fn display_time(&self) -> &str {
        self.timestamp_display
            .as_deref()
            .or(self.timestamp.as_deref())
            .unwrap_or_default()
    }
}

/// `GET /api/notifications`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct NotificationsResponse {
    #[serde(default)]
    pub unread: u32,
    #[serde(default)]
    pub items: Vec<Notification>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FriendAnswer {
    Accept,
    Reject,
}

impl FriendAnswer {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Accept => "/api/friend_request/accept",
            Self::Reject => "/api/friend_request/reject",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FriendRequestBody {
    pub requester_id: Id,
}

// =============================================================================
// USERS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

impl User {
    /// Username, then email, then `user_<id>`.
    #[must_use]
    pub fn display_name(&self) -> String {
        if !self.username.is_empty() {
            self.username.clone()
        } else if !self.email.is_empty() {
            self.email.clone()
        } else {
            format!("user_{}", self.id)
        }
    }
}

/// `GET /api/friends` and `GET /api/users`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UsersResponse {
    #[serde(default)]
    pub users: Vec<User>,
}

// =============================================================================
// CHAT
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: Id,
    pub sender_id: Id,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub timestamp_display: Option<String>,
}

/// `GET /api/messages`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendBody<'a> {
    pub partner_id: Id,
    pub content: &'a str,
}

/// Generic `{ok, error?}` acknowledgement used by write endpoints.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OkResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

// =============================================================================
// LIKES
// =============================================================================

/// One entry of the `GET /api/post_likes` map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PostLikes {
    #[serde(default, deserialize_with = "lenient_count")]
    pub likes: u64,
    /// Semicolon-separated user ids, e.g. `"3;7;12"`.
    #[serde(default)]
    pub likes_by: String,
}

impl PostLikes {
    /// Parse `likes_by` into a set, skipping empty and malformed entries.
    #[must_use]
    pub fn liked_by(&self) -> BTreeSet<Id> {
        self.likes_by
            .split(';')
            .filter_map(|part| part.parse::<Id>().ok())
            .collect()
    }
}

/// `POST /api/toggle_like/:postId`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ToggleLikeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient_count")]
    pub likes: u64,
    #[serde(default)]
    pub liked: bool,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
