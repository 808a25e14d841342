//! Client configuration parsed from environment variables.

use std::time::Duration;

use crate::net::types::Id;

pub const DEFAULT_NOTIFICATION_POLL_MS: u64 = 5000;
pub const DEFAULT_CHAT_POLL_MS: u64 = 3000;
pub const DEFAULT_LIKE_POLL_MS: u64 = 2000;
pub const DEFAULT_SEND_GAP_MS: u64 = 1500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Errors produced while building a [`SyncConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {var}")]
    Missing { var: String },
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
    #[error("{var} must be greater than zero")]
    ZeroInterval { var: String },
}

/// Fixed polling interval per widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub notifications: Duration,
    pub chat: Duration,
    pub likes: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            notifications: Duration::from_millis(DEFAULT_NOTIFICATION_POLL_MS),
            chat: Duration::from_millis(DEFAULT_CHAT_POLL_MS),
            likes: Duration::from_millis(DEFAULT_LIKE_POLL_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Server origin without a trailing slash, e.g. `http://localhost:5000`.
    pub base_url: String,
    /// The signed-in user; decides "mine" in chat and "liked" for posts.
    pub user_id: Id,
    /// Raw `Cookie` header value carrying the server session.
    pub session_cookie: Option<String>,
    /// Partner to open the chat with, if any.
    pub chat_partner: Option<Id>,
    pub intervals: PollIntervals,
    /// Minimum gap between two chat sends.
    pub send_gap: Duration,
    pub timeouts: HttpTimeouts,
}

impl SyncConfig {
    /// Config with default intervals and timeouts.
    #[must_use]
    pub fn new(base_url: impl Into<String>, user_id: Id) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id,
            session_cookie: None,
            chat_partner: None,
            intervals: PollIntervals::default(),
            send_gap: Duration::from_millis(DEFAULT_SEND_GAP_MS),
            timeouts: HttpTimeouts::default(),
        }
    }

    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `FEEDSYNC_BASE_URL`
    /// - `FEEDSYNC_USER_ID`
    ///
    /// Optional:
    /// - `FEEDSYNC_SESSION_COOKIE`
    /// - `FEEDSYNC_CHAT_PARTNER`
    /// - `FEEDSYNC_NOTIFICATION_POLL_MS`: default 5000
    /// - `FEEDSYNC_CHAT_POLL_MS`: default 3000
    /// - `FEEDSYNC_LIKE_POLL_MS`: default 2000
    /// - `FEEDSYNC_SEND_GAP_MS`: default 1500
    /// - `FEEDSYNC_REQUEST_TIMEOUT_SECS`: default 10
    /// - `FEEDSYNC_CONNECT_TIMEOUT_SECS`: default 5
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing, an id does not
    /// parse, or a polling interval is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = required("FEEDSYNC_BASE_URL")?;
        let user_id = parse_id("FEEDSYNC_USER_ID", &required("FEEDSYNC_USER_ID")?)?;

        let mut config = Self::new(base_url, user_id);
        config.session_cookie = std::env::var("FEEDSYNC_SESSION_COOKIE")
            .ok()
            .filter(|v| !v.trim().is_empty());
        config.chat_partner = match std::env::var("FEEDSYNC_CHAT_PARTNER") {
            Ok(raw) if !raw.trim().is_empty() => Some(parse_id("FEEDSYNC_CHAT_PARTNER", &raw)?),
            _ => None,
        };
        config.intervals = PollIntervals {
            notifications: interval_ms("FEEDSYNC_NOTIFICATION_POLL_MS", DEFAULT_NOTIFICATION_POLL_MS)?,
            chat: interval_ms("FEEDSYNC_CHAT_POLL_MS", DEFAULT_CHAT_POLL_MS)?,
            likes: interval_ms("FEEDSYNC_LIKE_POLL_MS", DEFAULT_LIKE_POLL_MS)?,
        };
        config.send_gap = Duration::from_millis(env_parse("FEEDSYNC_SEND_GAP_MS", DEFAULT_SEND_GAP_MS));
        config.timeouts = HttpTimeouts {
            request_secs: env_parse("FEEDSYNC_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("FEEDSYNC_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(config)
    }
}

fn required(var: &str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::Missing { var: var.into() })
}

fn parse_id(var: &str, raw: &str) -> Result<Id, ConfigError> {
    raw.parse::<Id>()
        .map_err(|_| ConfigError::Invalid { var: var.into(), value: raw.into() })
}

fn interval_ms(var: &str, default: u64) -> Result<Duration, ConfigError> {
    match env_parse(var, default) {
        0 => Err(ConfigError::ZeroInterval { var: var.into() }),
        ms => Ok(Duration::from_millis(ms)),
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
