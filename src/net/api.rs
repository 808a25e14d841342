//! HTTP API client for the social app's JSON endpoints.
//!
//! DESIGN
//! ======
//! Widgets talk to the server through the [`Api`] trait so tests can drive
//! them with a scripted mock. [`HttpApi`] is the `reqwest` implementation.
//!
//! ERROR HANDLING
//! ==============
//! Every response is checked for status and a JSON content type before the
//! body is parsed. A session expiry shows up as an HTML login page behind a
//! redirect, so a non-JSON body is reported as [`ApiError::NotJson`] rather
//! than a parse failure. Domain rejections (`ok:false`, `success:false`) in
//! an otherwise valid response become [`ApiError::Rejected`].

use std::collections::HashMap;
use std::fmt::Write;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{
    FriendAnswer, FriendRequestBody, Id, MessagesResponse, NotificationsResponse, OkResponse, PostLikes, SendBody,
    ToggleLikeResponse, User, UsersResponse, WireMessage,
};
use crate::config::SyncConfig;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by API calls. Payloads are strings so errors can be
/// cloned into view state and test scripts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (connect, timeout, reset).
    #[error("request failed: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("unexpected status {status}")]
    Status { status: u16 },

    /// The response was not JSON, typically a login redirect.
    #[error("expected JSON response, got {content_type:?}")]
    NotJson { content_type: String },

    /// The JSON body did not match the expected shape.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The server understood the request and refused it.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ApiError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_TRANSPORT",
            Self::Status { .. } => "E_STATUS",
            Self::NotJson { .. } => "E_NOT_JSON",
            Self::Parse(_) => "E_PARSE",
            Self::Rejected(_) => "E_REJECTED",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    /// Whether the next poll tick has a chance of succeeding.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotJson { .. } | Self::Status { status: 429 | 500..=599 })
    }

    /// Short text suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected(reason) => reason.clone(),
            Self::NotJson { .. } => "session expired; please sign in again".to_owned(),
            _ => "something went wrong; try again".to_owned(),
        }
    }
}

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}

// =============================================================================
// API TRAIT
// =============================================================================

/// Server operations used by the widgets. Enables mocking in tests.
#[async_trait::async_trait]
pub trait Api: Send + Sync {
    /// `GET /api/notifications`
    async fn notifications(&self) -> Result<NotificationsResponse, ApiError>;

    /// `POST /api/notifications/mark_all_read`
    async fn mark_all_read(&self) -> Result<(), ApiError>;

    /// `POST /api/notifications/clear_all`
    async fn clear_all(&self) -> Result<(), ApiError>;

    /// `POST /api/friend_request/{accept,reject}`
    async fn answer_friend_request(&self, answer: FriendAnswer, requester: Id) -> Result<(), ApiError>;

    /// `GET /api/friends`
    async fn friends(&self) -> Result<Vec<User>, ApiError>;

    /// `GET /api/messages`. `since = None` requests the full history.
    async fn messages(&self, partner: Id, since: Option<Id>) -> Result<Vec<WireMessage>, ApiError>;

    /// `POST /api/send`
    async fn send_message(&self, partner: Id, content: &str) -> Result<(), ApiError>;

    /// `GET /api/post_likes`
    async fn post_likes(&self) -> Result<HashMap<Id, PostLikes>, ApiError>;

    /// `POST /api/toggle_like/:postId`
    async fn toggle_like(&self, post: Id) -> Result<ToggleLikeResponse, ApiError>;
}

// =============================================================================
// RESPONSE CHECKS
// =============================================================================

/// True for `application/json` and `+json` media types.
#[must_use]
pub fn is_json_content_type(content_type: &str) -> bool {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media == "application/json" || media.ends_with("+json")
}

/// Classify a response before its body is read.
///
/// # Errors
///
/// Returns [`ApiError::Status`] for non-2xx and [`ApiError::NotJson`] for a
/// missing or non-JSON content type.
pub fn check_response(status: u16, content_type: Option<&str>) -> Result<(), ApiError> {
    if !(200..300).contains(&status) {
        return Err(ApiError::Status { status });
    }
    match content_type {
        Some(ct) if is_json_content_type(ct) => Ok(()),
        other => Err(ApiError::NotJson { content_type: other.unwrap_or_default().to_owned() }),
    }
}

/// Turn an `{ok, error?}` acknowledgement into a result.
///
/// # Errors
///
/// Returns [`ApiError::Rejected`] with the server's reason when `ok` is false.
pub fn check_ack(ack: OkResponse) -> Result<(), ApiError> {
    if ack.ok {
        Ok(())
    } else {
        Err(ApiError::Rejected(ack.error.unwrap_or_else(|| "request was not accepted".to_owned())))
    }
}

/// Classify the response of a write whose success body is optional.
///
/// Any 2xx with an empty body or no content type succeeds. A JSON body is
/// inspected for `ok: false`.
///
/// # Errors
///
/// Returns [`ApiError::Status`] for non-2xx, [`ApiError::NotJson`] for a
/// non-empty body of an explicit non-JSON type (a login page),
/// [`ApiError::Parse`] for malformed JSON and [`ApiError::Rejected`] for
/// `ok: false`.
pub fn check_optional_ack(status: u16, content_type: Option<&str>, body: &str) -> Result<(), ApiError> {
    if !(200..300).contains(&status) {
        return Err(ApiError::Status { status });
    }
    if body.trim().is_empty() {
        return Ok(());
    }
    match content_type {
        None => Ok(()),
        Some(ct) if !is_json_content_type(ct) => Err(ApiError::NotJson { content_type: ct.to_owned() }),
        Some(_) => {
            let value: serde_json::Value = serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))?;
            match value.get("ok").and_then(serde_json::Value::as_bool) {
                Some(false) => {
                    let reason = value
                        .get("error")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("request was not accepted");
                    Err(ApiError::Rejected(reason.to_owned()))
                }
                _ => Ok(()),
            }
        }
    }
}

/// Parse the `/api/post_likes` map, dropping keys that are not post ids.
#[must_use]
pub fn parse_like_map(raw: HashMap<String, PostLikes>) -> HashMap<Id, PostLikes> {
    raw.into_iter()
        .filter_map(|(key, likes)| key.parse::<Id>().ok().map(|id| (id, likes)))
        .collect()
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    /// Build a client for `config.base_url`, carrying the session cookie on
    /// every request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the cookie is not a valid
    /// header value or the client fails to build.
    pub fn new(config: &SyncConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.session_cookie {
            let value = HeaderValue::from_str(cookie).map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
            headers.insert(COOKIE, value);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.clone() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        check_response(status, content_type.as_deref())?;

        let text = response.text().await.map_err(transport)?;
        serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))
    }

    /// POST whose body, if any, may only carry an `{ok, error?}` ack.
    async fn post_ack(&self, request: reqwest::RequestBuilder) -> Result<(), ApiError> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.map_err(transport)?;
        check_optional_ack(status, content_type.as_deref(), &body)
    }
}

#[async_trait::async_trait]
impl Api for HttpApi {
    async fn notifications(&self) -> Result<NotificationsResponse, ApiError> {
        self.read_json(self.http.get(self.url("/api/notifications")))
            .await
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.post_ack(self.http.post(self.url("/api/notifications/mark_all_read")))
            .await
    }

    async fn clear_all(&self) -> Result<(), ApiError> {
        self.post_ack(self.http.post(self.url("/api/notifications/clear_all")))
            .await
    }

    async fn answer_friend_request(&self, answer: FriendAnswer, requester: Id) -> Result<(), ApiError> {
        let request = self
            .http
            .post(self.url(answer.path()))
            .json(&FriendRequestBody { requester_id: requester });
        let ack: OkResponse = self.read_json(request).await?;
        check_ack(ack)
    }

    async fn friends(&self) -> Result<Vec<User>, ApiError> {
        let body: UsersResponse = match self.read_json(self.http.get(self.url("/api/friends"))).await {
            Err(ApiError::Status { status: 404 }) => {
                debug!("no /api/friends endpoint; falling back to /api/users");
                self.read_json(self.http.get(self.url("/api/users"))).await?
            }
            other => other?,
        };
        Ok(body.users)
    }

    async fn messages(&self, partner: Id, since: Option<Id>) -> Result<Vec<WireMessage>, ApiError> {
        let mut path = format!("/api/messages?partner_id={partner}");
        if let Some(since) = since.filter(|id| id.0 > 0) {
            let _ = write!(path, "&since_id={since}");
        }
        let body: MessagesResponse = self.read_json(self.http.get(self.url(&path))).await?;
        if let Some(error) = body.error {
            return Err(ApiError::Rejected(error));
        }
        debug!(%partner, count = body.messages.len(), "messages fetched");
        Ok(body.messages)
    }

    async fn send_message(&self, partner: Id, content: &str) -> Result<(), ApiError> {
        let request = self
            .http
            .post(self.url("/api/send"))
            .json(&SendBody { partner_id: partner, content });
        let ack: OkResponse = self.read_json(request).await?;
        check_ack(ack)
    }

    async fn post_likes(&self) -> Result<HashMap<Id, PostLikes>, ApiError> {
        let raw: HashMap<String, PostLikes> = self.read_json(self.http.get(self.url("/api/post_likes"))).await?;
        Ok(parse_like_map(raw))
    }

    async fn toggle_like(&self, post: Id) -> Result<ToggleLikeResponse, ApiError> {
        let response: ToggleLikeResponse = self
            .read_json(self.http.post(self.url(&format!("/api/toggle_like/{post}"))))
            .await?;
        if !response.success {
            return Err(ApiError::Rejected("like was not recorded".to_owned()));
        }
        Ok(response)
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
