//! Polling synchronization for a social feed client.
//!
//! ARCHITECTURE
//! ============
//! Three widgets keep local view state close to the server by polling its
//! JSON API on fixed intervals:
//!
//! - [`widgets::notifications`]: unread badge and notification list.
//! - [`widgets::chat`]: one direct-message conversation, fetched
//!   incrementally by message id.
//! - [`widgets::likes`]: per-post like counters with optimistic toggles.
//!
//! [`sync`] holds the shared machinery (poller, liveness guard, observable
//! view store, cross-widget events). [`net`] is the HTTP layer behind the
//! [`net::api::Api`] trait, and [`config`] reads settings from the
//! environment.

pub mod config;
pub mod net;
pub mod sync;
pub mod widgets;
