use std::sync::Arc;

use feedsync::config::SyncConfig;
use feedsync::net::api::{Api, HttpApi};
use feedsync::sync::events::EventBus;
use feedsync::widgets::chat::ChatWidget;
use feedsync::widgets::likes::LikeWidget;
use feedsync::widgets::notifications::{DEFAULT_PREVIEW_LIMIT, NotificationWidget};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SyncConfig::from_env().expect("invalid feedsync configuration");
    let api: Arc<dyn Api> = Arc::new(HttpApi::new(&config).expect("failed to build HTTP client"));
    let events = EventBus::new();

    let notifications = NotificationWidget::mount(api.clone(), events.clone(), config.intervals.notifications);
    let chat = ChatWidget::mount(api.clone(), &events, config.user_id, config.intervals.chat, config.send_gap);
    let likes = LikeWidget::mount(api, config.user_id, config.intervals.likes);

    watch_view(notifications.subscribe(), |v| {
        let (shown, more) = v.preview(DEFAULT_PREVIEW_LIMIT);
        let latest = shown.first().map_or("", |n| n.text.as_str());
        info!(unread = v.unread, badge = %v.badge.text, more, latest, "notifications");
    });
    watch_view(chat.subscribe(), |v| {
        if let Some(line) = v.messages.last() {
            info!(partner = ?v.partner, count = v.messages.len(), at = line.time_label(), last = %line.content, "chat");
        }
        if let Some(notice) = &v.notice {
            warn!(notice, "chat");
        }
    });
    watch_view(likes.subscribe(), |v| {
        let total: u64 = v.posts.values().map(|c| c.state.count).sum();
        info!(posts = v.posts.len(), total, "likes");
    });

    chat.open();
    if let Some(partner) = config.chat_partner {
        if let Err(err) = chat.select_partner(partner).await {
            warn!(%partner, error = %err, "initial chat load failed");
        }
    }
    match likes.seed().await {
        Ok(count) => info!(count, "tracking posts"),
        Err(err) => warn!(error = %err, "like seed failed; polling will retry"),
    }

    info!(base_url = %config.base_url, user = %config.user_id, "feedsync running");
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler failed");
    }

    info!("unmounting widgets");
    drop(notifications);
    drop(chat);
    drop(likes);
}

/// Log every published view until the widget goes away.
fn watch_view<V, F>(mut rx: watch::Receiver<V>, log: F)
where
    V: Send + Sync + 'static,
    F: Fn(&V) + Send + 'static,
{
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            log(&*rx.borrow_and_update());
        }
    });
}
