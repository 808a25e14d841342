use super::*;
use crate::net::mock::{Endpoint, MockApi};
use crate::net::types::NotificationKind;
use tokio::sync::broadcast::error::TryRecvError;

const POLL: Duration = Duration::from_secs(60);

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

fn seeded_api(unread: u64) -> Arc<MockApi> {
    let api = MockApi::new(Id(1));
    api.with(|s| {
        for id in 1..=unread {
            s.push_notification(id, &format!("message {id}"), NotificationKind::Generic, None);
        }
    });
    api
}

async fn mounted(api: &Arc<MockApi>, events: EventBus) -> NotificationWidget {
    let widget = NotificationWidget::mount(api.clone(), events, POLL);
    settle().await;
    widget
}

// =============================================================
// Badge
// =============================================================

#[test]
fn badge_hidden_at_zero() {
    assert_eq!(Badge::from_unread(0), Badge { text: String::new(), visible: false });
}

#[test]
fn badge_shows_exact_count_up_to_cap() {
    assert_eq!(Badge::from_unread(7).text, "7");
    assert_eq!(Badge::from_unread(99).text, "99");
    assert!(Badge::from_unread(99).visible);
}

#[test]
fn badge_caps_display_above_99() {
    assert_eq!(Badge::from_unread(100).text, "99+");
    assert_eq!(Badge::from_unread(5000).text, "99+");
}

#[test]
fn preview_reports_overflow() {
    let api_items: Vec<Notification> = (1..=5)
        .map(|id| Notification {
            id: Id(id),
            text: String::new(),
            kind: NotificationKind::Generic,
            actor_id: None,
            read: false,
            timestamp_display: None,
            timestamp: None,
        })
        .collect();
    let view = NotificationView { items: api_items, ..NotificationView::default() };
    let (shown, more) = view.preview(DEFAULT_PREVIEW_LIMIT);
    assert_eq!(shown.len(), 3);
    assert_eq!(more, 2);

    let empty = NotificationView::default();
    let (shown, more) = empty.preview(DEFAULT_PREVIEW_LIMIT);
    assert!(shown.is_empty());
    assert_eq!(more, 0);
}

// =============================================================
// Polling
// =============================================================

#[tokio::test(start_paused = true)]
async fn mount_fetches_immediately() {
    let api = seeded_api(3);
    let widget = mounted(&api, EventBus::new()).await;

    let view = widget.view();
    assert_eq!(view.unread, 3);
    assert_eq!(view.items.len(), 3);
    assert_eq!(view.badge, Badge { text: "3".into(), visible: true });
    assert_eq!(api.calls(Endpoint::Notifications), 1);
}

#[tokio::test(start_paused = true)]
async fn each_tick_replaces_the_list() {
    let api = seeded_api(2);
    let widget = mounted(&api, EventBus::new()).await;
    assert_eq!(widget.view().items.len(), 2);

    api.with(|s| {
        s.notifications.clear();
        s.push_notification(10, "fresh", NotificationKind::Generic, None);
    });
    tokio::time::advance(POLL).await;
    settle().await;

    let view = widget.view();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].id, Id(10));
    assert_eq!(view.unread, 1);
}

#[tokio::test(start_paused = true)]
async fn non_json_tick_keeps_previous_state() {
    let api = seeded_api(2);
    api.fail_next(Endpoint::Notifications, ApiError::NotJson { content_type: "text/html".into() });
    let widget = mounted(&api, EventBus::new()).await;
    assert_eq!(widget.view(), NotificationView::default());

    widget.refresh().await.unwrap();
    assert_eq!(widget.view().unread, 2);
}

#[tokio::test(start_paused = true)]
async fn unmount_ignores_late_response() {
    let api = seeded_api(4);
    let hold = api.hold(Endpoint::Notifications);
    let widget = NotificationWidget::mount(api.clone(), EventBus::new(), POLL);
    settle().await;
    assert_eq!(api.calls(Endpoint::Notifications), 1);

    widget.unmount();
    hold.notify_one();
    settle().await;

    assert!(!widget.is_mounted());
    assert_eq!(widget.view(), NotificationView::default());

    tokio::time::advance(POLL * 3).await;
    settle().await;
    assert_eq!(api.calls(Endpoint::Notifications), 1);
}

// =============================================================
// mark_all_read
// =============================================================

#[tokio::test(start_paused = true)]
async fn mark_all_read_zeroes_badge_without_waiting_for_tick() {
    let api = seeded_api(3);
    let widget = mounted(&api, EventBus::new()).await;

    let outcome = widget.mark_all_read().await.unwrap();
    assert_eq!(outcome, ActionOutcome::Applied);

    let view = widget.view();
    assert_eq!(view.unread, 0);
    assert!(!view.badge.visible);
    assert!(view.items.iter().all(|n| n.read));
    assert!(!view.marking);
    assert_eq!(api.calls(Endpoint::Notifications), 1);
}

#[tokio::test(start_paused = true)]
async fn mark_all_read_failure_keeps_previous_count() {
    let api = seeded_api(3);
    let widget = mounted(&api, EventBus::new()).await;
    api.fail_next(Endpoint::MarkAllRead, ApiError::Status { status: 500 });

    let err = widget.mark_all_read().await.unwrap_err();
    assert_eq!(err, ApiError::Status { status: 500 });

    let view = widget.view();
    assert_eq!(view.unread, 3);
    assert_eq!(view.badge.text, "3");
    assert!(view.items.iter().all(|n| !n.read));
    assert!(view.notice.is_some());
    assert!(!view.marking);
}

#[tokio::test(start_paused = true)]
async fn mark_all_read_ignored_while_in_flight() {
    let api = seeded_api(1);
    let widget = mounted(&api, EventBus::new()).await;
    let hold = api.hold(Endpoint::MarkAllRead);

    let (first, second) = tokio::join!(widget.mark_all_read(), async {
        let second = widget.mark_all_read().await;
        hold.notify_one();
        second
    });

    assert_eq!(first.unwrap(), ActionOutcome::Applied);
    assert_eq!(second.unwrap(), ActionOutcome::Ignored);
    assert_eq!(api.calls(Endpoint::MarkAllRead), 1);
}

// =============================================================
// clear_all
// =============================================================

#[tokio::test(start_paused = true)]
async fn clear_all_empties_list_and_badge() {
    let api = seeded_api(5);
    let widget = mounted(&api, EventBus::new()).await;

    widget.clear_all().await.unwrap();
    let view = widget.view();
    assert!(view.items.is_empty());
    assert!(!view.badge.visible);
}

#[tokio::test(start_paused = true)]
async fn clear_all_failure_keeps_list() {
    let api = seeded_api(2);
    let widget = mounted(&api, EventBus::new()).await;
    api.fail_next(Endpoint::ClearAll, ApiError::Transport("reset".into()));

    assert!(widget.clear_all().await.is_err());
    assert_eq!(widget.view().items.len(), 2);
}

// =============================================================
// Friend requests
// =============================================================

#[tokio::test(start_paused = true)]
async fn accept_refetches_and_publishes_friends_changed() {
    let api = MockApi::new(Id(1));
    api.with(|s| s.push_notification(1, "bob sent a request", NotificationKind::FriendRequest, Some(Id(8))));
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let widget = mounted(&api, events).await;
    assert_eq!(widget.view().items.len(), 1);

    widget.accept_friend_request(Id(8)).await.unwrap();

    assert_eq!(rx.try_recv(), Ok(WidgetEvent::FriendsChanged));
    assert_eq!(api.calls(Endpoint::Notifications), 2);
    assert!(widget.view().items.is_empty());
    api.with(|s| assert_eq!(s.answered, vec![(FriendAnswer::Accept, Id(8))]));
}

#[tokio::test(start_paused = true)]
async fn reject_refetches_without_event() {
    let api = MockApi::new(Id(1));
    api.with(|s| s.push_notification(1, "eve sent a request", NotificationKind::FriendRequest, Some(Id(9))));
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let widget = mounted(&api, events).await;

    widget.reject_friend_request(Id(9)).await.unwrap();

    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(api.calls(Endpoint::Notifications), 2);
    assert!(widget.view().items.is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_answer_surfaces_server_reason() {
    let api = seeded_api(1);
    let events = EventBus::new();
    let mut rx = events.subscribe();
    let widget = mounted(&api, events).await;
    api.fail_next(Endpoint::FriendAnswer, ApiError::Rejected("already friends".into()));

    let err = widget.accept_friend_request(Id(3)).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected(_)));
    assert_eq!(widget.view().notice.as_deref(), Some("already friends"));
    assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(api.calls(Endpoint::Notifications), 1);
}
